//! # Constraints
//!
//! $$
//! \mathbf 1^\top w = 1 - c_{\text{cash}}, \qquad -w \le 0, \qquad w \le \bar w
//! $$
//!
//! Immutable linear blocks over the full variable vector. Asset constraints only touch the
//! first `n` columns; auxiliary columns get zero coefficients.

use ndarray::concatenate;
use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;

use super::types::ConstraintType;
use super::types::ModelParameters;
use crate::error::invalid_config;
use crate::error::Result;

/// Rows `coefficients · x (= or ≤) bounds`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearBlock {
  coefficients: Array2<f64>,
  bounds: Array1<f64>,
}

impl LinearBlock {
  pub fn new(coefficients: Array2<f64>, bounds: Array1<f64>) -> Result<Self> {
    if coefficients.nrows() != bounds.len() {
      return Err(invalid_config(format!(
        "constraint block has {} rows but {} bounds",
        coefficients.nrows(),
        bounds.len()
      )));
    }
    Ok(Self {
      coefficients,
      bounds,
    })
  }

  /// Block without rows.
  pub fn empty(n_variables: usize) -> Self {
    Self {
      coefficients: Array2::zeros((0, n_variables)),
      bounds: Array1::zeros(0),
    }
  }

  pub fn coefficients(&self) -> ArrayView2<'_, f64> {
    self.coefficients.view()
  }

  pub fn bounds(&self) -> ArrayView1<'_, f64> {
    self.bounds.view()
  }

  pub fn n_rows(&self) -> usize {
    self.bounds.len()
  }

  pub fn n_variables(&self) -> usize {
    self.coefficients.ncols()
  }
}

/// Concatenate blocks row-wise. All blocks must act on `n_variables` columns.
pub fn stack(blocks: &[LinearBlock], n_variables: usize) -> Result<LinearBlock> {
  if let Some(block) = blocks.iter().find(|b| b.n_variables() != n_variables) {
    return Err(invalid_config(format!(
      "constraint block acts on {} variables, expected {n_variables}",
      block.n_variables()
    )));
  }
  if blocks.is_empty() {
    return Ok(LinearBlock::empty(n_variables));
  }

  let coefficients: Vec<_> = blocks.iter().map(|b| b.coefficients.view()).collect();
  let bounds: Vec<_> = blocks.iter().map(|b| b.bounds.view()).collect();

  LinearBlock::new(
    concatenate(Axis(0), &coefficients).map_err(|e| invalid_config(e.to_string()))?,
    concatenate(Axis(0), &bounds).map_err(|e| invalid_config(e.to_string()))?,
  )
}

/// Equality block `A x = b` and inequality block `G x ≤ h`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintSet {
  pub equality: LinearBlock,
  pub inequality: LinearBlock,
}

impl ConstraintSet {
  pub fn new(equality: Vec<LinearBlock>, inequality: Vec<LinearBlock>, n_variables: usize) -> Result<Self> {
    Ok(Self {
      equality: stack(&equality, n_variables)?,
      inequality: stack(&inequality, n_variables)?,
    })
  }

  pub fn n_variables(&self) -> usize {
    self.equality.n_variables()
  }

  /// A new set with `blocks` appended to the inequalities.
  pub fn with_inequalities(&self, blocks: Vec<LinearBlock>) -> Result<Self> {
    let mut all = Vec::with_capacity(blocks.len() + 1);
    all.push(self.inequality.clone());
    all.extend(blocks);

    Ok(Self {
      equality: self.equality.clone(),
      inequality: stack(&all, self.n_variables())?,
    })
  }
}

fn asset_rows(n_assets: usize, n_variables: usize, diagonal: f64) -> Array2<f64> {
  let mut coefficients = Array2::zeros((n_assets, n_variables));
  coefficients
    .slice_mut(s![.., ..n_assets])
    .diag_mut()
    .fill(diagonal);
  coefficients
}

/// `Σ w = 1 - cash_pct`.
pub fn budget(n_assets: usize, n_variables: usize, cash_pct: f64) -> LinearBlock {
  let mut coefficients = Array2::zeros((1, n_variables));
  coefficients.slice_mut(s![0, ..n_assets]).fill(1.0);

  LinearBlock {
    coefficients,
    bounds: Array1::from_elem(1, 1.0 - cash_pct),
  }
}

/// `-w ≤ 0`.
pub fn no_short_selling(n_assets: usize, n_variables: usize) -> LinearBlock {
  LinearBlock {
    coefficients: asset_rows(n_assets, n_variables, -1.0),
    bounds: Array1::zeros(n_assets),
  }
}

/// `w ≤ cap`.
pub fn max_instrument_weight(n_assets: usize, n_variables: usize, cap: f64) -> LinearBlock {
  LinearBlock {
    coefficients: asset_rows(n_assets, n_variables, 1.0),
    bounds: Array1::from_elem(n_assets, cap),
  }
}

/// Generic asset constraints requested by `parameters`, laid out over `n_variables` columns.
pub fn asset_constraints(
  parameters: &ModelParameters,
  n_assets: usize,
  n_variables: usize,
) -> Result<ConstraintSet> {
  if n_variables < n_assets {
    return Err(invalid_config(format!(
      "{n_variables} variables cannot hold {n_assets} asset weights"
    )));
  }

  let equality = vec![budget(n_assets, n_variables, parameters.effective_cash_pct())];

  let mut inequality = Vec::new();
  for constraint in &parameters.constraints {
    match constraint {
      ConstraintType::NoShortSelling => inequality.push(no_short_selling(n_assets, n_variables)),
      ConstraintType::MaxInstrumentWeight => inequality.push(max_instrument_weight(
        n_assets,
        n_variables,
        parameters.max_instrument_weight,
      )),
      ConstraintType::Budget | ConstraintType::CashPct => {}
    }
  }

  ConstraintSet::new(equality, inequality, n_variables)
}
