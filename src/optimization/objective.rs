//! # Objective Functions
//!
//! $$
//! \text{Variance: } Q = 2\Sigma,\ c = 0 \qquad
//! \text{MAD: } c = \big[0^n, \tfrac1T \mathbf 1^T\big] \qquad
//! \text{CVaR: } c = \big[0^n, \tfrac{1}{\alpha T}\mathbf 1^T, 1\big]
//! $$
//!
//! Quadratic and linear terms of `min ½ x'Qx + c'x` for each risk measure.

use nalgebra::DMatrix;
use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use crate::error::QuantfolioError;
use crate::error::Result;
use crate::market::ReturnsMatrix;

/// Jitter added to the diagonal before the Cholesky factorization.
const PSD_JITTER: f64 = 1e-16;
/// A pivot whose square falls below this share of the largest variance counts as zero.
const PIVOT_TOLERANCE: f64 = 1e-10;

#[derive(Clone, Debug, PartialEq)]
pub struct Objective {
  pub quadratic: Array2<f64>,
  pub linear: Array1<f64>,
}

impl Objective {
  pub fn new(quadratic: Array2<f64>, linear: Array1<f64>) -> Result<Self> {
    let k = linear.len();
    if quadratic.dim() != (k, k) {
      return Err(QuantfolioError::InvalidObjective(format!(
        "quadratic term is {:?} but the linear term has {k} entries",
        quadratic.dim()
      )));
    }
    Ok(Self { quadratic, linear })
  }

  pub fn n_variables(&self) -> usize {
    self.linear.len()
  }

  /// True when the quadratic term is exactly zero.
  pub fn is_linear(&self) -> bool {
    self.quadratic.iter().all(|v| *v == 0.0)
  }

  /// Objective value at `x`.
  pub fn value(&self, x: &Array1<f64>) -> f64 {
    0.5 * x.dot(&self.quadratic.dot(x)) + self.linear.dot(x)
  }
}

/// Minimum variance: `Q = 2 Cov`, `c = 0`.
///
/// The covariance has to pass the positive-semidefinite gate first.
pub fn variance(returns: &ReturnsMatrix) -> Result<Objective> {
  let cov = returns.covariance()?;
  ensure_positive_semidefinite(&cov)?;

  let n = returns.n_assets();
  Objective::new(2.0 * cov, Array1::zeros(n))
}

/// Mean absolute deviation over `n + T` variables: weights then one deviation per row.
pub fn mean_absolute_deviation(returns: &ReturnsMatrix, regularization_weight: f64) -> Result<Objective> {
  let (t, n) = (returns.n_periods(), returns.n_assets());
  let mut linear = Array1::zeros(n + t);
  linear.slice_mut(s![n..]).fill(1.0 / t as f64);

  Objective::new(regularization_weight * Array2::eye(n + t), linear)
}

/// CVaR at tail probability `alpha` over `n + T + 1` variables: weights, one excess loss per
/// row, and the VaR threshold ζ last.
pub fn conditional_value_at_risk(
  returns: &ReturnsMatrix,
  alpha: f64,
  regularization_weight: f64,
) -> Result<Objective> {
  let (t, n) = (returns.n_periods(), returns.n_assets());
  let mut linear = Array1::zeros(n + t + 1);
  linear.slice_mut(s![n..n + t]).fill(1.0 / (alpha * t as f64));
  linear[n + t] = 1.0;

  Objective::new(regularization_weight * Array2::eye(n + t + 1), linear)
}

/// Cholesky gate on `cov + εI`.
///
/// Fails on non-finite entries, on a failed factorization and on numerically zero pivots,
/// which flags perfectly collinear assets.
pub fn ensure_positive_semidefinite(cov: &Array2<f64>) -> Result<()> {
  let n = cov.nrows();
  if cov.ncols() != n {
    return Err(QuantfolioError::InvalidObjective(format!(
      "covariance matrix is {:?}, expected square",
      cov.dim()
    )));
  }
  if cov.iter().any(|v| !v.is_finite()) {
    return Err(QuantfolioError::InvalidObjective(
      "covariance matrix has non-finite entries".to_string(),
    ));
  }

  let max_variance = cov.diag().iter().copied().fold(0.0_f64, f64::max);
  if max_variance <= 0.0 {
    return Err(QuantfolioError::InvalidObjective(
      "returns have zero variance".to_string(),
    ));
  }

  let jittered = DMatrix::from_fn(n, n, |i, j| {
    cov[[i, j]] + if i == j { PSD_JITTER } else { 0.0 }
  });
  let chol = jittered.cholesky().ok_or_else(|| {
    QuantfolioError::InvalidObjective("covariance matrix is not positive semidefinite".to_string())
  })?;

  let l = chol.l();
  let threshold = PIVOT_TOLERANCE * max_variance;
  if let Some(i) = (0..n).find(|&i| l[(i, i)] * l[(i, i)] <= threshold) {
    debug!(pivot = i, value = l[(i, i)], "degenerate covariance pivot");
    return Err(QuantfolioError::InvalidObjective(format!(
      "covariance matrix is singular: pivot {i} is numerically zero"
    )));
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;
  use ndarray::array;

  use super::*;

  fn returns(values: Array2<f64>) -> ReturnsMatrix {
    let (t, n) = values.dim();
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    ReturnsMatrix::new(
      (0..t).map(|i| start + chrono::Duration::days(i as i64)).collect(),
      (0..n).map(|i| format!("A{i}")).collect(),
      values,
    )
    .unwrap()
  }

  fn sample() -> ReturnsMatrix {
    returns(array![
      [0.010, 0.002, -0.004],
      [-0.006, 0.011, 0.003],
      [0.004, -0.007, 0.009],
      [0.012, 0.001, -0.002],
      [-0.003, 0.005, 0.006]
    ])
  }

  #[test]
  fn variance_objective_shapes() {
    let r = sample();
    let objective = variance(&r).unwrap();
    assert_eq!(objective.quadratic.dim(), (3, 3));
    assert_eq!(objective.linear.len(), 3);
    assert!(objective.linear.iter().all(|v| *v == 0.0));

    let cov = r.covariance().unwrap();
    assert_abs_diff_eq!(objective.quadratic[[0, 1]], 2.0 * cov[[0, 1]], epsilon = 1e-15);
  }

  #[test]
  fn mad_objective_shapes() {
    let r = sample();
    let objective = mean_absolute_deviation(&r, 0.05).unwrap();
    assert_eq!(objective.n_variables(), 3 + 5);
    assert_eq!(objective.linear[2], 0.0);
    assert_abs_diff_eq!(objective.linear[3], 0.2, epsilon = 1e-15);
    assert_eq!(objective.quadratic[[7, 7]], 0.05);
  }

  #[test]
  fn cvar_objective_shapes() {
    let r = sample();
    let objective = conditional_value_at_risk(&r, 0.05, 0.0).unwrap();
    assert_eq!(objective.n_variables(), 3 + 5 + 1);
    assert_abs_diff_eq!(objective.linear[3], 1.0 / (0.05 * 5.0), epsilon = 1e-12);
    assert_eq!(objective.linear[8], 1.0);
    assert!(objective.is_linear());
  }

  #[test]
  fn mirrored_assets_fail_the_gate() {
    let x = array![0.01, -0.02, 0.015, 0.003, -0.007, 0.012];
    let mut values = Array2::zeros((6, 2));
    values.column_mut(0).assign(&x);
    values.column_mut(1).assign(&(-&x));

    let err = variance(&returns(values)).unwrap_err();
    assert!(matches!(err, QuantfolioError::InvalidObjective(_)));
  }

  #[test]
  fn non_finite_covariance_fails_the_gate() {
    let cov = array![[1.0, f64::NAN], [f64::NAN, 1.0]];
    assert!(matches!(
      ensure_positive_semidefinite(&cov),
      Err(QuantfolioError::InvalidObjective(_))
    ));
  }

  #[test]
  fn well_conditioned_covariance_passes() {
    let cov = array![[0.04, 0.01], [0.01, 0.09]];
    assert!(ensure_positive_semidefinite(&cov).is_ok());
  }

  #[test]
  fn objective_value_matches_quadratic_form() {
    let objective = Objective::new(array![[2.0, 0.0], [0.0, 4.0]], array![1.0, -1.0]).unwrap();
    assert_abs_diff_eq!(objective.value(&array![1.0, 1.0]), 3.0, epsilon = 1e-15);
  }
}
