//! # Optimization Models
//!
//! $$
//! \text{MAD}(w) = \frac1T \sum_t \big|(r_t - \bar r)^\top w\big|, \qquad
//! \text{CVaR}_\alpha(w) = \min_\zeta\ \zeta + \frac{1}{\alpha T}\sum_t \big(-r_t^\top w - \zeta\big)^+
//! $$
//!
//! Mean-Variance, Mean-MAD and Mean-CVaR. A model owns its parameters only; the returns
//! matrix is passed on every call.

use std::fmt::Debug;

use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;
use tracing::info;

use super::constraints::asset_constraints;
use super::constraints::ConstraintSet;
use super::constraints::LinearBlock;
use super::objective;
use super::objective::Objective;
use super::program::ConvexProgram;
use super::types::ConstraintType;
use super::types::ModelParameters;
use super::types::ObjectiveType;
use crate::error::invalid_config;
use crate::error::QuantfolioError;
use crate::error::Result;
use crate::market::Asset;
use crate::market::Cash;
use crate::market::Holding;
use crate::market::InvestmentUniverse;
use crate::market::ReturnsMatrix;
use crate::portfolio::OptimalPortfolio;
use crate::portfolio::Portfolio;
use crate::portfolio::WEIGHT_TOLERANCE;
use crate::strategy::PortfolioSelectionModel;

/// Zero every weight with `0 < |w| < WEIGHT_TOLERANCE`, whatever its sign.
/// Returns how many entries were snapped.
pub fn snap_weights(weights: &mut Array1<f64>) -> usize {
  let mut snapped = 0;
  for w in weights.iter_mut() {
    if *w != 0.0 && w.abs() < WEIGHT_TOLERANCE {
      *w = 0.0;
      snapped += 1;
    }
  }
  snapped
}

fn check_dimensions(returns: &ReturnsMatrix) -> Result<()> {
  if returns.n_assets() == 0 {
    return Err(QuantfolioError::InsufficientData(
      "returns matrix has no assets".to_string(),
    ));
  }
  if returns.n_periods() < 2 {
    return Err(QuantfolioError::InsufficientData(format!(
      "need at least 2 return observations, got {}",
      returns.n_periods()
    )));
  }
  Ok(())
}

pub trait OptimizationModel: Debug {
  /// Class name used to label results, e.g. `MeanVariance`.
  fn name(&self) -> &'static str;

  fn parameters(&self) -> &ModelParameters;

  /// Objective over this model's variable vector.
  fn objective(&self, returns: &ReturnsMatrix) -> Result<Objective>;

  /// Asset constraints plus this model's auxiliary rows.
  fn constraints(&self, returns: &ReturnsMatrix) -> Result<ConstraintSet>;

  /// Build, solve and post-process the program for `returns`.
  fn solve(&self, returns: &ReturnsMatrix) -> Result<OptimalPortfolio> {
    self.solve_with_assets(returns, &|ticker: &str| Asset::new(ticker))
  }

  /// Like [`OptimizationModel::solve`], keying holdings by the asset `resolve` returns for each
  /// column ticker.
  fn solve_with_assets(
    &self,
    returns: &ReturnsMatrix,
    resolve: &dyn Fn(&str) -> Asset,
  ) -> Result<OptimalPortfolio> {
    check_dimensions(returns)?;
    let parameters = self.parameters();
    let n = returns.n_assets();
    let cash_pct = parameters.effective_cash_pct();

    if parameters.has(ConstraintType::MaxInstrumentWeight)
      && (n as f64) * parameters.max_instrument_weight < 1.0 - cash_pct - f64::EPSILON
    {
      return Err(QuantfolioError::InfeasibleOrUnbounded {
        status: format!(
          "{n} assets capped at {} cannot fill a budget of {}",
          parameters.max_instrument_weight,
          1.0 - cash_pct
        ),
      });
    }

    info!(
      model = self.name(),
      n_assets = n,
      n_periods = returns.n_periods(),
      "solving portfolio optimization"
    );

    let program = ConvexProgram::new(self.objective(returns)?, self.constraints(returns)?)?;
    let solution = program.solve(&parameters.solver)?;

    let mut weights = solution.x.slice(s![..n]).to_owned();
    let snapped = snap_weights(&mut weights);
    debug!(model = self.name(), snapped, "snapped near-zero weights");

    let holdings = budget_holdings(returns.tickers(), &weights, cash_pct, resolve);
    let portfolio = Portfolio::new(format!("{} Portfolio", self.name()), holdings)?;
    info!(
      model = self.name(),
      objective_value = solution.objective_value,
      iterations = solution.iterations,
      "portfolio optimization solved"
    );

    let mut optimal = OptimalPortfolio::new(portfolio, parameters.objective.description(), self.name())
      .with_returns(returns.clone());
    if let Some(last) = returns.dates().last() {
      optimal = optimal.with_start_holding_date(*last);
    }
    Ok(optimal)
  }
}

/// Asset positions in column order plus the cash position closing the budget.
///
/// Cash takes `1 - Σw`: the reserved share plus whatever snapping moved. It is negative when
/// snapped short positions leave the book levered.
pub fn budget_holdings(
  tickers: &[String],
  weights: &Array1<f64>,
  cash_pct: f64,
  resolve: &dyn Fn(&str) -> Asset,
) -> Vec<(Holding, f64)> {
  let mut holdings: Vec<(Holding, f64)> = tickers
    .iter()
    .zip(weights.iter())
    .map(|(ticker, w)| (Holding::Asset(resolve(ticker)), *w))
    .collect();

  let residual = 1.0 - weights.sum();
  if cash_pct > 0.0 || residual.abs() >= WEIGHT_TOLERANCE {
    holdings.push((Holding::Cash(Cash::default()), residual));
  }
  holdings
}

fn validated(parameters: ModelParameters, expected: ObjectiveType) -> Result<ModelParameters> {
  if parameters.objective != expected {
    return Err(invalid_config(format!(
      "{expected} model configured with objective {}",
      parameters.objective
    )));
  }
  parameters.validate()?;
  Ok(parameters)
}

/// Minimum variance.
#[derive(Clone, Debug)]
pub struct MeanVariance {
  parameters: ModelParameters,
}

impl MeanVariance {
  pub fn new(parameters: ModelParameters) -> Result<Self> {
    Ok(Self {
      parameters: validated(parameters, ObjectiveType::Variance)?,
    })
  }
}

impl OptimizationModel for MeanVariance {
  fn name(&self) -> &'static str {
    "MeanVariance"
  }

  fn parameters(&self) -> &ModelParameters {
    &self.parameters
  }

  fn objective(&self, returns: &ReturnsMatrix) -> Result<Objective> {
    objective::variance(returns)
  }

  fn constraints(&self, returns: &ReturnsMatrix) -> Result<ConstraintSet> {
    let n = returns.n_assets();
    asset_constraints(&self.parameters, n, n)
  }
}

/// Minimum mean absolute deviation, linearized with one deviation variable per observation.
#[derive(Clone, Debug)]
pub struct MeanMad {
  parameters: ModelParameters,
}

impl MeanMad {
  pub fn new(parameters: ModelParameters) -> Result<Self> {
    Ok(Self {
      parameters: validated(parameters, ObjectiveType::Mad)?,
    })
  }
}

/// Rows `±(r_t - r̄)·w - d_t ≤ 0` and `-d_t ≤ 0` over `[w, d]`.
pub fn mad_deviation_bounds(returns: &ReturnsMatrix) -> Result<LinearBlock> {
  let (t, n) = (returns.n_periods(), returns.n_assets());
  let centered = returns.values() - &returns.mean();
  let mut coefficients = Array2::zeros((3 * t, n + t));

  for row in 0..t {
    coefficients.slice_mut(s![row, ..n]).assign(&centered.row(row));
    coefficients.slice_mut(s![t + row, ..n]).assign(&(-&centered.row(row)));
    coefficients[[row, n + row]] = -1.0;
    coefficients[[t + row, n + row]] = -1.0;
    coefficients[[2 * t + row, n + row]] = -1.0;
  }

  LinearBlock::new(coefficients, Array1::zeros(3 * t))
}

impl OptimizationModel for MeanMad {
  fn name(&self) -> &'static str {
    "MeanMAD"
  }

  fn parameters(&self) -> &ModelParameters {
    &self.parameters
  }

  fn objective(&self, returns: &ReturnsMatrix) -> Result<Objective> {
    objective::mean_absolute_deviation(returns, self.parameters.regularization_weight)
  }

  fn constraints(&self, returns: &ReturnsMatrix) -> Result<ConstraintSet> {
    let (t, n) = (returns.n_periods(), returns.n_assets());
    asset_constraints(&self.parameters, n, n + t)?.with_inequalities(vec![mad_deviation_bounds(returns)?])
  }
}

/// Minimum CVaR in the Rockafellar-Uryasev form.
#[derive(Clone, Debug)]
pub struct MeanCvar {
  parameters: ModelParameters,
}

impl MeanCvar {
  pub fn new(parameters: ModelParameters) -> Result<Self> {
    Ok(Self {
      parameters: validated(parameters, ObjectiveType::Cvar)?,
    })
  }
}

/// Rows `-r_t·w - d_t - ζ ≤ 0` and `-d_t ≤ 0` over `[w, d, ζ]`.
pub fn cvar_excess_loss_bounds(returns: &ReturnsMatrix) -> Result<LinearBlock> {
  let (t, n) = (returns.n_periods(), returns.n_assets());
  let mut coefficients = Array2::zeros((2 * t, n + t + 1));

  for (row, r) in returns.values().rows().into_iter().enumerate() {
    coefficients.slice_mut(s![row, ..n]).assign(&(-&r));
    coefficients[[row, n + row]] = -1.0;
    coefficients[[row, n + t]] = -1.0;
    coefficients[[t + row, n + row]] = -1.0;
  }

  LinearBlock::new(coefficients, Array1::zeros(2 * t))
}

impl OptimizationModel for MeanCvar {
  fn name(&self) -> &'static str {
    "MeanCVaR"
  }

  fn parameters(&self) -> &ModelParameters {
    &self.parameters
  }

  fn objective(&self, returns: &ReturnsMatrix) -> Result<Objective> {
    objective::conditional_value_at_risk(
      returns,
      self.parameters.confidence_level,
      self.parameters.regularization_weight,
    )
  }

  fn constraints(&self, returns: &ReturnsMatrix) -> Result<ConstraintSet> {
    let (t, n) = (returns.n_periods(), returns.n_assets());
    asset_constraints(&self.parameters, n, n + t + 1)?
      .with_inequalities(vec![cvar_excess_loss_bounds(returns)?])
  }
}

macro_rules! impl_portfolio_selection {
  ($($model:ty),* $(,)?) => {
    $(
      impl PortfolioSelectionModel for $model {
        fn compute_optimal_portfolio(&self, universe: &InvestmentUniverse) -> Result<OptimalPortfolio> {
          self.solve_with_assets(universe.returns()?, &|ticker: &str| {
            universe.asset(ticker).cloned().unwrap_or_else(|| Asset::new(ticker))
          })
        }
      }
    )*
  };
}

impl_portfolio_selection!(MeanVariance, MeanMad, MeanCvar, Box<dyn OptimizationModel>);

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;
  use ndarray::array;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;
  use tracing_test::traced_test;

  use super::*;

  pub(crate) fn synthetic_returns(t: usize, n: usize, seed: u64) -> ReturnsMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let market = Normal::new(0.0005, 0.01).unwrap();
    let idio = Normal::new(0.0, 0.01).unwrap();

    let mut values = Array2::zeros((t, n));
    for row in 0..t {
      let m = market.sample(&mut rng);
      for col in 0..n {
        let beta = 0.5 + 0.25 * col as f64;
        values[[row, col]] = beta * m + (1.0 + 0.5 * col as f64) * idio.sample(&mut rng);
      }
    }

    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    ReturnsMatrix::new(
      (0..t).map(|i| start + chrono::Duration::days(i as i64)).collect(),
      (0..n).map(|i| format!("ASSET{i}")).collect(),
      values,
    )
    .unwrap()
  }

  fn long_only(objective: ObjectiveType) -> ModelParameters {
    ModelParameters::new(objective).with_constraint(ConstraintType::NoShortSelling)
  }

  fn asset_weights(portfolio: &OptimalPortfolio, returns: &ReturnsMatrix) -> Array1<f64> {
    returns.tickers().iter().map(|t| portfolio.weight(t)).collect()
  }

  #[test]
  fn snapping_ignores_sign() {
    let mut w = array![0.5, 5e-5, -5e-5, -0.2, 0.0, 1e-4];
    assert_eq!(snap_weights(&mut w), 2);
    assert_eq!(w, array![0.5, 0.0, 0.0, -0.2, 0.0, 1e-4]);
  }

  #[test]
  #[traced_test]
  fn mean_variance_long_only_beats_equal_weight() {
    let returns = synthetic_returns(252, 5, 42);
    let model = MeanVariance::new(long_only(ObjectiveType::Variance)).unwrap();
    let optimal = model.solve(&returns).unwrap();

    let weights = asset_weights(&optimal, &returns);
    assert!(weights.iter().all(|w| *w >= 0.0));
    assert_abs_diff_eq!(optimal.holdings().values().sum::<f64>(), 1.0, epsilon = 1e-4);

    let cov = returns.covariance().unwrap();
    let equal = Array1::from_elem(5, 0.2);
    let optimal_var = weights.dot(&cov.dot(&weights));
    let equal_var = equal.dot(&cov.dot(&equal));
    assert!(optimal_var <= equal_var + 1e-10);

    assert_eq!(optimal.name(), "MeanVariance Portfolio");
    assert_eq!(optimal.objective(), "Variance");
    assert!(optimal.returns().is_some());
    assert!(logs_contain("portfolio optimization solved"));
  }

  #[test]
  fn single_asset_gets_everything() {
    let returns = synthetic_returns(30, 1, 7);
    let optimal = MeanVariance::new(ModelParameters::default())
      .unwrap()
      .solve(&returns)
      .unwrap();
    assert_abs_diff_eq!(optimal.weight("ASSET0"), 1.0, epsilon = 1e-6);
    assert_eq!(optimal.cash(), 0.0);
  }

  #[test]
  fn solving_twice_gives_identical_holdings() {
    let returns = synthetic_returns(60, 4, 3);
    let model = MeanMad::new(long_only(ObjectiveType::Mad)).unwrap();
    let first = model.solve(&returns).unwrap();
    let second = model.solve(&returns).unwrap();
    assert_eq!(first.holdings(), second.holdings());
  }

  #[test]
  fn mad_model_is_long_only_and_fully_invested() {
    let returns = synthetic_returns(40, 4, 11);
    let model = MeanMad::new(long_only(ObjectiveType::Mad)).unwrap();
    let optimal = model.solve(&returns).unwrap();

    assert!(asset_weights(&optimal, &returns).iter().all(|w| *w >= 0.0));
    assert_abs_diff_eq!(optimal.holdings().values().sum::<f64>(), 1.0, epsilon = 1e-4);
    assert_eq!(optimal.name(), "MeanMAD Portfolio");
    assert_eq!(model.objective(&returns).unwrap().n_variables(), 4 + 40);
    assert_eq!(model.constraints(&returns).unwrap().inequality.n_rows(), 4 + 3 * 40);
  }

  #[test]
  fn cvar_model_runs_as_linear_program_without_regularization() {
    let returns = synthetic_returns(40, 3, 5);
    let params = long_only(ObjectiveType::Cvar).with_regularization_weight(0.0);
    let model = MeanCvar::new(params).unwrap();

    let objective = model.objective(&returns).unwrap();
    assert_eq!(objective.n_variables(), 3 + 40 + 1);
    assert!(objective.is_linear());

    let optimal = model.solve(&returns).unwrap();
    assert!(asset_weights(&optimal, &returns).iter().all(|w| *w >= 0.0));
    assert_abs_diff_eq!(optimal.holdings().values().sum::<f64>(), 1.0, epsilon = 1e-4);
    assert_eq!(optimal.model(), "MeanCVaR");
  }

  #[test]
  fn cash_pct_is_reserved() {
    let returns = synthetic_returns(60, 3, 9);
    let params = long_only(ObjectiveType::Variance)
      .with_constraint(ConstraintType::CashPct)
      .with_cash_pct(0.1);
    let optimal = MeanVariance::new(params).unwrap().solve(&returns).unwrap();

    assert_abs_diff_eq!(optimal.cash(), 0.1, epsilon = 1e-6);
    let invested: f64 = asset_weights(&optimal, &returns).sum();
    assert_abs_diff_eq!(invested, 0.9, epsilon = 1e-4);
  }

  #[test]
  fn max_instrument_weight_caps_positions() {
    let returns = synthetic_returns(120, 5, 13);
    let params = long_only(ObjectiveType::Variance)
      .with_constraint(ConstraintType::MaxInstrumentWeight)
      .with_max_instrument_weight(0.25);
    let optimal = MeanVariance::new(params).unwrap().solve(&returns).unwrap();
    assert!(asset_weights(&optimal, &returns).iter().all(|w| *w <= 0.25 + 1e-6));
  }

  #[test]
  fn unreachable_cap_is_infeasible() {
    let returns = synthetic_returns(30, 3, 1);
    let params = long_only(ObjectiveType::Variance)
      .with_constraint(ConstraintType::MaxInstrumentWeight)
      .with_max_instrument_weight(0.2);
    let err = MeanVariance::new(params).unwrap().solve(&returns).unwrap_err();
    assert!(matches!(err, QuantfolioError::InfeasibleOrUnbounded { .. }));
  }

  #[test]
  fn mismatched_objective_is_rejected() {
    let err = MeanMad::new(ModelParameters::new(ObjectiveType::Variance)).unwrap_err();
    assert!(matches!(err, QuantfolioError::InvalidConfiguration(_)));
  }

  #[test]
  fn too_few_observations_is_insufficient_data() {
    let returns = synthetic_returns(1, 2, 1);
    let err = MeanVariance::new(ModelParameters::default())
      .unwrap()
      .solve(&returns)
      .unwrap_err();
    assert!(matches!(err, QuantfolioError::InsufficientData(_)));
  }

  #[test]
  fn auxiliary_blocks_follow_the_layout() {
    let returns = synthetic_returns(3, 2, 2);
    let mad = mad_deviation_bounds(&returns).unwrap();
    assert_eq!(mad.coefficients().dim(), (9, 5));
    assert_eq!(mad.coefficients()[[1, 3]], -1.0);
    assert_eq!(mad.coefficients()[[7, 3]], -1.0);
    assert_eq!(mad.coefficients()[[7, 0]], 0.0);

    let cvar = cvar_excess_loss_bounds(&returns).unwrap();
    assert_eq!(cvar.coefficients().dim(), (6, 6));
    assert_eq!(cvar.coefficients()[[2, 5]], -1.0);
    assert_eq!(cvar.coefficients()[[2, 0]], -returns.values()[[2, 0]]);
    assert_eq!(cvar.coefficients()[[5, 5]], 0.0);
  }

  #[test]
  fn snapped_shorts_book_levered_cash() {
    let tickers: Vec<String> = (0..8).map(|i| format!("A{i}")).collect();
    let mut weights = array![0.6, 0.4003, -5e-5, -5e-5, -5e-5, -5e-5, -5e-5, -5e-5];
    assert_eq!(snap_weights(&mut weights), 6);

    let holdings = budget_holdings(&tickers, &weights, 0.0, &|t: &str| Asset::new(t));
    let portfolio = Portfolio::new("levered", holdings).unwrap();
    assert_abs_diff_eq!(portfolio.cash(), -3e-4, epsilon = 1e-12);
    assert_abs_diff_eq!(portfolio.holdings().values().sum::<f64>(), 1.0, epsilon = 1e-12);

    let dust = array![0.5, 0.49999, 0.0];
    let holdings = budget_holdings(&tickers[..3], &dust, 0.0, &|t: &str| Asset::new(t));
    assert!(!holdings.iter().any(|(h, _)| h.is_cash()));
  }

  #[test]
  fn budget_only_models_close_the_budget_on_wide_universes() {
    for seed in 0..3 {
      let returns = synthetic_returns(120, 40, seed);
      for objective in ObjectiveType::ALL {
        let model = crate::optimization::problem::build_model(ModelParameters::new(objective)).unwrap();
        let optimal = model.solve(&returns).unwrap();
        assert_abs_diff_eq!(optimal.holdings().values().sum::<f64>(), 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(asset_weights(&optimal, &returns).sum() + optimal.cash(), 1.0, epsilon = 1e-4);
      }
    }
  }

  #[test]
  fn regularized_cvar_is_solved_as_quadratic_program() {
    let returns = synthetic_returns(60, 4, 21);
    let model = MeanCvar::new(long_only(ObjectiveType::Cvar)).unwrap();
    assert!(!model.objective(&returns).unwrap().is_linear());

    let optimal = model.solve(&returns).unwrap();
    assert!(asset_weights(&optimal, &returns).iter().all(|w| *w >= 0.0));
    assert_abs_diff_eq!(optimal.holdings().values().sum::<f64>(), 1.0, epsilon = 1e-4);
  }

  #[test]
  fn universe_solves_keep_asset_metadata() {
    use std::sync::Arc;

    use crate::market::MarketIndex;
    use crate::market::PriceColumn;
    use crate::market::PriceTable;
    use crate::market::StaticSource;

    let returns = synthetic_returns(80, 3, 4);
    let mut prices = Array2::from_elem((81, 3), 100.0);
    for t in 0..80 {
      for i in 0..3 {
        prices[[t + 1, i]] = prices[[t, i]] * (1.0 + returns.values()[[t, i]]);
      }
    }
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let table = PriceTable::new(
      (0..81).map(|i| start + chrono::Duration::days(i)).collect(),
      returns.tickers().to_vec(),
      prices,
    )
    .unwrap();
    let members = returns
      .tickers()
      .iter()
      .map(|t| Asset::new(t.clone()).with_name(format!("{t} Holdings")).with_sector("Tech"))
      .collect();
    let source = StaticSource::new()
      .with_prices(PriceColumn::Close, table)
      .with_index(MarketIndex::Sp500, members);
    let universe = InvestmentUniverse::from_index("SP500", Arc::new(source)).unwrap();

    let optimal = MeanVariance::new(long_only(ObjectiveType::Variance))
      .unwrap()
      .compute_optimal_portfolio(&universe)
      .unwrap();
    let asset = optimal
      .holdings()
      .keys()
      .find_map(|h| match h {
        Holding::Asset(a) if a.ticker == "ASSET1" => Some(a),
        _ => None,
      })
      .unwrap();
    assert_eq!(asset.name.as_deref(), Some("ASSET1 Holdings"));
    assert_eq!(asset.sector.as_deref(), Some("Tech"));
  }
}
