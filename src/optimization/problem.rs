//! # Optimization Problem
//!
//! $$
//! \text{Configured} \xrightarrow{\ \text{solve}\ } \text{Solved}
//! $$
//!
//! Binds one model, chosen through a dispatch table, to one investment universe.

use tracing::debug;

use super::constraints::ConstraintSet;
use super::models::MeanCvar;
use super::models::MeanMad;
use super::models::MeanVariance;
use super::models::OptimizationModel;
use super::objective::Objective;
use super::types::ModelParameters;
use super::types::ObjectiveType;
use crate::error::invalid_config;
use crate::error::Result;
use crate::market::InvestmentUniverse;
use crate::portfolio::OptimalPortfolio;
use crate::strategy::PortfolioSelectionModel;

type ModelConstructor = fn(ModelParameters) -> Result<Box<dyn OptimizationModel>>;

const MODEL_TABLE: [(ObjectiveType, ModelConstructor); 3] = [
  (ObjectiveType::Variance, mean_variance),
  (ObjectiveType::Mad, mean_mad),
  (ObjectiveType::Cvar, mean_cvar),
];

fn mean_variance(parameters: ModelParameters) -> Result<Box<dyn OptimizationModel>> {
  Ok(Box::new(MeanVariance::new(parameters)?))
}

fn mean_mad(parameters: ModelParameters) -> Result<Box<dyn OptimizationModel>> {
  Ok(Box::new(MeanMad::new(parameters)?))
}

fn mean_cvar(parameters: ModelParameters) -> Result<Box<dyn OptimizationModel>> {
  Ok(Box::new(MeanCvar::new(parameters)?))
}

/// Model for `parameters.objective`, with validated parameters.
pub fn build_model(parameters: ModelParameters) -> Result<Box<dyn OptimizationModel>> {
  let (_, constructor) = MODEL_TABLE
    .iter()
    .find(|(objective, _)| *objective == parameters.objective)
    .ok_or_else(|| invalid_config(format!("no model for objective {}", parameters.objective)))?;
  constructor(parameters)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemState {
  Configured,
  Solved,
}

#[derive(Debug)]
pub struct OptimizationProblem<'u> {
  model: Box<dyn OptimizationModel>,
  universe: &'u InvestmentUniverse,
  state: ProblemState,
}

impl<'u> OptimizationProblem<'u> {
  /// Validate `parameters` and resolve the model once.
  pub fn new(parameters: ModelParameters, universe: &'u InvestmentUniverse) -> Result<Self> {
    let model = build_model(parameters)?;
    debug!(model = model.name(), universe = universe.name(), "optimization problem configured");

    Ok(Self {
      model,
      universe,
      state: ProblemState::Configured,
    })
  }

  /// Solve against the universe's returns. Repeated calls recompute from scratch.
  pub fn solve(&mut self) -> Result<OptimalPortfolio> {
    let portfolio = self.model.compute_optimal_portfolio(self.universe)?;
    self.state = ProblemState::Solved;
    Ok(portfolio)
  }

  pub fn state(&self) -> ProblemState {
    self.state
  }

  pub fn model(&self) -> &dyn OptimizationModel {
    self.model.as_ref()
  }

  pub fn universe(&self) -> &InvestmentUniverse {
    self.universe
  }

  /// Objective the model would minimize for this universe.
  pub fn objective(&self) -> Result<Objective> {
    self.model.objective(self.universe.returns()?)
  }

  /// Constraint blocks the model would impose for this universe.
  pub fn constraints(&self) -> Result<ConstraintSet> {
    self.model.constraints(self.universe.returns()?)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;
  use ndarray::Array2;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;

  use super::*;
  use crate::error::QuantfolioError;
  use crate::market::ReturnsMatrix;
  use crate::optimization::types::ConstraintType;

  fn universe(t: usize, n: usize) -> InvestmentUniverse {
    let mut rng = StdRng::seed_from_u64(2024);
    let normal = Normal::new(0.0003, 0.012).unwrap();
    let values = Array2::from_shape_fn((t, n), |_| normal.sample(&mut rng));
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let returns = ReturnsMatrix::new(
      (0..t).map(|i| start + chrono::Duration::days(i as i64)).collect(),
      (0..n).map(|i| format!("T{i}")).collect(),
      values,
    )
    .unwrap();
    InvestmentUniverse::from_returns("synthetic", returns).unwrap()
  }

  #[test]
  fn dispatch_table_selects_the_model() {
    let u = universe(30, 3);
    for (objective, name) in [
      (ObjectiveType::Variance, "MeanVariance"),
      (ObjectiveType::Mad, "MeanMAD"),
      (ObjectiveType::Cvar, "MeanCVaR"),
    ] {
      let problem = OptimizationProblem::new(ModelParameters::new(objective), &u).unwrap();
      assert_eq!(problem.model().name(), name);
      assert_eq!(problem.state(), ProblemState::Configured);
    }
  }

  #[test]
  fn invalid_parameters_fail_at_construction() {
    let u = universe(30, 3);
    let params = ModelParameters::new(ObjectiveType::Cvar).with_confidence_level(1.5);
    let err = OptimizationProblem::new(params, &u).unwrap_err();
    assert!(matches!(err, QuantfolioError::InvalidConfiguration(_)));
  }

  #[test]
  fn solve_transitions_state_and_is_repeatable() {
    let u = universe(120, 4);
    let params = ModelParameters::new(ObjectiveType::Variance).with_constraint(ConstraintType::NoShortSelling);
    let mut problem = OptimizationProblem::new(params, &u).unwrap();

    let first = problem.solve().unwrap();
    assert_eq!(problem.state(), ProblemState::Solved);
    let second = problem.solve().unwrap();

    assert_eq!(first.holdings(), second.holdings());
    assert_abs_diff_eq!(first.holdings().values().sum::<f64>(), 1.0, epsilon = 1e-4);
  }

  #[test]
  fn inspection_exposes_program_shapes() {
    let u = universe(25, 3);
    let problem = OptimizationProblem::new(ModelParameters::new(ObjectiveType::Cvar), &u).unwrap();
    assert_eq!(problem.objective().unwrap().n_variables(), 3 + 25 + 1);
    assert_eq!(problem.constraints().unwrap().inequality.n_rows(), 2 * 25);
  }
}
