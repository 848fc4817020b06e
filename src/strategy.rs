//! # Portfolio Selection Strategies
//!
//! $$
//! f : \mathcal{U} \longrightarrow w,\qquad \sum_i w_i = 1
//! $$
//!
//! Common interface of the optimization models and hierarchical risk parity.

use std::fmt::Debug;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::market::InvestmentUniverse;
use crate::optimization::problem::build_model;
use crate::optimization::ModelParameters;
use crate::portfolio::OptimalPortfolio;

pub mod hrp;

pub use hrp::HierarchicalRiskParity;
pub use hrp::LinkageStep;

/// Anything that turns an investment universe into an optimal portfolio.
pub trait PortfolioSelectionModel: Debug {
  fn compute_optimal_portfolio(&self, universe: &InvestmentUniverse) -> Result<OptimalPortfolio>;
}

/// Strategy family selected from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
  #[default]
  Optimization,
  HierarchicalRiskParity,
}

impl StrategyKind {
  /// Build the strategy. Optimization models consume `parameters`; HRP only reads the cash share.
  pub fn build(&self, parameters: ModelParameters) -> Result<Box<dyn PortfolioSelectionModel>> {
    match self {
      StrategyKind::Optimization => Ok(Box::new(build_model(parameters)?)),
      StrategyKind::HierarchicalRiskParity => {
        parameters.validate()?;
        Ok(Box::new(HierarchicalRiskParity::with_cash_pct(
          parameters.effective_cash_pct(),
        )?))
      }
    }
  }
}

/// Binds a strategy to the universe it allocates.
#[derive(Debug)]
pub struct PortfolioSelectionProblem<'u> {
  model: Box<dyn PortfolioSelectionModel>,
  universe: &'u InvestmentUniverse,
}

impl<'u> PortfolioSelectionProblem<'u> {
  pub fn new(model: Box<dyn PortfolioSelectionModel>, universe: &'u InvestmentUniverse) -> Self {
    Self { model, universe }
  }

  pub fn solve(&self) -> Result<OptimalPortfolio> {
    let portfolio = self.model.compute_optimal_portfolio(self.universe)?;
    info!(
      portfolio = portfolio.name(),
      universe = self.universe.name(),
      "portfolio selected"
    );
    Ok(portfolio)
  }

  pub fn model(&self) -> &dyn PortfolioSelectionModel {
    self.model.as_ref()
  }

  pub fn universe(&self) -> &InvestmentUniverse {
    self.universe
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
  use crate::market::ReturnsMatrix;
  use crate::optimization::ConstraintType;
  use crate::optimization::ObjectiveType;

  fn universe() -> InvestmentUniverse {
    let mut rng = StdRng::seed_from_u64(11);
    let normal = Normal::new(0.0002, 0.01).unwrap();
    let values = Array2::from_shape_fn((80, 4), |_| normal.sample(&mut rng));
    let start = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
    let returns = ReturnsMatrix::new(
      (0..80).map(|i| start + chrono::Duration::days(i)).collect(),
      vec!["AAA".into(), "BBB".into(), "CCC".into(), "DDD".into()],
      values,
    )
    .unwrap();
    InvestmentUniverse::from_returns("strategies", returns).unwrap()
  }

  #[test]
  fn every_strategy_allocates_the_full_budget() {
    let u = universe();
    let params = ModelParameters::new(ObjectiveType::Mad).with_constraint(ConstraintType::NoShortSelling);

    for kind in [StrategyKind::Optimization, StrategyKind::HierarchicalRiskParity] {
      let problem = PortfolioSelectionProblem::new(kind.build(params.clone()).unwrap(), &u);
      let portfolio = problem.solve().unwrap();
      assert_abs_diff_eq!(portfolio.holdings().values().sum::<f64>(), 1.0, epsilon = 1e-4);
      assert!(portfolio.holdings().values().all(|w| *w >= 0.0));
    }
  }

  #[test]
  fn hrp_reads_cash_share_from_parameters() {
    let u = universe();
    let params = ModelParameters::default().with_constraint(ConstraintType::CashPct);
    let portfolio = StrategyKind::HierarchicalRiskParity
      .build(params)
      .unwrap()
      .compute_optimal_portfolio(&u)
      .unwrap();
    assert_abs_diff_eq!(portfolio.cash(), 0.02, epsilon = 1e-12);
    assert_eq!(portfolio.model(), "HierarchicalRiskParity");
  }

  #[test]
  fn strategy_kind_is_snake_case() {
    let kind: StrategyKind = serde_json::from_str("\"hierarchical_risk_parity\"").unwrap();
    assert_eq!(kind, StrategyKind::HierarchicalRiskParity);
  }
}
