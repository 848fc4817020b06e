//! # quantfolio
//!
//! $$
//! w^\star = \arg\min_{w \in \mathcal{W}} \ \rho(w)
//! $$
//!
//! Portfolio selection for retail investors: Mean-Variance, Mean-MAD, Mean-CVaR and
//! Hierarchical Risk Parity over an investment universe of stocks.
//!
//! ```ignore
//! use quantfolio::prelude::*;
//!
//! let universe = InvestmentUniverse::from_prices("demo", PriceTable::from_csv_path("prices.csv")?)?;
//! let params = ModelParameters::new(ObjectiveType::Variance).with_constraint(ConstraintType::NoShortSelling);
//! let portfolio = OptimizationProblem::new(params, &universe)?.solve()?;
//! ```

pub mod config;
pub mod error;
pub mod market;
pub mod optimization;
pub mod portfolio;
pub mod strategy;

pub mod prelude {
  pub use crate::config::AppConfig;
  pub use crate::error::QuantfolioError;
  pub use crate::error::Result;
  pub use crate::market::Asset;
  pub use crate::market::Cash;
  pub use crate::market::Holding;
  pub use crate::market::InvestmentUniverse;
  pub use crate::market::MarketDataSource;
  pub use crate::market::PriceTable;
  pub use crate::market::ReturnsMatrix;
  pub use crate::optimization::ConstraintType;
  pub use crate::optimization::ModelParameters;
  pub use crate::optimization::ObjectiveType;
  pub use crate::optimization::OptimizationModel;
  pub use crate::optimization::OptimizationProblem;
  pub use crate::portfolio::OptimalPortfolio;
  pub use crate::portfolio::Portfolio;
  pub use crate::strategy::HierarchicalRiskParity;
  pub use crate::strategy::PortfolioSelectionModel;
  pub use crate::strategy::PortfolioSelectionProblem;
  pub use crate::strategy::StrategyKind;
}
