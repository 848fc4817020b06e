//! # Errors
//!
//! $$
//! \text{solve} : (\mathcal{U}, \theta) \to \text{OptimalPortfolio} \ \cup \ \text{QuantfolioError}
//! $$
//!
//! Error taxonomy shared by the market model, the optimization engine and the strategies.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuantfolioError {
  /// Unsupported names, out-of-range hyperparameters or malformed holdings.
  /// Always raised while constructing an object, never deferred to solve time.
  #[error("Invalid configuration: {0}")]
  InvalidConfiguration(String),

  /// The risk objective cannot be built, e.g. a covariance matrix that fails the
  /// positive-semidefinite gate.
  #[error("Invalid objective: {0}")]
  InvalidObjective(String),

  /// The convex solver stopped without reaching optimality.
  #[error("Problem is infeasible or unbounded (solver status: {status})")]
  InfeasibleOrUnbounded { status: String },

  #[error("Insufficient data: {0}")]
  InsufficientData(String),

  /// Malformed input handed over by a market data collaborator.
  #[error("Market data error: {0}")]
  MarketData(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("CSV parsing error: {0}")]
  Csv(#[from] csv::Error),

  #[error("TOML parsing error: {0}")]
  Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, QuantfolioError>;

pub(crate) fn invalid_config(reason: impl Into<String>) -> QuantfolioError {
  QuantfolioError::InvalidConfiguration(reason.into())
}
