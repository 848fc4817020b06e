//! # Optimization Types
//!
//! $$
//! \theta = (\text{objective},\ \mathcal{C},\ \lambda,\ \alpha,\ c_{\text{cash}},\ \bar w)
//! $$
//!
//! Objective and constraint tags plus the hyperparameters a model is configured with.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use super::program::SolverSettings;
use crate::error::invalid_config;
use crate::error::QuantfolioError;
use crate::error::Result;

/// Cash share reserved when [`ConstraintType::CashPct`] is requested without an override.
pub const DEFAULT_CASH_PCT: f64 = 0.02;

/// Supported risk objectives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ObjectiveType {
  /// Portfolio variance `w' Σ w`.
  #[default]
  Variance,
  /// Mean absolute deviation from the mean portfolio return.
  Mad,
  /// Conditional value at risk at the configured confidence level.
  Cvar,
}

impl ObjectiveType {
  pub const ALL: [ObjectiveType; 3] = [ObjectiveType::Variance, ObjectiveType::Mad, ObjectiveType::Cvar];

  pub fn description(&self) -> &'static str {
    match self {
      ObjectiveType::Variance => "Variance",
      ObjectiveType::Mad => "Mean-Absolute-Deviation",
      ObjectiveType::Cvar => "Conditional-Value-at-Risk",
    }
  }
}

impl FromStr for ObjectiveType {
  type Err = QuantfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().replace('_', "-").as_str() {
      "variance" | "min-variance" | "mean-variance" | "mv" => Ok(Self::Variance),
      "mad" | "mean-absolute-deviation" | "mean-mad" => Ok(Self::Mad),
      "cvar" | "conditional-value-at-risk" | "mean-cvar" => Ok(Self::Cvar),
      _ => Err(invalid_config(format!(
        "unsupported objective '{s}', supported: variance, mad, cvar"
      ))),
    }
  }
}

impl TryFrom<String> for ObjectiveType {
  type Error = QuantfolioError;

  fn try_from(value: String) -> Result<Self> {
    value.parse()
  }
}

impl Display for ObjectiveType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.description())
  }
}

/// Constraints a model can be asked to honour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ConstraintType {
  /// Weights sum to `1 - cash_pct`. Always active.
  Budget,
  /// Weights are non-negative.
  NoShortSelling,
  /// Each weight is capped by `max_instrument_weight`.
  MaxInstrumentWeight,
  /// Reserve a share of the budget for cash.
  CashPct,
}

impl FromStr for ConstraintType {
  type Err = QuantfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
      "BUDGET" => Ok(Self::Budget),
      "NO_SHORTSELLING" | "NO_SHORT_SELLING" => Ok(Self::NoShortSelling),
      "MAX_INSTRUMENT_WEIGHT" => Ok(Self::MaxInstrumentWeight),
      "CASH_PCT" => Ok(Self::CashPct),
      _ => Err(invalid_config(format!(
        "unsupported constraint '{s}', supported: BUDGET, NO_SHORTSELLING, MAX_INSTRUMENT_WEIGHT, CASH_PCT"
      ))),
    }
  }
}

impl TryFrom<String> for ConstraintType {
  type Error = QuantfolioError;

  fn try_from(value: String) -> Result<Self> {
    value.parse()
  }
}

/// Everything a model needs besides the returns matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelParameters {
  pub objective: ObjectiveType,
  pub constraints: BTreeSet<ConstraintType>,
  /// Ridge weight added to the auxiliary-variable objectives.
  pub regularization_weight: f64,
  /// Tail probability α of the CVaR objective.
  pub confidence_level: f64,
  /// Cash share override, only meaningful together with [`ConstraintType::CashPct`].
  pub cash_pct: Option<f64>,
  /// Cap used by [`ConstraintType::MaxInstrumentWeight`].
  pub max_instrument_weight: f64,
  pub solver: SolverSettings,
}

impl ModelParameters {
  /// Parameters for `objective` with only the budget constraint.
  pub fn new(objective: ObjectiveType) -> Self {
    Self {
      objective,
      constraints: BTreeSet::from([ConstraintType::Budget]),
      regularization_weight: 0.05,
      confidence_level: 0.05,
      cash_pct: None,
      max_instrument_weight: 0.2,
      solver: SolverSettings::default(),
    }
  }

  pub fn with_constraint(mut self, constraint: ConstraintType) -> Self {
    self.constraints.insert(constraint);
    self
  }

  pub fn with_constraints<I>(mut self, constraints: I) -> Self
  where
    I: IntoIterator<Item = ConstraintType>,
  {
    self.constraints.extend(constraints);
    self
  }

  pub fn with_regularization_weight(mut self, weight: f64) -> Self {
    self.regularization_weight = weight;
    self
  }

  pub fn with_confidence_level(mut self, alpha: f64) -> Self {
    self.confidence_level = alpha;
    self
  }

  pub fn with_cash_pct(mut self, cash_pct: f64) -> Self {
    self.cash_pct = Some(cash_pct);
    self
  }

  pub fn with_max_instrument_weight(mut self, cap: f64) -> Self {
    self.max_instrument_weight = cap;
    self
  }

  pub fn with_solver(mut self, solver: SolverSettings) -> Self {
    self.solver = solver;
    self
  }

  pub fn has(&self, constraint: ConstraintType) -> bool {
    self.constraints.contains(&constraint)
  }

  /// Share of the budget kept in cash.
  pub fn effective_cash_pct(&self) -> f64 {
    if self.has(ConstraintType::CashPct) {
      self.cash_pct.unwrap_or(DEFAULT_CASH_PCT)
    } else {
      0.0
    }
  }

  pub fn validate(&self) -> Result<()> {
    if !self.regularization_weight.is_finite() || self.regularization_weight < 0.0 {
      return Err(invalid_config(format!(
        "regularization_weight must be finite and non-negative, got {}",
        self.regularization_weight
      )));
    }

    if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
      return Err(invalid_config(format!(
        "confidence_level must lie in (0, 1), got {}",
        self.confidence_level
      )));
    }

    if let Some(cash_pct) = self.cash_pct {
      if !self.has(ConstraintType::CashPct) {
        return Err(invalid_config(
          "a cash_pct override requires the CASH_PCT constraint",
        ));
      }
      if !(0.0..1.0).contains(&cash_pct) {
        return Err(invalid_config(format!("cash_pct must lie in [0, 1), got {cash_pct}")));
      }
    }

    if !(self.max_instrument_weight > 0.0 && self.max_instrument_weight <= 1.0) {
      return Err(invalid_config(format!(
        "max_instrument_weight must lie in (0, 1], got {}",
        self.max_instrument_weight
      )));
    }

    self.solver.validate()
  }
}

impl Default for ModelParameters {
  fn default() -> Self {
    Self::new(ObjectiveType::default())
  }
}
