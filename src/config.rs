//! # Configuration
//!
//! $$
//! \text{TOML} \longrightarrow (\mathcal{U}, \text{strategy}, \theta, \text{solver})
//! $$
//!
//! Run configuration read from TOML. Every section and field has a default.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::market::Asset;
use crate::market::DateRange;
use crate::market::InvestmentUniverse;
use crate::market::MarketIndex;
use crate::market::PriceColumn;
use crate::market::PriceTable;
use crate::market::ReturnKind;
use crate::market::StaticSource;
use crate::market::UniverseSettings;
use crate::optimization::ConstraintType;
use crate::optimization::ModelParameters;
use crate::optimization::ObjectiveType;
use crate::optimization::SolverSettings;
use crate::strategy::PortfolioSelectionModel;
use crate::strategy::StrategyKind;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub universe: UniverseConfig,
  pub strategy: StrategyConfig,
  pub optimization: OptimizationConfig,
  pub solver: SolverSettings,
}

impl AppConfig {
  pub fn from_toml_str(s: &str) -> Result<Self> {
    Ok(toml::from_str(s)?)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let config = Self::from_toml_str(&fs::read_to_string(path)?)?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
  }

  /// Validated model parameters, solver section included.
  pub fn parameters(&self) -> Result<ModelParameters> {
    let parameters = self.optimization.to_parameters()?.with_solver(self.solver);
    parameters.validate()?;
    Ok(parameters)
  }

  /// Strategy selected by `[strategy]`, built from the other sections.
  pub fn strategy(&self) -> Result<Box<dyn PortfolioSelectionModel>> {
    self.strategy.kind.build(self.parameters()?)
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
  pub name: String,
  /// Reference index whose members make up the universe.
  pub index: Option<String>,
  /// Explicit ticker subset.
  pub tickers: Option<Vec<String>>,
  pub coverage_threshold: f64,
  pub return_kind: ReturnKind,
  pub price_column: PriceColumn,
  pub start: Option<NaiveDate>,
  pub end: Option<NaiveDate>,
}

impl Default for UniverseConfig {
  fn default() -> Self {
    let settings = UniverseSettings::default();
    Self {
      name: "custom".to_string(),
      index: None,
      tickers: None,
      coverage_threshold: settings.coverage_threshold,
      return_kind: settings.return_kind,
      price_column: settings.price_column,
      start: None,
      end: None,
    }
  }
}

impl UniverseConfig {
  pub fn settings(&self) -> Result<UniverseSettings> {
    let settings = UniverseSettings {
      coverage_threshold: self.coverage_threshold,
      return_kind: self.return_kind,
      price_column: self.price_column,
      date_range: DateRange::new(self.start, self.end),
    };
    settings.validate()?;
    Ok(settings)
  }

  /// Universe over a local price dump.
  ///
  /// With `index` set the table's columns are taken as that index's members; with `tickers`
  /// set only those columns are used. Otherwise every column is an asset.
  pub fn build(&self, prices: PriceTable) -> Result<InvestmentUniverse> {
    let settings = self.settings()?;

    let universe = match (&self.index, &self.tickers) {
      (Some(index), _) => {
        let index: MarketIndex = index.parse()?;
        let members = prices.tickers().iter().cloned().map(Asset::new).collect();
        let source = StaticSource::new()
          .with_prices(self.price_column, prices)
          .with_index(index, members);
        InvestmentUniverse::from_index(index.code(), Arc::new(source))?
      }
      (None, Some(tickers)) => {
        let source = StaticSource::new().with_prices(self.price_column, prices);
        InvestmentUniverse::from_tickers(self.name.clone(), tickers.clone(), Arc::new(source))?
      }
      (None, None) => InvestmentUniverse::from_prices(self.name.clone(), prices)?,
    };

    universe.with_settings(settings)
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
  pub kind: StrategyKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
  pub objective: ObjectiveType,
  pub constraints: Vec<ConstraintType>,
  pub regularization_weight: f64,
  pub confidence_level: f64,
  pub cash_pct: Option<f64>,
  pub max_instrument_weight: f64,
}

impl Default for OptimizationConfig {
  fn default() -> Self {
    let defaults = ModelParameters::default();
    Self {
      objective: defaults.objective,
      constraints: Vec::new(),
      regularization_weight: defaults.regularization_weight,
      confidence_level: defaults.confidence_level,
      cash_pct: None,
      max_instrument_weight: defaults.max_instrument_weight,
    }
  }
}

impl OptimizationConfig {
  pub fn to_parameters(&self) -> Result<ModelParameters> {
    let mut parameters = ModelParameters::new(self.objective)
      .with_constraints(self.constraints.iter().copied())
      .with_regularization_weight(self.regularization_weight)
      .with_confidence_level(self.confidence_level)
      .with_max_instrument_weight(self.max_instrument_weight);
    if let Some(cash_pct) = self.cash_pct {
      parameters = parameters.with_cash_pct(cash_pct);
    }

    parameters.validate()?;
    Ok(parameters)
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use ndarray::Array2;

  use super::*;
  use crate::error::QuantfolioError;

  const FULL: &str = r#"
[universe]
name = "tech"
tickers = ["AAA", "CCC"]
coverage_threshold = 0.9
return_kind = "log"
start = "2024-01-02"

[strategy]
kind = "optimization"

[optimization]
objective = "cvar"
constraints = ["NO_SHORTSELLING", "cash-pct"]
confidence_level = 0.1
cash_pct = 0.05

[solver]
max_iter = 500
tolerance = 1e-7
"#;

  fn prices() -> PriceTable {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let values = Array2::from_shape_fn((6, 3), |(t, i)| 100.0 + (t * (i + 1)) as f64 + (t % 2) as f64);
    PriceTable::new(
      (0..6).map(|i| start + chrono::Duration::days(i)).collect(),
      vec!["AAA".into(), "BBB".into(), "CCC".into()],
      values,
    )
    .unwrap()
  }

  #[test]
  fn empty_document_yields_defaults() {
    let config = AppConfig::from_toml_str("").unwrap();
    assert_eq!(config, AppConfig::default());

    let parameters = config.parameters().unwrap();
    assert_eq!(parameters.objective, ObjectiveType::Variance);
    assert!(parameters.has(ConstraintType::Budget));
    assert_eq!(parameters.solver, SolverSettings::default());
  }

  #[test]
  fn full_document_round_trips_into_parameters() {
    let config = AppConfig::from_toml_str(FULL).unwrap();
    assert_eq!(config.universe.return_kind, ReturnKind::Log);
    assert_eq!(config.universe.start, NaiveDate::from_ymd_opt(2024, 1, 2));

    let parameters = config.parameters().unwrap();
    assert_eq!(parameters.objective, ObjectiveType::Cvar);
    assert!(parameters.has(ConstraintType::NoShortSelling));
    assert_eq!(parameters.effective_cash_pct(), 0.05);
    assert_eq!(parameters.solver.max_iter, 500);
  }

  #[test]
  fn bad_values_are_rejected() {
    let unknown = AppConfig::from_toml_str("[optimization]\nobjective = \"sortino\"\n");
    assert!(matches!(unknown, Err(QuantfolioError::Toml(_))));

    let config = AppConfig::from_toml_str("[optimization]\nconfidence_level = 2.0\n").unwrap();
    assert!(matches!(config.parameters(), Err(QuantfolioError::InvalidConfiguration(_))));
  }

  #[test]
  fn load_reads_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();

    let config = AppConfig::load(file.path()).unwrap();
    assert_eq!(config.universe.name, "tech");
    assert!(AppConfig::load(file.path().with_extension("missing")).is_err());
  }

  #[test]
  fn universe_sections_select_the_assets() {
    let config = AppConfig::from_toml_str(FULL).unwrap();
    let universe = config.universe.build(prices()).unwrap();
    assert_eq!(universe.tickers(), vec!["AAA".to_string(), "CCC".to_string()]);
    assert_eq!(universe.returns().unwrap().n_periods(), 4);

    let indexed = UniverseConfig {
      index: Some("NASDAQ100".into()),
      ..UniverseConfig::default()
    };
    let universe = indexed.build(prices()).unwrap();
    assert_eq!(universe.reference_index(), Some(MarketIndex::Nasdaq100));
    assert_eq!(universe.tickers().len(), 3);

    let unsupported = UniverseConfig {
      index: Some("FTSE100".into()),
      ..UniverseConfig::default()
    };
    assert!(matches!(
      unsupported.build(prices()),
      Err(QuantfolioError::InvalidConfiguration(_))
    ));
  }
}
