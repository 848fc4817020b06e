//! # Investment Universe
//!
//! $$
//! \mathcal{U} = \big(\{a_1,\dots,a_n\},\ R \in \mathbb{R}^{T \times n'}\big), \qquad n' \le n
//! $$
//!
//! A named set of assets plus the returns matrix derived from their prices.
//! Returns are computed on first access and cached; prices or returns can be injected.

use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::asset::Asset;
use super::data::PriceTable;
use super::data::ReturnKind;
use super::data::ReturnsMatrix;
use super::source::DateRange;
use super::source::MarketDataSource;
use super::source::MarketIndex;
use super::source::PriceColumn;
use crate::error::invalid_config;
use crate::error::QuantfolioError;
use crate::error::Result;

/// How prices are fetched and turned into returns.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseSettings {
  /// Minimum share of usable return observations an asset needs to stay in the matrix.
  pub coverage_threshold: f64,
  pub return_kind: ReturnKind,
  pub price_column: PriceColumn,
  #[serde(skip)]
  pub date_range: DateRange,
}

impl Default for UniverseSettings {
  fn default() -> Self {
    Self {
      coverage_threshold: 0.95,
      return_kind: ReturnKind::Simple,
      price_column: PriceColumn::Close,
      date_range: DateRange::default(),
    }
  }
}

impl UniverseSettings {
  pub fn validate(&self) -> Result<()> {
    if !(0.0..=1.0).contains(&self.coverage_threshold) {
      return Err(invalid_config(format!(
        "coverage_threshold must lie in [0, 1], got {}",
        self.coverage_threshold
      )));
    }
    if let (Some(start), Some(end)) = (self.date_range.start, self.date_range.end) {
      if start > end {
        return Err(invalid_config(format!("date range start {start} is after end {end}")));
      }
    }
    Ok(())
  }
}

#[derive(Debug)]
pub struct InvestmentUniverse {
  name: String,
  reference_index: Option<MarketIndex>,
  assets: BTreeSet<Asset>,
  settings: UniverseSettings,
  source: Option<Arc<dyn MarketDataSource>>,
  prices: OnceCell<PriceTable>,
  returns: OnceCell<ReturnsMatrix>,
}

impl InvestmentUniverse {
  /// Universe made of the members of a supported reference index.
  ///
  /// The name is checked against the whitelist before the source is contacted.
  pub fn from_index(index_name: &str, source: Arc<dyn MarketDataSource>) -> Result<Self> {
    let index: MarketIndex = index_name.parse()?;
    let assets: BTreeSet<Asset> = source.list_assets(index)?.into_iter().collect();
    if assets.is_empty() {
      return Err(QuantfolioError::MarketData(format!("index {index} has no members")));
    }

    debug!(%index, n_assets = assets.len(), "universe built from reference index");
    Ok(Self {
      name: index.code().to_string(),
      reference_index: Some(index),
      assets,
      settings: UniverseSettings::default(),
      source: Some(source),
      prices: OnceCell::new(),
      returns: OnceCell::new(),
    })
  }

  /// Universe made of an explicit ticker set. Prices come from `source` on first use.
  pub fn from_tickers<I, S>(name: impl Into<String>, tickers: I, source: Arc<dyn MarketDataSource>) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let assets = Self::asset_set(tickers)?;
    Ok(Self {
      name: name.into(),
      reference_index: None,
      assets,
      settings: UniverseSettings::default(),
      source: Some(source),
      prices: OnceCell::new(),
      returns: OnceCell::new(),
    })
  }

  /// Universe over injected prices; the asset set is the price table's columns.
  pub fn from_prices(name: impl Into<String>, prices: PriceTable) -> Result<Self> {
    let assets = Self::asset_set(prices.tickers().iter().cloned())?;
    Ok(Self {
      name: name.into(),
      reference_index: None,
      assets,
      settings: UniverseSettings::default(),
      source: None,
      prices: OnceCell::from(prices),
      returns: OnceCell::new(),
    })
  }

  /// Universe over an injected returns matrix.
  pub fn from_returns(name: impl Into<String>, returns: ReturnsMatrix) -> Result<Self> {
    let assets = Self::asset_set(returns.tickers().iter().cloned())?;
    Ok(Self {
      name: name.into(),
      reference_index: None,
      assets,
      settings: UniverseSettings::default(),
      source: None,
      prices: OnceCell::new(),
      returns: OnceCell::from(returns),
    })
  }

  pub fn with_settings(mut self, settings: UniverseSettings) -> Result<Self> {
    settings.validate()?;
    self.settings = settings;
    Ok(self)
  }

  fn asset_set<I, S>(tickers: I) -> Result<BTreeSet<Asset>>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let assets: BTreeSet<Asset> = tickers.into_iter().map(Asset::new).collect();
    if assets.is_empty() {
      return Err(invalid_config(
        "a universe needs either a supported index name or a non-empty ticker set",
      ));
    }
    Ok(assets)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn reference_index(&self) -> Option<MarketIndex> {
    self.reference_index
  }

  pub fn assets(&self) -> &BTreeSet<Asset> {
    &self.assets
  }

  pub fn settings(&self) -> &UniverseSettings {
    &self.settings
  }

  /// Tickers of the asset set, sorted.
  pub fn tickers(&self) -> Vec<String> {
    self.assets.iter().map(|a| a.ticker.clone()).collect()
  }

  pub fn asset(&self, ticker: &str) -> Option<&Asset> {
    self.assets.iter().find(|a| a.ticker == ticker)
  }

  /// Prices of the asset set, fetched once.
  pub fn prices(&self) -> Result<&PriceTable> {
    if let Some(prices) = self.prices.get() {
      return Ok(prices);
    }

    let source = self.source.as_ref().ok_or_else(|| {
      QuantfolioError::MarketData(format!("universe {} has neither prices nor a data source", self.name))
    })?;
    let prices = source.get_prices(&self.tickers(), self.settings.price_column, &self.settings.date_range)?;
    debug!(universe = %self.name, rows = prices.dates().len(), "prices loaded");

    Ok(self.prices.get_or_init(|| prices))
  }

  /// Returns matrix, computed on first access and cached.
  pub fn returns(&self) -> Result<&ReturnsMatrix> {
    if let Some(returns) = self.returns.get() {
      return Ok(returns);
    }

    let range = self.settings.date_range;
    let prices = self.prices()?.between(range.start, range.end);
    let returns = ReturnsMatrix::from_prices(
      &prices,
      self.settings.return_kind,
      self.settings.coverage_threshold,
    )?;
    debug!(
      universe = %self.name,
      n_assets = returns.n_assets(),
      n_periods = returns.n_periods(),
      "returns matrix materialized"
    );

    Ok(self.returns.get_or_init(|| returns))
  }
}
