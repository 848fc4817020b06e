//! # Assets
//!
//! $$
//! \text{Holding} = \text{Asset}_{\text{ticker}} \ \sqcup \ \text{Cash}_{\text{currency}}
//! $$
//!
//! Tradable instruments, the cash pseudo-asset and the key type used by portfolio holdings.

use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

use super::data::PriceTable;

/// Broad asset classes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
  #[default]
  Equity,
  Bond,
  Etf,
  Currency,
}

/// A single tradable instrument, identified by its ticker.
///
/// Equality, ordering and hashing only look at the ticker, so two descriptions of the same
/// listing collapse to one holding.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Asset {
  /// Unique ticker symbol.
  pub ticker: String,
  /// Company or fund name.
  pub name: Option<String>,
  /// Listing exchange.
  pub exchange: Option<String>,
  /// International Securities Identification Number.
  pub isin: Option<String>,
  /// Country of domicile.
  pub country: Option<String>,
  pub sector: Option<String>,
  pub industry: Option<String>,
  pub asset_class: AssetClass,
  /// Attached price history, if any.
  #[serde(skip)]
  pub prices: Option<PriceTable>,
}

impl Asset {
  pub fn new(ticker: impl Into<String>) -> Self {
    Self {
      ticker: ticker.into(),
      ..Self::default()
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
    self.exchange = Some(exchange.into());
    self
  }

  pub fn with_isin(mut self, isin: impl Into<String>) -> Self {
    self.isin = Some(isin.into());
    self
  }

  pub fn with_country(mut self, country: impl Into<String>) -> Self {
    self.country = Some(country.into());
    self
  }

  pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
    self.sector = Some(sector.into());
    self
  }

  /// Attach a price series. This is the only mutation an asset sees after creation.
  pub fn with_prices(mut self, prices: PriceTable) -> Self {
    self.prices = Some(prices);
    self
  }
}

impl PartialEq for Asset {
  fn eq(&self, other: &Self) -> bool {
    self.ticker == other.ticker
  }
}

impl Eq for Asset {}

impl Hash for Asset {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.ticker.hash(state);
  }
}

impl PartialOrd for Asset {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Asset {
  fn cmp(&self, other: &Self) -> Ordering {
    self.ticker.cmp(&other.ticker)
  }
}

impl Display for Asset {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.name.as_deref().unwrap_or(&self.ticker))
  }
}

/// Unallocated cash in a given currency.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cash {
  pub currency: String,
}

impl Cash {
  pub const DEFAULT_CURRENCY: &'static str = "EUR";

  pub fn new(currency: impl Into<String>) -> Self {
    Self {
      currency: currency.into(),
    }
  }
}

impl Default for Cash {
  fn default() -> Self {
    Self::new(Self::DEFAULT_CURRENCY)
  }
}

impl PartialEq for Cash {
  fn eq(&self, other: &Self) -> bool {
    self.currency == other.currency
  }
}

impl Eq for Cash {}

impl Hash for Cash {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.currency.hash(state);
  }
}

impl PartialOrd for Cash {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Cash {
  fn cmp(&self, other: &Self) -> Ordering {
    self.currency.cmp(&other.currency)
  }
}

impl Display for Cash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Cash ({})", self.currency)
  }
}

/// Key of a portfolio position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Holding {
  Asset(Asset),
  Cash(Cash),
}

impl Holding {
  pub fn is_cash(&self) -> bool {
    matches!(self, Holding::Cash(_))
  }

  /// Ticker of an asset position, `None` for cash.
  pub fn ticker(&self) -> Option<&str> {
    match self {
      Holding::Asset(asset) => Some(&asset.ticker),
      Holding::Cash(_) => None,
    }
  }
}

impl From<Asset> for Holding {
  fn from(asset: Asset) -> Self {
    Holding::Asset(asset)
  }
}

impl From<Cash> for Holding {
  fn from(cash: Cash) -> Self {
    Holding::Cash(cash)
  }
}

impl Display for Holding {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Holding::Asset(asset) => write!(f, "{}", asset.ticker),
      Holding::Cash(cash) => write!(f, "{cash}"),
    }
  }
}
