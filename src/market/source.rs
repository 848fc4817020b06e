//! # Market Data Sources
//!
//! $$
//! \text{source} : (\text{tickers}, \text{column}, [t_0, t_1]) \to P \in \mathbb{R}^{T \times n}
//! $$
//!
//! Contract for the collaborators that list index members and deliver prices.
//! Scraping and vendor downloads live outside this crate; an in-memory source is provided.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use serde::Deserialize;
use serde::Serialize;

use super::asset::Asset;
use super::data::PriceTable;
use crate::error::invalid_config;
use crate::error::QuantfolioError;
use crate::error::Result;

/// Reference indices a universe can be built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketIndex {
  #[serde(rename = "SP500", alias = "S&P 500")]
  Sp500,
  #[serde(rename = "NASDAQ100", alias = "NASDAQ 100")]
  Nasdaq100,
}

impl MarketIndex {
  pub const ALL: [MarketIndex; 2] = [MarketIndex::Sp500, MarketIndex::Nasdaq100];

  pub fn code(&self) -> &'static str {
    match self {
      MarketIndex::Sp500 => "SP500",
      MarketIndex::Nasdaq100 => "NASDAQ100",
    }
  }
}

impl FromStr for MarketIndex {
  type Err = QuantfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_uppercase().as_str() {
      "SP500" | "S&P 500" | "S&P500" => Ok(Self::Sp500),
      "NASDAQ100" | "NASDAQ 100" => Ok(Self::Nasdaq100),
      _ => Err(invalid_config(format!(
        "unsupported universe name '{s}', supported: {}",
        Self::ALL.map(|i| i.code()).join(", ")
      ))),
    }
  }
}

impl Display for MarketIndex {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.code())
  }
}

/// Which daily price field to read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceColumn {
  Open,
  High,
  Low,
  #[default]
  Close,
}

/// Inclusive date window; `None` leaves that side open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ImplNew)]
pub struct DateRange {
  pub start: Option<NaiveDate>,
  pub end: Option<NaiveDate>,
}

/// Collaborator delivering index membership and prices.
pub trait MarketDataSource: Debug {
  /// Members of a reference index.
  fn list_assets(&self, index: MarketIndex) -> Result<Vec<Asset>>;

  /// Prices for `tickers`, rows ascending by date, columns in the order requested.
  fn get_prices(&self, tickers: &[String], column: PriceColumn, range: &DateRange) -> Result<PriceTable>;
}

/// In-memory source holding one price table per column and fixed index memberships.
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
  prices: HashMap<PriceColumn, PriceTable>,
  members: HashMap<MarketIndex, Vec<Asset>>,
}

impl StaticSource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_prices(mut self, column: PriceColumn, prices: PriceTable) -> Self {
    self.prices.insert(column, prices);
    self
  }

  pub fn with_index(mut self, index: MarketIndex, members: Vec<Asset>) -> Self {
    self.members.insert(index, members);
    self
  }
}

impl MarketDataSource for StaticSource {
  fn list_assets(&self, index: MarketIndex) -> Result<Vec<Asset>> {
    self
      .members
      .get(&index)
      .cloned()
      .ok_or_else(|| QuantfolioError::MarketData(format!("no membership data for index {index}")))
  }

  fn get_prices(&self, tickers: &[String], column: PriceColumn, range: &DateRange) -> Result<PriceTable> {
    let table = self
      .prices
      .get(&column)
      .ok_or_else(|| QuantfolioError::MarketData(format!("no {column:?} prices loaded")))?;

    Ok(table.select(tickers)?.between(range.start, range.end))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index_names_are_whitelisted() {
    assert_eq!("SP500".parse::<MarketIndex>().unwrap(), MarketIndex::Sp500);
    assert_eq!("S&P 500".parse::<MarketIndex>().unwrap(), MarketIndex::Sp500);
    assert_eq!("nasdaq 100".parse::<MarketIndex>().unwrap(), MarketIndex::Nasdaq100);

    let err = "FTSE100".parse::<MarketIndex>().unwrap_err();
    assert!(matches!(err, QuantfolioError::InvalidConfiguration(_)));
  }

  #[test]
  fn static_source_reports_missing_data() {
    let source = StaticSource::new();
    assert!(source.list_assets(MarketIndex::Nasdaq100).is_err());
    assert!(source
      .get_prices(&["AAPL".to_string()], PriceColumn::Close, &DateRange::default())
      .is_err());
  }
}
