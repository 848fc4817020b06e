//! # Market Data
//!
//! $$
//! r_{t,i} = \frac{P_{t,i}}{P_{t-1,i}} - 1, \qquad
//! \Sigma_{ij} = \frac{1}{T-1}\sum_t (r_{t,i}-\bar r_i)(r_{t,j}-\bar r_j)
//! $$
//!
//! Price tables, returns matrices and the sample statistics the optimizers consume.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::error::QuantfolioError;
use crate::error::Result;

/// How period returns are derived from consecutive prices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
  /// `P_t / P_{t-1} - 1`
  #[default]
  Simple,
  /// `ln(P_t / P_{t-1})`
  Log,
}

fn market_data(reason: impl Into<String>) -> QuantfolioError {
  QuantfolioError::MarketData(reason.into())
}

fn validate_axes(dates: &[NaiveDate], tickers: &[String], shape: (usize, usize)) -> Result<()> {
  if shape != (dates.len(), tickers.len()) {
    return Err(market_data(format!(
      "matrix shape {:?} does not match {} dates x {} tickers",
      shape,
      dates.len(),
      tickers.len()
    )));
  }

  if let Some(pair) = dates.windows(2).find(|pair| pair[0] >= pair[1]) {
    return Err(market_data(format!(
      "dates must be strictly ascending, found {} followed by {}",
      pair[0], pair[1]
    )));
  }

  let mut seen = HashSet::with_capacity(tickers.len());
  for ticker in tickers {
    if !seen.insert(ticker.as_str()) {
      return Err(market_data(format!("duplicate ticker column {ticker}")));
    }
  }

  Ok(())
}

/// Dates x tickers price matrix. Missing observations are `NaN`.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceTable {
  dates: Vec<NaiveDate>,
  tickers: Vec<String>,
  values: Array2<f64>,
}

impl PriceTable {
  pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, values: Array2<f64>) -> Result<Self> {
    validate_axes(&dates, &tickers, values.dim())?;
    Ok(Self {
      dates,
      tickers,
      values,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  /// Keep only the requested columns, in the requested order.
  pub fn select(&self, tickers: &[String]) -> Result<Self> {
    let indices = tickers
      .iter()
      .map(|ticker| {
        self
          .tickers
          .iter()
          .position(|t| t == ticker)
          .ok_or_else(|| market_data(format!("no prices for ticker {ticker}")))
      })
      .collect::<Result<Vec<_>>>()?;

    Self::new(
      self.dates.clone(),
      tickers.to_vec(),
      self.values.select(Axis(1), &indices),
    )
  }

  /// Keep the rows falling inside `[start, end]` (both bounds optional and inclusive).
  pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
    let rows: Vec<usize> = self
      .dates
      .iter()
      .enumerate()
      .filter(|(_, d)| start.map_or(true, |s| **d >= s) && end.map_or(true, |e| **d <= e))
      .map(|(i, _)| i)
      .collect();

    Self {
      dates: rows.iter().map(|&i| self.dates[i]).collect(),
      tickers: self.tickers.clone(),
      values: self.values.select(Axis(0), &rows),
    }
  }

  /// Parse `date,<ticker>,...` CSV. Dates are ISO `YYYY-MM-DD`; empty cells are missing prices.
  /// Rows may come in any order, they are sorted by date.
  pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
      return Err(market_data("price CSV needs a date column and at least one ticker"));
    }
    let tickers: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for record in rdr.records() {
      let record = record?;
      let raw_date = record.get(0).unwrap_or_default();
      let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
        .map_err(|e| market_data(format!("invalid date '{raw_date}': {e}")))?;

      let prices = record
        .iter()
        .skip(1)
        .map(|cell| {
          if cell.is_empty() {
            Ok(f64::NAN)
          } else {
            cell
              .parse::<f64>()
              .map_err(|e| market_data(format!("invalid price '{cell}' on {date}: {e}")))
          }
        })
        .collect::<Result<Vec<_>>>()?;
      if prices.len() != tickers.len() {
        return Err(market_data(format!(
          "row {date} has {} prices, expected {}",
          prices.len(),
          tickers.len()
        )));
      }
      rows.push((date, prices));
    }

    rows.sort_by_key(|(date, _)| *date);
    let n = tickers.len();
    let dates: Vec<NaiveDate> = rows.iter().map(|(d, _)| *d).collect();
    let flat: Vec<f64> = rows.into_iter().flat_map(|(_, p)| p).collect();
    let values = Array2::from_shape_vec((dates.len(), n), flat)
      .map_err(|e| market_data(format!("price matrix: {e}")))?;

    Self::new(dates, tickers, values)
  }

  pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
    let file = File::open(path)?;
    Self::from_csv_reader(file)
  }
}

/// Observations (rows, ascending trading days) x assets (columns) matrix of period returns.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnsMatrix {
  dates: Vec<NaiveDate>,
  tickers: Vec<String>,
  values: Array2<f64>,
}

impl ReturnsMatrix {
  pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, values: Array2<f64>) -> Result<Self> {
    validate_axes(&dates, &tickers, values.dim())?;
    if values.iter().any(|v| !v.is_finite()) {
      return Err(market_data("returns matrix contains non-finite values"));
    }

    Ok(Self {
      dates,
      tickers,
      values,
    })
  }

  /// Derive returns from prices.
  ///
  /// Columns whose share of usable observations is below `coverage_threshold` are dropped;
  /// whatever is still missing afterwards is filled with zero.
  pub fn from_prices(prices: &PriceTable, kind: ReturnKind, coverage_threshold: f64) -> Result<Self> {
    let (n_prices, n_assets) = prices.values.dim();
    if n_prices < 2 {
      return Err(QuantfolioError::InsufficientData(format!(
        "need at least 2 price observations to compute returns, got {n_prices}"
      )));
    }

    let n_periods = n_prices - 1;
    let mut raw = Array2::<f64>::from_elem((n_periods, n_assets), f64::NAN);
    for (i, column) in prices.values.axis_iter(Axis(1)).enumerate() {
      for t in 1..n_prices {
        let (prev, curr) = (column[t - 1], column[t]);
        if prev.is_finite() && curr.is_finite() && prev > 0.0 {
          raw[[t - 1, i]] = match kind {
            ReturnKind::Simple => curr / prev - 1.0,
            ReturnKind::Log if curr > 0.0 => (curr / prev).ln(),
            ReturnKind::Log => f64::NAN,
          };
        }
      }
    }

    let mut kept = Vec::with_capacity(n_assets);
    for (i, column) in raw.axis_iter(Axis(1)).enumerate() {
      let coverage = column.iter().filter(|v| v.is_finite()).count() as f64 / n_periods as f64;
      if coverage < coverage_threshold {
        warn!(
          ticker = %prices.tickers[i],
          coverage,
          coverage_threshold,
          "dropping asset with insufficient returns coverage"
        );
      } else {
        kept.push(i);
      }
    }

    let mut values = raw.select(Axis(1), &kept);
    values.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });

    Self::new(
      prices.dates[1..].to_vec(),
      kept.iter().map(|&i| prices.tickers[i].clone()).collect(),
      values,
    )
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  /// Number of asset columns (n).
  pub fn n_assets(&self) -> usize {
    self.values.ncols()
  }

  /// Number of observations (T).
  pub fn n_periods(&self) -> usize {
    self.values.nrows()
  }

  pub fn column_index(&self, ticker: &str) -> Option<usize> {
    self.tickers.iter().position(|t| t == ticker)
  }

  /// Keep only the requested columns, in the requested order.
  pub fn select(&self, tickers: &[String]) -> Result<Self> {
    let indices = tickers
      .iter()
      .map(|ticker| {
        self
          .column_index(ticker)
          .ok_or_else(|| market_data(format!("no returns for ticker {ticker}")))
      })
      .collect::<Result<Vec<_>>>()?;

    Self::new(
      self.dates.clone(),
      tickers.to_vec(),
      self.values.select(Axis(1), &indices),
    )
  }

  /// Per-asset sample mean.
  pub fn mean(&self) -> Array1<f64> {
    self
      .values
      .mean_axis(Axis(0))
      .unwrap_or_else(|| Array1::zeros(self.n_assets()))
  }

  /// Sample covariance with `T - 1` normalization.
  pub fn covariance(&self) -> Result<Array2<f64>> {
    let t = self.n_periods();
    if t < 2 {
      return Err(QuantfolioError::InsufficientData(format!(
        "covariance needs at least 2 observations, got {t}"
      )));
    }

    let centered = &self.values - &self.mean();
    Ok(centered.t().dot(&centered) / (t - 1) as f64)
  }

  /// Pearson correlation matrix.
  pub fn correlation(&self) -> Result<Array2<f64>> {
    Ok(corr_from_cov(&self.covariance()?))
  }

  /// Portfolio return series `R w` for weights aligned with the columns.
  pub fn weighted_returns(&self, weights: &Array1<f64>) -> Array1<f64> {
    self.values.dot(weights)
  }
}

pub(crate) fn corr_from_cov(cov: &Array2<f64>) -> Array2<f64> {
  let n = cov.nrows();
  let sigmas: Vec<f64> = cov.diag().iter().map(|v| v.max(0.0).sqrt()).collect();

  Array2::from_shape_fn((n, n), |(i, j)| {
    let denom = sigmas[i] * sigmas[j];
    if i == j {
      1.0
    } else if denom > 1e-15 {
      (cov[[i, j]] / denom).clamp(-1.0, 1.0)
    } else {
      0.0
    }
  })
}
