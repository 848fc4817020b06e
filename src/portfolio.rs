//! # Portfolio
//!
//! $$
//! \sum_{h} w_h = 1, \qquad w_{\text{cash}} = \max\Big(0,\ 1 - \sum_{i} |w_i|\Big)
//! $$
//!
//! Holdings maps, their validation and the risk/return metrics computed on top of a returns matrix.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::Array1;
use statrs::statistics::Data;
use statrs::statistics::OrderStatistics;
use statrs::statistics::Statistics;

use crate::error::invalid_config;
use crate::error::QuantfolioError;
use crate::error::Result;
use crate::market::Cash;
use crate::market::Holding;
use crate::market::ReturnsMatrix;

/// Weights below this magnitude are numerical noise.
pub const WEIGHT_TOLERANCE: f64 = 1e-4;

#[derive(Clone, Debug, PartialEq)]
pub struct Portfolio {
  name: String,
  holdings: BTreeMap<Holding, f64>,
}

impl Portfolio {
  /// Build and validate a portfolio.
  ///
  /// When no cash position is given one is synthesized as `max(0, 1 - sum |w|)`, snapped to zero
  /// below [`WEIGHT_TOLERANCE`]. An empty holdings list is a fully cash portfolio.
  pub fn new<I>(name: impl Into<String>, holdings: I) -> Result<Self>
  where
    I: IntoIterator<Item = (Holding, f64)>,
  {
    let name = name.into();
    let mut map = BTreeMap::new();
    for (holding, weight) in holdings {
      if !weight.is_finite() {
        return Err(invalid_config(format!("weight of {holding} is not finite ({weight})")));
      }
      if map.insert(holding.clone(), weight).is_some() {
        return Err(invalid_config(format!("duplicate holding {holding}")));
      }
    }

    if !map.keys().any(Holding::is_cash) {
      let invested: f64 = map.values().map(|w| w.abs()).sum();
      let mut cash = (1.0 - invested).max(0.0);
      if cash < WEIGHT_TOLERANCE {
        cash = 0.0;
      }
      map.insert(Holding::Cash(Cash::default()), cash);
    }

    let total: f64 = map.values().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
      return Err(invalid_config(format!(
        "holding weights of portfolio '{name}' should sum to one, not {total}"
      )));
    }

    Ok(Self { name, holdings: map })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn holdings(&self) -> &BTreeMap<Holding, f64> {
    &self.holdings
  }

  /// Holdings with a weight distinguishable from zero.
  pub fn nonzero_holdings(&self) -> BTreeMap<&Holding, f64> {
    self
      .holdings
      .iter()
      .filter(|(_, w)| w.abs() > f64::EPSILON)
      .map(|(h, w)| (h, *w))
      .collect()
  }

  /// Non-cash holdings with a nonzero weight.
  pub fn instruments(&self) -> Vec<&Holding> {
    self
      .nonzero_holdings()
      .into_keys()
      .filter(|h| !h.is_cash())
      .collect()
  }

  pub fn len_instruments(&self) -> usize {
    self.instruments().len()
  }

  /// Total weight held in cash, over all currencies.
  pub fn cash(&self) -> f64 {
    self
      .holdings
      .iter()
      .filter(|(h, _)| h.is_cash())
      .map(|(_, w)| w)
      .sum()
  }

  /// Weight of the asset with `ticker`, zero when not held.
  pub fn weight(&self, ticker: &str) -> f64 {
    self
      .holdings
      .iter()
      .find(|(h, _)| h.ticker() == Some(ticker))
      .map_or(0.0, |(_, w)| *w)
  }

  /// Weights aligned with the columns of `returns`.
  ///
  /// Every held instrument must have a column; cash earns nothing.
  pub fn aligned_weights(&self, returns: &ReturnsMatrix) -> Result<Array1<f64>> {
    if let Some(missing) = self
      .instruments()
      .into_iter()
      .filter_map(Holding::ticker)
      .find(|t| returns.column_index(t).is_none())
    {
      return Err(QuantfolioError::MarketData(format!(
        "no returns for held instrument {missing}"
      )));
    }

    Ok(returns.tickers().iter().map(|t| self.weight(t)).collect())
  }

  /// Per-period portfolio returns `R w`.
  pub fn returns_series(&self, returns: &ReturnsMatrix) -> Result<Array1<f64>> {
    let weights = self.aligned_weights(returns)?;
    Ok(returns.weighted_returns(&weights))
  }

  /// Sample variance of the portfolio return series.
  pub fn variance(&self, returns: &ReturnsMatrix) -> Result<f64> {
    let series = self.series_with_min_len(returns, 2)?;
    Ok(series.iter().variance())
  }

  pub fn expected_return(&self, returns: &ReturnsMatrix) -> Result<f64> {
    let series = self.series_with_min_len(returns, 1)?;
    Ok(series.iter().mean())
  }

  /// Per-period Sharpe ratio, zero for a riskless series.
  pub fn sharpe_ratio(&self, returns: &ReturnsMatrix, risk_free: f64) -> Result<f64> {
    let series = self.series_with_min_len(returns, 2)?;
    let volatility = series.iter().std_dev();
    let excess = series.iter().mean() - risk_free;

    Ok(if volatility > 1e-15 {
      excess / volatility
    } else {
      0.0
    })
  }

  /// Mean absolute deviation of the portfolio return series.
  pub fn mad(&self, returns: &ReturnsMatrix) -> Result<f64> {
    let series = self.series_with_min_len(returns, 1)?;
    let mean = series.iter().mean();
    Ok(series.iter().map(|r| (r - mean).abs()).mean())
  }

  /// Historical value at risk at tail probability `alpha`, reported as a positive loss.
  pub fn value_at_risk(&self, returns: &ReturnsMatrix, alpha: f64) -> Result<f64> {
    check_tail_probability(alpha)?;
    let series = self.series_with_min_len(returns, 1)?;
    let mut data = Data::new(series.to_vec());
    Ok(-data.quantile(alpha))
  }

  /// Historical conditional value at risk: mean loss beyond the VaR threshold.
  pub fn cvar(&self, returns: &ReturnsMatrix, alpha: f64) -> Result<f64> {
    let var = self.value_at_risk(returns, alpha)?;
    let series = self.returns_series(returns)?;
    let tail: Vec<f64> = series.iter().copied().filter(|r| *r <= -var).collect();
    if tail.is_empty() {
      return Ok(var);
    }
    Ok(-tail.iter().mean())
  }

  /// Largest peak-to-trough loss of the compounded wealth path.
  pub fn max_drawdown(&self, returns: &ReturnsMatrix) -> Result<f64> {
    let series = self.series_with_min_len(returns, 1)?;
    let mut wealth = 1.0;
    let mut peak = 1.0_f64;
    let mut drawdown = 0.0_f64;
    for r in series.iter() {
      wealth *= 1.0 + r;
      peak = peak.max(wealth);
      if peak > 0.0 {
        drawdown = drawdown.max((peak - wealth) / peak);
      }
    }
    Ok(drawdown)
  }

  fn series_with_min_len(&self, returns: &ReturnsMatrix, min_len: usize) -> Result<Array1<f64>> {
    if returns.n_periods() < min_len {
      return Err(QuantfolioError::InsufficientData(format!(
        "portfolio metric needs at least {min_len} observations, got {}",
        returns.n_periods()
      )));
    }
    self.returns_series(returns)
  }
}

fn check_tail_probability(alpha: f64) -> Result<()> {
  if alpha > 0.0 && alpha < 1.0 {
    Ok(())
  } else {
    Err(invalid_config(format!("tail probability must lie in (0, 1), got {alpha}")))
  }
}

/// A portfolio produced by a selection model, with its provenance.
#[derive(Clone, Debug)]
pub struct OptimalPortfolio {
  portfolio: Portfolio,
  objective: String,
  model: String,
  start_holding_date: Option<NaiveDate>,
  returns: Option<ReturnsMatrix>,
}

impl OptimalPortfolio {
  pub fn new(portfolio: Portfolio, objective: impl Into<String>, model: impl Into<String>) -> Self {
    Self {
      portfolio,
      objective: objective.into(),
      model: model.into(),
      start_holding_date: None,
      returns: None,
    }
  }

  pub fn with_returns(mut self, returns: ReturnsMatrix) -> Self {
    self.returns = Some(returns);
    self
  }

  pub fn with_start_holding_date(mut self, date: NaiveDate) -> Self {
    self.start_holding_date = Some(date);
    self
  }

  pub fn portfolio(&self) -> &Portfolio {
    &self.portfolio
  }

  pub fn name(&self) -> &str {
    self.portfolio.name()
  }

  pub fn holdings(&self) -> &BTreeMap<Holding, f64> {
    self.portfolio.holdings()
  }

  pub fn weight(&self, ticker: &str) -> f64 {
    self.portfolio.weight(ticker)
  }

  pub fn cash(&self) -> f64 {
    self.portfolio.cash()
  }

  /// Description of the objective that was minimized.
  pub fn objective(&self) -> &str {
    &self.objective
  }

  /// Name of the model class that produced the portfolio.
  pub fn model(&self) -> &str {
    &self.model
  }

  pub fn start_holding_date(&self) -> Option<NaiveDate> {
    self.start_holding_date
  }

  /// Returns matrix the portfolio was computed from.
  pub fn returns(&self) -> Option<&ReturnsMatrix> {
    self.returns.as_ref()
  }

  fn attached_returns(&self) -> Result<&ReturnsMatrix> {
    self.returns.as_ref().ok_or_else(|| {
      QuantfolioError::InsufficientData(format!("no returns attached to portfolio '{}'", self.name()))
    })
  }

  pub fn variance(&self) -> Result<f64> {
    self.portfolio.variance(self.attached_returns()?)
  }

  pub fn expected_return(&self) -> Result<f64> {
    self.portfolio.expected_return(self.attached_returns()?)
  }

  pub fn sharpe_ratio(&self, risk_free: f64) -> Result<f64> {
    self.portfolio.sharpe_ratio(self.attached_returns()?, risk_free)
  }

  pub fn mad(&self) -> Result<f64> {
    self.portfolio.mad(self.attached_returns()?)
  }

  pub fn value_at_risk(&self, alpha: f64) -> Result<f64> {
    self.portfolio.value_at_risk(self.attached_returns()?, alpha)
  }

  pub fn cvar(&self, alpha: f64) -> Result<f64> {
    self.portfolio.cvar(self.attached_returns()?, alpha)
  }

  pub fn max_drawdown(&self) -> Result<f64> {
    self.portfolio.max_drawdown(self.attached_returns()?)
  }
}
