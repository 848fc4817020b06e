//! # Hierarchical Risk Parity
//!
//! $$
//! d_{ij}=\sqrt{\tfrac{1-\rho_{ij}}{2}},\qquad
//! \alpha = 1-\frac{\sigma^2_L}{\sigma^2_L+\sigma^2_R}
//! $$
//!
//! Single-linkage tree clustering, quasi-diagonal seriation and recursive bisection.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use tracing::debug;

use super::PortfolioSelectionModel;
use crate::error::invalid_config;
use crate::error::QuantfolioError;
use crate::error::Result;
use crate::market::Asset;
use crate::market::Cash;
use crate::market::Holding;
use crate::market::InvestmentUniverse;
use crate::market::ReturnsMatrix;
use crate::portfolio::OptimalPortfolio;
use crate::portfolio::Portfolio;

/// One merge of the agglomerative clustering.
///
/// Leaves are numbered `0..n`; the cluster created by step `k` gets id `n + k`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkageStep {
  pub left: usize,
  pub right: usize,
  pub distance: f64,
  pub size: usize,
}

#[derive(Clone, Debug, Default)]
pub struct HierarchicalRiskParity {
  cash_pct: f64,
}

impl HierarchicalRiskParity {
  pub fn new() -> Self {
    Self::default()
  }

  /// Keep `cash_pct` of the budget in cash and allocate the rest.
  pub fn with_cash_pct(cash_pct: f64) -> Result<Self> {
    if !(0.0..1.0).contains(&cash_pct) {
      return Err(invalid_config(format!("cash_pct must lie in [0, 1), got {cash_pct}")));
    }
    Ok(Self { cash_pct })
  }

  /// Correlation distance `sqrt((1 - ρ) / 2)`.
  pub fn correlation_distance(corr: &Array2<f64>) -> Array2<f64> {
    corr.mapv(|c| ((1.0 - c).max(0.0) / 2.0).sqrt())
  }

  /// Single-linkage agglomerative clustering of the correlation distance.
  pub fn tree_clustering(&self, returns: &ReturnsMatrix) -> Result<Vec<LinkageStep>> {
    let dist = Self::correlation_distance(&returns.correlation()?);
    Ok(single_linkage(&dist))
  }

  /// Leaf order placing similar assets next to each other.
  pub fn quasi_diagonalization(linkage: &[LinkageStep], n: usize) -> Vec<usize> {
    if n <= 1 || linkage.is_empty() {
      return (0..n).collect();
    }

    fn collect_leaves(node: usize, n: usize, linkage: &[LinkageStep], out: &mut Vec<usize>) {
      if node < n {
        out.push(node);
      } else {
        let step = &linkage[node - n];
        collect_leaves(step.left, n, linkage, out);
        collect_leaves(step.right, n, linkage, out);
      }
    }

    let root = n + linkage.len() - 1;
    let mut order = Vec::with_capacity(n);
    collect_leaves(root, n, linkage, &mut order);
    order
  }

  /// Split the ordered leaves in halves and share weight by inverse cluster variance.
  pub fn recursive_bisection(order: &[usize], cov: &Array2<f64>) -> Array1<f64> {
    let mut weights = Array1::ones(cov.nrows());
    bisect(order, cov, &mut weights);

    let total = weights.sum();
    if total > 1e-15 {
      weights /= total;
    }
    weights
  }

  /// HRP weights aligned with the columns of `returns`, summing to one.
  pub fn weights(&self, returns: &ReturnsMatrix) -> Result<Array1<f64>> {
    let n = returns.n_assets();
    match n {
      0 => Err(QuantfolioError::InsufficientData(
        "hierarchical risk parity needs at least one asset".to_string(),
      )),
      1 => Ok(Array1::ones(1)),
      _ => {
        let cov = returns.covariance()?;
        let linkage = self.tree_clustering(returns)?;
        let order = Self::quasi_diagonalization(&linkage, n);
        debug!(?order, "quasi-diagonal order");
        Ok(Self::recursive_bisection(&order, &cov))
      }
    }
  }
}

fn single_linkage(dist: &Array2<f64>) -> Vec<LinkageStep> {
  let n = dist.nrows();
  if n <= 1 {
    return Vec::new();
  }

  let mut d = dist.clone();
  let mut active = vec![true; n];
  let mut node_id: Vec<usize> = (0..n).collect();
  let mut size = vec![1usize; n];
  let mut linkage = Vec::with_capacity(n - 1);

  for step in 0..(n - 1) {
    let mut min_d = f64::INFINITY;
    let (mut mi, mut mj) = (0, 0);

    for i in (0..n).filter(|&i| active[i]) {
      for j in ((i + 1)..n).filter(|&j| active[j]) {
        if d[[i, j]] < min_d || mi == mj {
          min_d = d[[i, j]];
          mi = i;
          mj = j;
        }
      }
    }

    linkage.push(LinkageStep {
      left: node_id[mi],
      right: node_id[mj],
      distance: min_d,
      size: size[mi] + size[mj],
    });
    node_id[mi] = n + step;
    size[mi] += size[mj];
    active[mj] = false;

    for k in (0..n).filter(|&k| active[k] && k != mi) {
      let merged = d[[mi, k]].min(d[[mj, k]]);
      d[[mi, k]] = merged;
      d[[k, mi]] = merged;
    }
  }

  linkage
}

fn bisect(order: &[usize], cov: &Array2<f64>, weights: &mut Array1<f64>) {
  if order.len() <= 1 {
    return;
  }

  let (left, right) = order.split_at(order.len() / 2);
  let (var_left, var_right) = (cluster_variance(left, cov), cluster_variance(right, cov));
  let alpha = match var_left + var_right {
    total if total > 1e-30 => var_right / total,
    _ => 0.5,
  };

  left.iter().for_each(|&i| weights[i] *= alpha);
  right.iter().for_each(|&i| weights[i] *= 1.0 - alpha);

  bisect(left, cov, weights);
  bisect(right, cov, weights);
}

/// Variance of the inverse-variance portfolio over `indices`.
fn cluster_variance(indices: &[usize], cov: &Array2<f64>) -> f64 {
  if indices.is_empty() {
    return 0.0;
  }

  let sub = cov.select(Axis(0), indices).select(Axis(1), indices);
  let inv_var = sub.diag().mapv(|v| if v > 1e-15 { v.recip() } else { 0.0 });
  let total = inv_var.sum();
  if total < 1e-15 {
    return 1.0;
  }

  let w = inv_var / total;
  w.dot(&sub.dot(&w))
}

impl PortfolioSelectionModel for HierarchicalRiskParity {
  fn compute_optimal_portfolio(&self, universe: &InvestmentUniverse) -> Result<OptimalPortfolio> {
    let returns = universe.returns()?;
    let weights = self.weights(returns)?;

    let mut holdings: Vec<(Holding, f64)> = returns
      .tickers()
      .iter()
      .zip(weights.iter())
      .map(|(ticker, w)| {
        let asset = universe.asset(ticker).cloned().unwrap_or_else(|| Asset::new(ticker.clone()));
        (Holding::Asset(asset), w * (1.0 - self.cash_pct))
      })
      .collect();
    if self.cash_pct > 0.0 {
      holdings.push((Holding::Cash(Cash::default()), self.cash_pct));
    }

    let portfolio = Portfolio::new("Hierarchical Risk Parity", holdings)?;
    let mut optimal = OptimalPortfolio::new(portfolio, "Hierarchical-Risk-Parity", "HierarchicalRiskParity")
      .with_returns(returns.clone());
    if let Some(last) = returns.dates().last() {
      optimal = optimal.with_start_holding_date(*last);
    }
    Ok(optimal)
  }
}
