//! # Convex Program
//!
//! $$
//! \min_x \tfrac12 x^\top Q x + c^\top x
//! \quad\text{s.t.}\quad A x = b,\ \ G x \le h
//! $$
//!
//! Dimension-checked program assembly and the adapter to the interior-point conic solver.
//! Equality rows go to a zero cone, inequality rows to a nonnegative cone.

use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettingsBuilder;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::SolverStatus;
use clarabel::solver::SupportedConeT;
use ndarray::concatenate;
use ndarray::Array1;
use ndarray::ArrayView2;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::constraints::ConstraintSet;
use super::objective::Objective;
use crate::error::invalid_config;
use crate::error::QuantfolioError;
use crate::error::Result;

/// Interior-point solver knobs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
  pub max_iter: u32,
  /// Absolute and relative gap tolerance, also used as feasibility tolerance.
  pub tolerance: f64,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      max_iter: 200,
      tolerance: 1e-8,
    }
  }
}

impl SolverSettings {
  pub fn validate(&self) -> Result<()> {
    if self.max_iter == 0 {
      return Err(invalid_config("solver max_iter must be positive"));
    }
    if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
      return Err(invalid_config(format!(
        "solver tolerance must be finite and positive, got {}",
        self.tolerance
      )));
    }
    Ok(())
  }
}

/// Which solver mode a program needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramKind {
  /// Quadratic term is exactly zero.
  Linear,
  Quadratic,
}

/// Optimal point returned by the solver.
#[derive(Clone, Debug)]
pub struct Solution {
  pub x: Array1<f64>,
  pub objective_value: f64,
  pub iterations: u32,
}

#[derive(Clone, Debug)]
pub struct ConvexProgram {
  objective: Objective,
  constraints: ConstraintSet,
  kind: ProgramKind,
}

impl ConvexProgram {
  pub fn new(objective: Objective, constraints: ConstraintSet) -> Result<Self> {
    let k = objective.n_variables();
    if objective.quadratic.dim() != (k, k) {
      return Err(QuantfolioError::InvalidObjective(format!(
        "quadratic term is {:?}, expected {k}x{k}",
        objective.quadratic.dim()
      )));
    }
    if constraints.n_variables() != k {
      return Err(invalid_config(format!(
        "constraints act on {} variables, objective on {k}",
        constraints.n_variables()
      )));
    }

    let kind = if objective.is_linear() {
      ProgramKind::Linear
    } else {
      ProgramKind::Quadratic
    };

    Ok(Self {
      objective,
      constraints,
      kind,
    })
  }

  pub fn kind(&self) -> ProgramKind {
    self.kind
  }

  pub fn objective(&self) -> &Objective {
    &self.objective
  }

  pub fn constraints(&self) -> &ConstraintSet {
    &self.constraints
  }

  pub fn n_variables(&self) -> usize {
    self.objective.n_variables()
  }

  /// Solve the program. Anything short of an optimal status is an error.
  pub fn solve(&self, settings: &SolverSettings) -> Result<Solution> {
    let k = self.n_variables();
    let equality = &self.constraints.equality;
    let inequality = &self.constraints.inequality;

    let p = match self.kind {
      ProgramKind::Linear => CscMatrix::new(k, k, vec![0; k + 1], Vec::new(), Vec::new()),
      ProgramKind::Quadratic => to_csc(self.objective.quadratic.view(), true),
    };
    let q = self.objective.linear.to_vec();

    let a_dense = concatenate(
      Axis(0),
      &[equality.coefficients().view(), inequality.coefficients().view()],
    )
    .map_err(|e| invalid_config(format!("stacking constraint rows: {e}")))?;
    let a = to_csc(a_dense.view(), false);
    let b: Vec<f64> = equality
      .bounds()
      .iter()
      .chain(inequality.bounds().iter())
      .copied()
      .collect();

    let mut cones = Vec::with_capacity(2);
    if equality.n_rows() > 0 {
      cones.push(SupportedConeT::ZeroConeT(equality.n_rows()));
    }
    if inequality.n_rows() > 0 {
      cones.push(SupportedConeT::NonnegativeConeT(inequality.n_rows()));
    }

    debug!(
      kind = ?self.kind,
      n_variables = k,
      n_equalities = equality.n_rows(),
      n_inequalities = inequality.n_rows(),
      "solving convex program"
    );

    let solver_settings = DefaultSettingsBuilder::default()
      .max_iter(settings.max_iter)
      .tol_gap_abs(settings.tolerance)
      .tol_gap_rel(settings.tolerance)
      .tol_feas(settings.tolerance)
      .verbose(false)
      .build()
      .map_err(|e| invalid_config(format!("solver settings: {e}")))?;

    let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, solver_settings).map_err(|e| {
      QuantfolioError::InfeasibleOrUnbounded {
        status: format!("{e:?}"),
      }
    })?;
    solver.solve();

    let status = &solver.solution.status;
    if !matches!(status, SolverStatus::Solved) {
      return Err(QuantfolioError::InfeasibleOrUnbounded {
        status: format!("{status:?}"),
      });
    }

    let x = Array1::from(solver.solution.x.clone());
    if x.iter().any(|v| !v.is_finite()) {
      return Err(QuantfolioError::InfeasibleOrUnbounded {
        status: "non-finite solution".to_string(),
      });
    }

    Ok(Solution {
      x,
      objective_value: solver.solution.obj_val,
      iterations: solver.info.iterations,
    })
  }
}

/// Compressed sparse column copy of a dense matrix, optionally keeping only the upper triangle.
fn to_csc(dense: ArrayView2<f64>, upper_triangle: bool) -> CscMatrix<f64> {
  let (m, n) = dense.dim();
  let mut colptr = Vec::with_capacity(n + 1);
  let mut rowval = Vec::new();
  let mut nzval = Vec::new();

  colptr.push(0);
  for j in 0..n {
    let rows = if upper_triangle { (j + 1).min(m) } else { m };
    for i in 0..rows {
      let v = dense[[i, j]];
      if v != 0.0 {
        rowval.push(i);
        nzval.push(v);
      }
    }
    colptr.push(nzval.len());
  }

  CscMatrix::new(m, n, colptr, rowval, nzval)
}
