//! # Portfolio Optimization
//!
//! $$
//! \min_x \tfrac12 x^\top Q x + c^\top x
//! \quad\text{s.t.}\quad A x = b,\ \ G x \le h
//! $$
//!
//! Risk objectives, linear constraints, the models combining them and the problem façade.

pub mod constraints;
pub mod models;
pub mod objective;
pub mod problem;
pub mod program;
pub mod types;

pub use constraints::ConstraintSet;
pub use constraints::LinearBlock;
pub use models::MeanCvar;
pub use models::MeanMad;
pub use models::MeanVariance;
pub use models::OptimizationModel;
pub use objective::Objective;
pub use problem::OptimizationProblem;
pub use problem::ProblemState;
pub use program::ConvexProgram;
pub use program::ProgramKind;
pub use program::SolverSettings;
pub use types::ConstraintType;
pub use types::ModelParameters;
pub use types::ObjectiveType;
