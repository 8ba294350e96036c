//! Non-LTE level populations: radiation estimator, rate equations and the
//! outer iteration tying them together.

pub mod budget;
pub mod config;
pub mod driver;
pub mod estimator;
pub mod stateq;

pub use budget::{BudgetPolicy, FixedBudget, GeometricBudget, PhotonBudget};
pub use config::NlteConfig;
pub use driver::{ConvergenceDriver, ConvergenceReport, ConvergenceState, IterationStats};
