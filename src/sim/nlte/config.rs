use serde::{Deserialize, Serialize};

use crate::sim::constants::{MAXITER, MINPOP, TOL};

use super::budget::BudgetPolicy;

/// Configuration of the non-LTE population solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlteConfig {
    // Outer iteration
    pub max_iterations: usize,
    /// Percentage of free vertices that must be stable.
    pub goal: f64,
    /// Consecutive iterations the goal must hold.
    pub stability_window: usize,
    /// A vertex is stable when its largest fractional population change is below this.
    pub fixset: f64,

    // Statistical equilibrium
    pub minpop: f64,
    pub tol: f64,
    pub max_stateq_iter: usize,
    pub min_stateq_iter: usize,
    /// Use series expansion of the source function below this optical depth.
    pub taylor_cutoff: f64,

    // Radiation estimator
    /// Target relative standard error of the mean intensity; the estimator
    /// stops issuing rays once every line reaches it.
    pub jbar_goal: f64,
    pub photon_budget: BudgetPolicy,
    /// Include overlapping lines in the ray integration.
    pub blend: bool,

    // Modes
    /// Set LTE populations everywhere and skip the iteration.
    pub lte_only: bool,
    /// Skip vertices already flagged converged (e.g. restored from a snapshot).
    pub freeze_converged: bool,

    // Execution
    pub seed: u64,
    /// Worker threads; 0 uses one per core.
    pub num_threads: usize,
}

impl NlteConfig {
    pub fn new() -> Self {
        Self {
            max_iterations: 16,
            goal: 50.,
            stability_window: 3,
            fixset: 1e-2,
            minpop: MINPOP,
            tol: TOL,
            max_stateq_iter: MAXITER,
            min_stateq_iter: 5,
            taylor_cutoff: 0.66,
            jbar_goal: 0.05,
            photon_budget: BudgetPolicy::default(),
            blend: false,
            lte_only: false,
            freeze_converged: false,
            seed: 1237,
            num_threads: 0,
        }
    }
}

impl Default for NlteConfig {
    fn default() -> Self {
        Self::new()
    }
}
