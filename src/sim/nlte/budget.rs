//! Photon budget policies of the radiation estimator.

use serde::{Deserialize, Serialize};

use crate::sim::constants::{ININPHOT, MAX_PHOT};

/// Decides how many rays a vertex gets in each sweep.
pub trait PhotonBudget: Send + Sync {
    /// Budget of a vertex with `num_neigh` neighbours before the first sweep.
    fn initial(&self, num_neigh: usize) -> usize;

    /// Budget for the next sweep given the current one and whether the vertex
    /// was stable in the last sweep.
    fn next(&self, current: usize, stable: bool) -> usize;
}

/// Multiplies the budget of unstable vertices by `factor`, up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometricBudget {
    pub per_neighbour: usize,
    pub factor: f64,
    pub max: usize,
}

impl Default for GeometricBudget {
    fn default() -> Self {
        Self {
            per_neighbour: ININPHOT,
            factor: 2.,
            max: MAX_PHOT,
        }
    }
}

impl PhotonBudget for GeometricBudget {
    fn initial(&self, num_neigh: usize) -> usize {
        (self.per_neighbour * num_neigh).min(self.max)
    }

    fn next(&self, current: usize, stable: bool) -> usize {
        if stable {
            current
        } else {
            ((current as f64 * self.factor).round() as usize)
                .max(current)
                .min(self.max)
        }
    }
}

/// Constant number of rays per neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedBudget {
    pub per_neighbour: usize,
}

impl PhotonBudget for FixedBudget {
    fn initial(&self, num_neigh: usize) -> usize {
        self.per_neighbour * num_neigh
    }

    fn next(&self, current: usize, _stable: bool) -> usize {
        current
    }
}

/// Serializable choice between the built-in budgets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BudgetPolicy {
    Geometric(GeometricBudget),
    Fixed(FixedBudget),
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self::Geometric(GeometricBudget::default())
    }
}

impl PhotonBudget for BudgetPolicy {
    fn initial(&self, num_neigh: usize) -> usize {
        match self {
            Self::Geometric(b) => b.initial(num_neigh),
            Self::Fixed(b) => b.initial(num_neigh),
        }
    }

    fn next(&self, current: usize, stable: bool) -> usize {
        match self {
            Self::Geometric(b) => b.next(current, stable),
            Self::Fixed(b) => b.next(current, stable),
        }
    }
}
