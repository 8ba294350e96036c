//! Outer accelerated-lambda iteration over the whole grid.
//!
//! Each sweep reads the populations left by the previous sweep, computes new
//! populations for every free vertex in parallel, and only then writes them
//! back (Jacobi update).

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::LineError;
use crate::sim::blend::BlendInfo;
use crate::sim::grid::Grid;
use crate::sim::population::max_relative_change;

use super::budget::PhotonBudget;
use super::config::NlteConfig;
use super::estimator::Estimator;
use super::stateq::solve_species;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    Unconverged,
    Iterating,
    Converged,
    Failed,
}

/// Summary of one sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationStats {
    pub iteration: usize,
    /// Percentage of free vertices whose populations changed less than `fixset`.
    pub percent_stable: f64,
    /// Largest fractional population change over all updated vertices.
    pub max_change: f64,
    /// Free vertices not flagged converged after the sweep.
    pub unconverged: usize,
    pub lte_fallbacks: usize,
    pub rays: usize,
}

#[derive(Debug)]
pub struct ConvergenceReport {
    pub state: ConvergenceState,
    pub iterations: usize,
    pub history: Vec<IterationStats>,
    /// Recovered errors: LTE fallbacks and a final convergence failure.
    pub warnings: Vec<LineError>,
}

/// New populations of one vertex computed from the frozen grid.
struct VertexUpdate {
    id: usize,
    pops: Vec<Vec<f64>>,
    change: f64,
    errors: Vec<LineError>,
    rays: usize,
}

pub struct ConvergenceDriver {
    config: NlteConfig,
    budget: Box<dyn PhotonBudget>,
    state: ConvergenceState,
}

impl ConvergenceDriver {
    pub fn new(config: NlteConfig) -> Self {
        let budget = Box::new(config.photon_budget);
        Self {
            config,
            budget,
            state: ConvergenceState::Unconverged,
        }
    }

    /// Replaces the photon budget policy of the configuration.
    pub fn with_budget(mut self, budget: impl PhotonBudget + 'static) -> Self {
        self.budget = Box::new(budget);
        self
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    pub fn config(&self) -> &NlteConfig {
        &self.config
    }

    /// Iterates until the convergence goal holds or the iteration cap is hit.
    ///
    /// Failing to converge is not an error: the report carries the state and
    /// the populations left in `grid` are the best available.
    pub fn run(&mut self, grid: &mut Grid) -> Result<ConvergenceReport> {
        let config = &self.config;
        let mut report = ConvergenceReport {
            state: self.state,
            iterations: 0,
            history: Vec::new(),
            warnings: Vec::new(),
        };

        if config.lte_only {
            for id in 0..grid.points().len() {
                if !grid.is_sink(id) {
                    grid.set_lte(id);
                }
            }
            info!("LTE populations set, skipping iteration");
            self.state = ConvergenceState::Converged;
            report.state = self.state;
            return Ok(report);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build()
            .context("Failed to build worker pool")?;

        for id in 0..grid.points().len() {
            let num_neigh = grid.mesh().vertex(id).num_neigh();
            grid.point_mut(id).nphot = self.budget.initial(num_neigh);
        }

        self.state = ConvergenceState::Iterating;
        let mut streak = 0;
        for iteration in 1..=config.max_iterations {
            let (stats, errors) = pool.install(|| self.sweep(grid, iteration));
            info!(
                iteration,
                percent_stable = stats.percent_stable,
                max_change = stats.max_change,
                unconverged = stats.unconverged,
                lte_fallbacks = stats.lte_fallbacks,
                "sweep done"
            );
            report.warnings.extend(errors);

            streak = if stats.percent_stable >= config.goal {
                streak + 1
            } else {
                0
            };
            report.history.push(stats);
            report.iterations = iteration;
            if streak >= config.stability_window {
                self.state = ConvergenceState::Converged;
                break;
            }
        }

        if self.state != ConvergenceState::Converged {
            self.state = ConvergenceState::Failed;
            let percent = report.history.last().map_or(0., |s| s.percent_stable);
            let err = LineError::ConvergenceFailure {
                iterations: report.iterations,
                percent,
            };
            warn!("{err}");
            report.warnings.push(err);
        }
        report.state = self.state;
        Ok(report)
    }

    /// One Jacobi sweep over all free vertices.
    pub fn sweep(&self, grid: &mut Grid, iteration: usize) -> (IterationStats, Vec<LineError>) {
        let config = &self.config;
        let ids: Vec<usize> = (0..grid.points().len())
            .filter(|&id| !grid.is_sink(id))
            .collect();
        let num_free = ids.len();

        let updates: Vec<VertexUpdate> = {
            let frozen: &Grid = grid;
            let no_blends;
            let blends = if config.blend {
                frozen.blends()
            } else {
                no_blends = BlendInfo::empty(frozen.mols());
                &no_blends
            };
            let estimator =
                Estimator::new(frozen, blends, config.taylor_cutoff, config.jbar_goal);
            ids.par_iter()
                .filter(|&&id| !(config.freeze_converged && frozen.point(id).converged))
                .map(|&id| update_vertex(frozen, &estimator, config, iteration, id))
                .collect()
        };

        let mut stable = num_free - updates.len();
        let mut max_change = 0f64;
        let mut lte_fallbacks = 0;
        let mut rays = 0;
        let mut errors = Vec::new();
        for up in updates {
            let is_stable = up.errors.is_empty() && up.change < config.fixset;
            max_change = max_change.max(up.change);
            rays += up.rays;
            if is_stable {
                stable += 1;
            }
            let budget = self.budget.next(grid.point(up.id).nphot, is_stable);
            let point = grid.point_mut(up.id);
            for (pop, new) in point.mol.iter_mut().zip(up.pops) {
                pop.pops = new;
            }
            point.nphot = budget;
            if !up.errors.is_empty() {
                lte_fallbacks += up.errors.len();
                point.converged = false;
                errors.extend(up.errors);
            } else if is_stable {
                point.converged = true;
            }
        }

        let unconverged = grid
            .points()
            .iter()
            .filter(|p| !grid.is_sink(p.id) && !p.converged)
            .count();
        let percent_stable = if num_free == 0 {
            100.
        } else {
            100. * stable as f64 / num_free as f64
        };
        let stats = IterationStats {
            iteration,
            percent_stable,
            max_change,
            unconverged,
            lte_fallbacks,
            rays,
        };
        (stats, errors)
    }
}

/// Independent random stream per vertex and iteration, so results do not
/// depend on scheduling.
fn vertex_rng(seed: u64, iteration: usize, id: usize) -> StdRng {
    let mixed = seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((iteration as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9))
        .wrapping_add(id as u64);
    StdRng::seed_from_u64(mixed)
}

fn update_vertex(
    grid: &Grid,
    estimator: &Estimator,
    config: &NlteConfig,
    iteration: usize,
    id: usize,
) -> VertexUpdate {
    let point = grid.point(id);
    let mut rng = vertex_rng(config.seed, iteration, id);
    let samples = estimator.sample(id, point.nphot, &mut rng);
    let origin = estimator.origin(id);

    let mut pops = Vec::with_capacity(grid.mols().len());
    let mut errors = Vec::new();
    let mut change = 0f64;
    for (s, local) in point.mol.iter().enumerate() {
        let new = match solve_species(origin, s, point.temperature[0], &samples, config) {
            Ok(sol) => sol.pops,
            Err(kind) => {
                let err = LineError::NumericalInstability {
                    vertex: id,
                    species: s,
                    kind,
                };
                warn!("{err}, using LTE");
                errors.push(err);
                grid.lte_populations(id, s)
            }
        };
        change = change.max(max_relative_change(&local.pops, &new, config.minpop));
        pops.push(new);
    }
    debug!(vertex = id, rays = samples.num_rays(), change, "vertex updated");

    VertexUpdate {
        id,
        pops,
        change,
        errors,
        rays: samples.num_rays(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::grid::tests::{twin_species, two_vertex_grid, two_vertex_grid_of};
    use crate::sim::molecule::{Level, MolData, Transition};
    use crate::sim::nlte::budget::FixedBudget;
    use crate::{Instability, UniformModel};

    /// Three levels with the ground level coupled to nothing.
    fn decoupled_ground() -> MolData {
        let levels = (0..3)
            .map(|i| Level {
                energy: i as f64,
                weight: 1.,
            })
            .collect();
        let lines = vec![Transition::new(2, 1, 1e-5, 3e10)];
        MolData::new("x", 20., levels, lines, vec![]).unwrap()
    }

    #[test]
    fn test_lte_only() {
        let model = UniformModel::new(1e9, 20., 1e-4, 100.);
        let mut grid = two_vertex_grid(&model);
        grid.point_mut(0).mol[0].pops = vec![0.5, 0.5];
        let mut driver = ConvergenceDriver::new(NlteConfig {
            lte_only: true,
            ..NlteConfig::new()
        });
        let report = driver.run(&mut grid).unwrap();
        assert_eq!(report.state, ConvergenceState::Converged);
        assert_eq!(report.iterations, 0);
        assert_eq!(grid.point(0).mol[0].pops, grid.lte_populations(0, 0));
    }

    #[test]
    fn test_sink_untouched_and_converges() {
        // Collision dominated, so Monte-Carlo noise barely moves the populations.
        let model = UniformModel::new(1e12, 20., 1e-4, 100.);
        let mut grid = two_vertex_grid(&model);
        grid.set_boundary_populations(1, 0, &[0.9, 0.1]).unwrap();
        let sink_before = grid.point(1).mol[0].pops.clone();

        let mut driver = ConvergenceDriver::new(NlteConfig {
            num_threads: 2,
            ..NlteConfig::new()
        });
        assert_eq!(driver.state(), ConvergenceState::Unconverged);
        let report = driver.run(&mut grid).unwrap();

        assert_eq!(grid.point(1).mol[0].pops, sink_before);
        assert_eq!(report.state, ConvergenceState::Converged);
        assert!(report.iterations <= 16);
        let pops = &grid.point(0).mol[0].pops;
        assert!(pops.iter().all(|p| *p >= 0.));
        assert!((pops.iter().sum::<f64>() - 1.).abs() < 1e-6);
    }

    #[test]
    fn test_failed_state_is_reported() {
        let model = UniformModel::new(1e9, 20., 1e-4, 100.);
        let mut grid = two_vertex_grid(&model);
        let mut driver = ConvergenceDriver::new(NlteConfig {
            max_iterations: 2,
            stability_window: 3,
            ..NlteConfig::new()
        })
        .with_budget(FixedBudget { per_neighbour: 4 });
        let report = driver.run(&mut grid).unwrap();
        assert_eq!(report.state, ConvergenceState::Failed);
        assert_eq!(driver.state(), ConvergenceState::Failed);
        assert_eq!(report.history.len(), 2);
        assert!(matches!(
            report.warnings.last(),
            Some(LineError::ConvergenceFailure { iterations: 2, .. })
        ));
        assert_eq!(grid.point(0).nphot, 4);
    }

    #[test]
    fn test_vertex_rng_streams_differ() {
        use rand::Rng;
        let a: u64 = vertex_rng(1, 1, 0).gen_range(0..u64::MAX);
        let b: u64 = vertex_rng(1, 1, 1).gen_range(0..u64::MAX);
        let c: u64 = vertex_rng(1, 2, 0).gen_range(0..u64::MAX);
        let a2: u64 = vertex_rng(1, 1, 0).gen_range(0..u64::MAX);
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_blended_twins_stay_identical() {
        let mut model = UniformModel::new(1e9, 20., 1e-4, 100.);
        model.abundance = vec![1e-4, 1e-4];
        let solve = |blend: bool| {
            let mut grid = two_vertex_grid_of(&model, twin_species());
            ConvergenceDriver::new(NlteConfig {
                blend,
                max_iterations: 2,
                ..NlteConfig::new()
            })
            .with_budget(FixedBudget { per_neighbour: 50 })
            .run(&mut grid)
            .unwrap();
            let p = grid.point(0);
            (p.mol[0].pops.clone(), p.mol[1].pops.clone())
        };
        let (a, b) = solve(true);
        assert_eq!(a, b);
        let (c, d) = solve(false);
        assert_eq!(c, d);
        // Blending doubles the line opacity each twin sees.
        assert_ne!(a, c);
    }

    #[test]
    fn test_restored_converged_vertices_frozen() {
        let model = UniformModel::new(1e9, 20., 1e-4, 100.);
        let mut grid = two_vertex_grid(&model);
        let mut snap = grid.snapshot();
        snap.vertices[0].pops = vec![vec![0.5, 0.5]];
        snap.vertices[0].converged = true;
        grid.restore(&snap).unwrap();

        let report = ConvergenceDriver::new(NlteConfig {
            freeze_converged: true,
            stability_window: 1,
            ..NlteConfig::new()
        })
        .run(&mut grid)
        .unwrap();
        assert_eq!(report.state, ConvergenceState::Converged);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.history[0].rays, 0);
        assert_eq!(report.history[0].percent_stable, 100.);
        assert_eq!(grid.point(0).mol[0].pops, vec![0.5, 0.5]);

        // Without freezing the restored vertex is solved again.
        grid.restore(&snap).unwrap();
        ConvergenceDriver::new(NlteConfig {
            max_iterations: 1,
            ..NlteConfig::new()
        })
        .run(&mut grid)
        .unwrap();
        assert_ne!(grid.point(0).mol[0].pops, vec![0.5, 0.5]);
    }

    #[test]
    fn test_singular_vertex_falls_back_to_lte() {
        let model = UniformModel::new(1e9, 20., 1e-4, 100.);
        let mut grid = two_vertex_grid_of(&model, vec![decoupled_ground()]);
        grid.point_mut(0).mol[0].pops = vec![0.2, 0.3, 0.5];
        grid.point_mut(0).converged = true;

        let report = ConvergenceDriver::new(NlteConfig {
            max_iterations: 1,
            ..NlteConfig::new()
        })
        .run(&mut grid)
        .unwrap();
        assert!(matches!(
            report.warnings.first(),
            Some(LineError::NumericalInstability {
                vertex: 0,
                species: 0,
                kind: Instability::Singular
            })
        ));
        assert_eq!(report.history[0].lte_fallbacks, 1);
        assert_eq!(report.history[0].unconverged, 1);
        assert!(!grid.point(0).converged);
        assert_eq!(grid.point(0).mol[0].pops, grid.lte_populations(0, 0));
        assert_eq!(report.state, ConvergenceState::Failed);
    }
}
