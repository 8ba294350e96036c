//! Grid: the mesh plus everything the physics needs at each vertex.

use anyhow::{Context, Result, bail, ensure};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::io::snapshot::{PopulationSnapshot, VertexPopulations};
use crate::sim::blend::BlendInfo;
use crate::sim::constants::{AMU, ININPHOT, KBOLTZ, MAX_BLEND_DELTA_V};
use crate::sim::dust::{DustOpacity, dust_coefficients};
use crate::sim::molecule::MolData;
use crate::sim::population::Population;
use crate::{LineError, Mesh, PhysicalModel, Point, Vector};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Background (CMB) temperature [K].
    pub tcmb: f64,
    /// Weight of each density component in the species number density.
    /// `None` weighs all components with 1.
    pub n_mol_weights: Option<Vec<f64>>,
    /// Collision partner id (1..=7) of each density component.
    /// `None` pairs density `i` with the `i`-th partner of every species.
    pub coll_part_ids: Option<Vec<u8>>,
    pub dust: Option<DustOpacity>,
    /// Start free vertices from LTE; otherwise all molecules start in the ground level.
    pub init_lte: bool,
}

impl GridConfig {
    pub fn new() -> Self {
        Self {
            tcmb: 2.728,
            n_mol_weights: None,
            coll_part_ids: None,
            dust: None,
            init_lte: true,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Physical state sampled at one mesh vertex.
#[derive(Debug, Clone)]
pub struct GridPoint {
    pub id: usize,
    pub velocity: Vector,
    pub b_field: Vector,
    pub density: Vec<f64>,
    /// Gas and dust temperature.
    pub temperature: [f64; 2],
    pub abundance: Vec<f64>,
    pub doppler: f64,
    pub gas_to_dust: f64,
    /// Model velocity at the midpoint of each edge, aligned with the mesh neighbours.
    pub edge_velocity: Vec<Vector>,
    /// Photon budget of the radiation estimator.
    pub nphot: usize,
    pub converged: bool,
    /// One record per species.
    pub mol: Vec<Population>,
}

pub struct Grid {
    mesh: Mesh,
    points: Vec<GridPoint>,
    mols: Vec<MolData>,
    blends: BlendInfo,
    config: GridConfig,
}

impl Grid {
    /// Samples `model` at every vertex and derives the per-species data.
    pub fn new<M: PhysicalModel + ?Sized>(
        mesh: Mesh,
        model: &M,
        mut mols: Vec<MolData>,
        config: GridConfig,
    ) -> Result<Self> {
        ensure!(!mols.is_empty(), LineError::InvalidInput("no species given".into()));
        if let Some(ids) = &config.coll_part_ids
            && let Some(bad) = ids.iter().find(|id| !(1..=7).contains(*id))
        {
            bail!(LineError::InvalidInput(format!(
                "collision partner id {bad} is outside 1..=7"
            )));
        }
        for mol in &mut mols {
            mol.set_background(config.tcmb);
        }
        let partner_map = partner_density_map(&mols, config.coll_part_ids.as_deref());

        let points = (0..mesh.num_vertices())
            .into_par_iter()
            .map(|i| {
                build_point(&mesh, i, model, &mols, &partner_map, &config)
                    .with_context(|| format!("vertex {i}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let blends = BlendInfo::new(&mols, MAX_BLEND_DELTA_V);
        info!(
            vertices = points.len(),
            sinks = mesh.num_sinks(),
            species = mols.len(),
            blends = blends.count(),
            "grid initialised"
        );
        Ok(Self {
            mesh,
            points,
            mols,
            blends,
            config,
        })
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn point(&self, id: usize) -> &GridPoint {
        &self.points[id]
    }

    pub(crate) fn point_mut(&mut self, id: usize) -> &mut GridPoint {
        &mut self.points[id]
    }

    pub fn mols(&self) -> &[MolData] {
        &self.mols
    }

    pub fn blends(&self) -> &BlendInfo {
        &self.blends
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn is_sink(&self, id: usize) -> bool {
        self.mesh.vertex(id).sink
    }

    /// Boltzmann populations of `species` at the gas temperature of `vertex`.
    pub fn lte_populations(&self, vertex: usize, species: usize) -> Vec<f64> {
        self.mols[species].lte_populations(self.points[vertex].temperature[0])
    }

    /// Resets every species of `vertex` to LTE and clears its converged flag.
    pub fn set_lte(&mut self, vertex: usize) {
        let t = self.points[vertex].temperature[0];
        let point = &mut self.points[vertex];
        for (pop, mol) in point.mol.iter_mut().zip(&self.mols) {
            pop.pops = mol.lte_populations(t);
        }
        point.converged = false;
    }

    /// Prescribes the boundary populations of a sink vertex.
    ///
    /// `pops` are relative and get normalised to sum to one.
    pub fn set_boundary_populations(
        &mut self,
        vertex: usize,
        species: usize,
        pops: &[f64],
    ) -> Result<()> {
        ensure!(vertex < self.points.len(), "vertex {vertex} does not exist");
        ensure!(self.is_sink(vertex), "vertex {vertex} is not a sink");
        let mol = self
            .mols
            .get(species)
            .with_context(|| format!("species {species} does not exist"))?;
        ensure!(
            pops.len() == mol.num_levels(),
            LineError::InvalidInput(format!(
                "{} has {} levels, got {} populations",
                mol.name,
                mol.num_levels(),
                pops.len()
            ))
        );
        let sum: f64 = pops.iter().sum();
        ensure!(
            pops.iter().all(|p| *p >= 0.) && sum > 0.,
            LineError::InvalidInput("boundary populations must be non-negative".into())
        );
        self.points[vertex].mol[species].pops = pops.iter().map(|p| p / sum).collect();
        Ok(())
    }

    /// Copies level populations and converged flags of every vertex.
    pub fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            species: self.mols.iter().map(|m| m.name.clone()).collect(),
            vertices: self
                .points
                .iter()
                .map(|p| VertexPopulations {
                    id: p.id,
                    converged: p.converged,
                    pops: p.mol.iter().map(|m| m.pops.clone()).collect(),
                })
                .collect(),
        }
    }

    /// Loads populations from a snapshot taken on a grid with the same species.
    ///
    /// The whole snapshot is checked before anything is written, so on error
    /// the grid is unchanged. Vertices missing from the snapshot keep their
    /// current state.
    pub fn restore(&mut self, snapshot: &PopulationSnapshot) -> Result<()> {
        let names: Vec<&str> = self.mols.iter().map(|m| m.name.as_str()).collect();
        ensure!(
            snapshot.species.iter().map(String::as_str).eq(names.iter().copied()),
            "snapshot species {:?} do not match grid species {:?}",
            snapshot.species,
            names
        );
        for entry in &snapshot.vertices {
            self.check_snapshot_entry(entry)
                .with_context(|| format!("snapshot vertex {}", entry.id))?;
        }

        for entry in &snapshot.vertices {
            let point = &mut self.points[entry.id];
            for (pop, new) in point.mol.iter_mut().zip(&entry.pops) {
                pop.pops.clone_from(new);
            }
            point.converged = entry.converged;
        }
        info!(vertices = snapshot.vertices.len(), "populations restored");
        Ok(())
    }

    fn check_snapshot_entry(&self, entry: &VertexPopulations) -> Result<()> {
        ensure!(entry.id < self.points.len(), "vertex does not exist");
        ensure!(
            entry.pops.len() == self.mols.len(),
            "{} species instead of {}",
            entry.pops.len(),
            self.mols.len()
        );
        for (pops, mol) in entry.pops.iter().zip(&self.mols) {
            ensure!(
                pops.len() == mol.num_levels(),
                "{} needs {} levels, got {}",
                mol.name,
                mol.num_levels(),
                pops.len()
            );
            ensure!(
                pops.iter().all(|p| p.is_finite() && *p >= 0.),
                LineError::InvalidInput(format!("{} populations {pops:?}", mol.name))
            );
        }
        Ok(())
    }
}

/// For each species and collision partner, the density component feeding it.
fn partner_density_map(mols: &[MolData], ids: Option<&[u8]>) -> Vec<Vec<Option<usize>>> {
    mols.iter()
        .map(|mol| {
            mol.partners
                .iter()
                .enumerate()
                .map(|(pi, partner)| {
                    let k = match ids {
                        Some(ids) => ids.iter().position(|&id| id == partner.id),
                        None => Some(pi),
                    };
                    if ids.is_some() && k.is_none() {
                        warn!(
                            species = mol.name.as_str(),
                            partner = partner.name(),
                            "no density component for collision partner"
                        );
                    }
                    k
                })
                .collect()
        })
        .collect()
}

fn build_point<M: PhysicalModel + ?Sized>(
    mesh: &Mesh,
    id: usize,
    model: &M,
    mols: &[MolData],
    partner_map: &[Vec<Option<usize>>],
    config: &GridConfig,
) -> Result<GridPoint> {
    let vertex = mesh.vertex(id);
    let p = vertex.position;

    let density = model.density(p);
    let temperature = model.temperature(p);
    let abundance = model.abundance(p);
    let doppler = model.doppler(p);
    let gas_to_dust = model.gas_to_dust(p);

    ensure!(
        !density.is_empty() && density.iter().all(|d| d.is_finite() && *d >= 0.),
        LineError::InvalidInput(format!("bad densities {density:?}"))
    );
    ensure!(
        temperature.iter().all(|t| t.is_finite() && *t > 0.),
        LineError::InvalidInput(format!("bad temperatures {temperature:?}"))
    );
    ensure!(
        abundance.len() >= mols.len(),
        LineError::InvalidInput(format!(
            "{} abundances for {} species",
            abundance.len(),
            mols.len()
        ))
    );
    ensure!(
        doppler.is_finite() && doppler >= 0.,
        LineError::InvalidInput(format!("bad doppler width {doppler}"))
    );
    if let Some(w) = &config.n_mol_weights {
        ensure!(
            w.len() == density.len(),
            LineError::InvalidInput(format!(
                "{} molecular density weights for {} density components",
                w.len(),
                density.len()
            ))
        );
    }

    let weighted: f64 = match &config.n_mol_weights {
        Some(w) => density.iter().zip(w).map(|(d, w)| d * w).sum(),
        None => density.iter().sum(),
    };
    let total_density: f64 = density.iter().sum();

    let mol = mols
        .iter()
        .enumerate()
        .map(|(s, md)| {
            let dopb = (doppler * doppler + 2. * KBOLTZ * temperature[0] / (AMU * md.amass)).sqrt();
            let (knu, dust): (Vec<f64>, Vec<f64>) = md
                .lines
                .iter()
                .map(|l| {
                    dust_coefficients(
                        config.dust.as_ref(),
                        l.freq,
                        temperature[1],
                        gas_to_dust,
                        total_density,
                    )
                })
                .unzip();
            let pops = if vertex.sink || config.init_lte {
                md.lte_populations(temperature[0])
            } else {
                let mut ground = vec![0.; md.num_levels()];
                ground[0] = 1.;
                ground
            };
            Population {
                pops,
                knu,
                dust,
                dopb,
                binv: 1. / dopb,
                nmol: abundance[s] * weighted,
                rate_index: md
                    .partners
                    .iter()
                    .map(|c| c.rate_index(temperature[0]))
                    .collect(),
                partner_density: partner_map[s]
                    .iter()
                    .map(|k| k.and_then(|k| density.get(k).copied()).unwrap_or(0.))
                    .collect(),
            }
        })
        .collect();

    let edge_velocity = vertex
        .neighbors
        .iter()
        .map(|&j| {
            let q = mesh.vertex(j).position;
            model.velocity(Point::new_between_2_points(p, q, 0.5))
        })
        .collect();

    Ok(GridPoint {
        id,
        velocity: model.velocity(p),
        b_field: model.magnetic_field(p),
        density,
        temperature,
        abundance,
        doppler,
        gas_to_dust,
        edge_velocity,
        nphot: ININPHOT * vertex.num_neigh(),
        converged: false,
        mol,
    })
}
