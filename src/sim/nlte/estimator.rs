//! Monte-Carlo estimate of the mean line intensity at a grid vertex.
//!
//! Rays leave the vertex in random directions and hop along mesh edges towards
//! the boundary, each edge split in two halves attributed to the vertex at either
//! end. The half segment next to the origin is not integrated here: it is
//! stored (`half_first_ds`, `vfac_loc`) so the solver can redo it with trial
//! populations, and `phot` holds the intensity arriving from beyond it.

use rand::Rng;

use crate::geom::mesh::MeshVertex;
use crate::sim::blend::BlendInfo;
use crate::sim::constants::{ININPHOT, MIN_TAU};
use crate::sim::fastexp::fast_exp;
use crate::sim::grid::Grid;
use crate::sim::molecule::MolData;
use crate::sim::population::Population;
use crate::sim::radiation::{Emissivity, calc_source_fn, gaussline};
use crate::Vector;

/// Half width of the sampled frequency band in Doppler widths.
const BAND_HALF_WIDTH: f64 = 4.3;

/// Ray results of one species.
#[derive(Debug, Clone, Default)]
pub struct SpeciesSamples {
    /// Frequency of each ray as a velocity offset from the line centre.
    pub deltav: Vec<f64>,
    /// Line profile at the origin for each ray's frequency (the ray weight).
    pub vfac: Vec<f64>,
    /// Line profile averaged over the origin half segment.
    pub vfac_loc: Vec<f64>,
    /// Intensity reaching the end of the origin half segment, `phot[ray][line]`.
    pub phot: Vec<Vec<f64>>,
}

/// All rays cast from one vertex.
#[derive(Debug, Clone, Default)]
pub struct RaySamples {
    pub half_first_ds: Vec<f64>,
    /// Line-of-sight velocity at both ends of the origin half segment.
    pub half_first_vlos: Vec<[f64; 2]>,
    pub species: Vec<SpeciesSamples>,
}

impl RaySamples {
    pub fn num_rays(&self) -> usize {
        self.half_first_ds.len()
    }
}

/// Species data at a ray origin.
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    pub mols: &'a [MolData],
    /// Local state of every species, aligned with `mols`.
    pub locals: &'a [Population],
    pub blends: &'a BlendInfo,
}

/// Mean intensity of one line with its standard error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JbarEstimate {
    pub jbar: f64,
    pub std_err: f64,
}

/// Mean intensity of `line` of `species` at the ray origin.
///
/// The local half segment is integrated with the trial populations `pops` for
/// `species`; blended lines of other species use their current populations.
/// Returns `None` when there are no rays.
pub fn estimate_jbar(
    origin: Origin,
    species: usize,
    line: usize,
    pops: &[f64],
    samples: &RaySamples,
    taylor_cutoff: f64,
) -> Option<JbarEstimate> {
    let sp = samples.species.get(species)?;
    let local = &origin.locals[species];
    let tr = &origin.mols[species].lines[line];
    let blends = origin.blends.of(species, line);
    let values: Vec<f64> = samples
        .half_first_ds
        .iter()
        .enumerate()
        .map(|(r, &ds)| {
            let mut e = Emissivity::default();
            e.add_line(tr, sp.vfac_loc[r], local.binv, local.nmol, pops);
            for b in blends {
                let bpop = &origin.locals[b.species];
                let bpops = if b.species == species { pops } else { bpop.pops.as_slice() };
                let dv = sp.deltav[r] + b.delta_v;
                let bfac = line_amp(samples.half_first_vlos[r], dv, bpop.binv);
                let bline = &origin.mols[b.species].lines[b.line];
                e.add_line(bline, bfac, bpop.binv, bpop.nmol, bpops);
            }
            e.add_continuum(local.knu[line], local.dust[line]);
            let (remnant, exp_dtau) = calc_source_fn(e.alpha * ds, taylor_cutoff);
            exp_dtau * sp.phot[r][line] + remnant * e.jnu * ds
        })
        .collect();

    let vsum: f64 = sp.vfac.iter().sum();
    if values.is_empty() || !(vsum > 0.) {
        return None;
    }
    let jbar = values
        .iter()
        .zip(&sp.vfac)
        .map(|(x, w)| x * w)
        .sum::<f64>()
        / vsum;
    let var: f64 = values
        .iter()
        .zip(&sp.vfac)
        .map(|(x, w)| (w * (x - jbar)).powi(2))
        .sum();
    Some(JbarEstimate {
        jbar,
        std_err: var.sqrt() / vsum,
    })
}

/// Casts rays through a fixed grid. The grid is only read.
pub struct Estimator<'a> {
    grid: &'a Grid,
    /// Lines summed with each traced line; an empty index switches blending off.
    blends: &'a BlendInfo,
    taylor_cutoff: f64,
    jbar_goal: f64,
}

impl<'a> Estimator<'a> {
    pub fn new(grid: &'a Grid, blends: &'a BlendInfo, taylor_cutoff: f64, jbar_goal: f64) -> Self {
        Self {
            grid,
            blends,
            taylor_cutoff,
            jbar_goal,
        }
    }

    /// Species data at `vertex` as seen by this estimator.
    pub fn origin(&self, vertex: usize) -> Origin<'a> {
        Origin {
            mols: self.grid.mols(),
            locals: &self.grid.point(vertex).mol,
            blends: self.blends,
        }
    }

    /// Casts up to `nphot` rays from `vertex`.
    ///
    /// Rays go out in batches; after each batch the run stops early if the mean
    /// intensity of every line is known to `jbar_goal` relative error.
    pub fn sample<R: Rng>(&self, vertex: usize, nphot: usize, rng: &mut R) -> RaySamples {
        let nspec = self.grid.mols().len();
        let mut out = RaySamples {
            half_first_ds: Vec::with_capacity(nphot),
            half_first_vlos: Vec::with_capacity(nphot),
            species: vec![SpeciesSamples::default(); nspec],
        };
        let num_neigh = self.grid.mesh().vertex(vertex).num_neigh();
        if num_neigh == 0 || nphot == 0 {
            return out;
        }

        let np_per_line = (nphot / num_neigh).max(1);
        let batch = (ININPHOT * num_neigh).min(nphot);
        let mut issued = 0;
        while issued < nphot {
            let end = (issued + batch).min(nphot);
            for iphot in issued..end {
                let ip_at_line = iphot % np_per_line;
                let segment = (ip_at_line as f64 + rng.gen_range(0.0..1.0)) / np_per_line as f64 - 0.5;
                let dir = random_direction(rng);
                self.trace(vertex, dir, segment, rng, &mut out);
            }
            issued = end;
            if issued < nphot && self.is_precise(vertex, &out) {
                break;
            }
        }
        out
    }

    /// True if all lines of all species reached the target precision.
    fn is_precise(&self, vertex: usize, samples: &RaySamples) -> bool {
        let origin = self.origin(vertex);
        origin.mols.iter().enumerate().all(|(s, mol)| {
            let pops = &origin.locals[s].pops;
            (0..mol.num_lines()).all(|l| {
                match estimate_jbar(origin, s, l, pops, samples, self.taylor_cutoff) {
                    Some(est) => est.std_err <= self.jbar_goal * est.jbar.abs(),
                    None => true,
                }
            })
        })
    }

    /// Follows one ray from `origin` and appends its sample.
    fn trace<R: Rng>(
        &self,
        origin: usize,
        dir: Vector,
        segment: f64,
        rng: &mut R,
        out: &mut RaySamples,
    ) {
        let grid = self.grid;
        let mesh = grid.mesh();
        let mols = grid.mols();
        let p0 = grid.point(origin);
        let v0 = dir.dot(p0.velocity);

        // Frequency of the ray in the velocity frame of each species' line.
        let deltav: Vec<f64> = p0
            .mol
            .iter()
            .map(|pop| BAND_HALF_WIDTH * segment * pop.dopb + v0)
            .collect();
        let mut vfac_loc: Vec<f64> = p0
            .mol
            .iter()
            .zip(&deltav)
            .map(|(pop, dv)| gaussline(dv - v0, pop.binv))
            .collect();
        let vfac = vfac_loc.clone();

        let mut tau: Vec<Vec<f64>> = mols.iter().map(|m| vec![0.; m.num_lines()]).collect();
        let mut phot = tau.clone();
        let mut half_first_ds = 0.;
        let mut half_first_vlos = [v0, v0];

        let mut here = origin;
        let mut first = true;
        while let Some(k) = next_edge(mesh.vertex(here), dir, rng) {
            let vx = mesh.vertex(here);
            let next = vx.neighbors[k];
            let ds = 0.5 * vx.ds[k];
            let v_here = dir.dot(grid.point(here).velocity);
            let v_mid = dir.dot(grid.point(here).edge_velocity[k]);

            if first {
                half_first_ds = ds;
                half_first_vlos = [v_here, v_mid];
                for (s, pop) in p0.mol.iter().enumerate() {
                    vfac_loc[s] = line_amp(half_first_vlos, deltav[s], pop.binv);
                }
                first = false;
            } else {
                self.add_half_segment(here, [v_here, v_mid], ds, &deltav, &mut tau, &mut phot);
            }
            let v_next = dir.dot(grid.point(next).velocity);
            self.add_half_segment(next, [v_mid, v_next], ds, &deltav, &mut tau, &mut phot);

            here = next;
            if mesh.vertex(here).sink {
                break;
            }
        }

        // Background radiation entering at the far end.
        for (s, mol) in mols.iter().enumerate() {
            for (l, bg) in mol.background.iter().enumerate() {
                phot[s][l] += fast_exp(tau[s][l]) * bg;
            }
        }

        out.half_first_ds.push(half_first_ds);
        out.half_first_vlos.push(half_first_vlos);
        for (s, sp) in out.species.iter_mut().enumerate() {
            sp.deltav.push(deltav[s]);
            sp.vfac.push(vfac[s]);
            sp.vfac_loc.push(vfac_loc[s]);
            sp.phot.push(std::mem::take(&mut phot[s]));
        }
    }

    /// Integrates half an edge attributed to `vertex`, whose line-of-sight
    /// velocity runs from `vlos[0]` to `vlos[1]` along the segment.
    fn add_half_segment(
        &self,
        vertex: usize,
        vlos: [f64; 2],
        ds: f64,
        deltav: &[f64],
        tau: &mut [Vec<f64>],
        phot: &mut [Vec<f64>],
    ) {
        let mols = self.grid.mols();
        let point = self.grid.point(vertex);
        for (s, mol) in mols.iter().enumerate() {
            let pop = &point.mol[s];
            for (l, line) in mol.lines.iter().enumerate() {
                let mut e = Emissivity::default();
                let vfac = line_amp(vlos, deltav[s], pop.binv);
                e.add_line(line, vfac, pop.binv, pop.nmol, &pop.pops);
                for b in self.blends.of(s, l) {
                    let bpop = &point.mol[b.species];
                    let bline = &mols[b.species].lines[b.line];
                    let bfac = line_amp(vlos, deltav[s] + b.delta_v, bpop.binv);
                    e.add_line(bline, bfac, bpop.binv, bpop.nmol, &bpop.pops);
                }
                e.add_continuum(pop.knu[l], pop.dust[l]);

                let dtau = e.alpha * ds;
                let (remnant, _) = calc_source_fn(dtau, self.taylor_cutoff);
                phot[s][l] += fast_exp(tau[s][l]) * remnant * e.jnu * ds;
                tau[s][l] = (tau[s][l] + dtau).max(MIN_TAU);
            }
        }
    }
}

/// Uniformly distributed unit vector.
fn random_direction<R: Rng>(rng: &mut R) -> Vector {
    let theta = rng.gen_range(0.0..std::f64::consts::TAU);
    let z: f64 = rng.gen_range(-1.0..=1.0);
    let s = (1. - z * z).max(0.).sqrt();
    Vector::new(s * theta.cos(), s * theta.sin(), z)
}

/// Line profile averaged between the two ends of a half segment.
fn line_amp(vlos: [f64; 2], deltav: f64, binv: f64) -> f64 {
    0.5 * (gaussline(deltav - vlos[0], binv) + gaussline(deltav - vlos[1], binv))
}

/// Picks the next edge of a ray leaving `vertex` along `dir`.
///
/// Chooses between the two neighbours best aligned with the ray, weighting each
/// by the angle of the other. `None` if no neighbour lies ahead.
fn next_edge<R: Rng>(vertex: &MeshVertex, dir: Vector, rng: &mut R) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    let mut second: Option<(usize, f64)> = None;
    for (k, d) in vertex.dir.iter().enumerate() {
        let c = d.dot(dir);
        if c <= 0. {
            continue;
        }
        match best {
            Some((_, cb)) if c <= cb => {
                if second.is_none_or(|(_, cs)| c > cs) {
                    second = Some((k, c));
                }
            }
            _ => {
                second = best;
                best = Some((k, c));
            }
        }
    }

    let (kb, cb) = best?;
    let Some((ks, cs)) = second else {
        return Some(kb);
    };
    let a1 = cb.min(1.).acos();
    let a2 = cs.min(1.).acos();
    if a1 + a2 <= 0. || rng.gen_range(0.0..1.0) < a2 / (a1 + a2) {
        Some(kb)
    } else {
        Some(ks)
    }
}
