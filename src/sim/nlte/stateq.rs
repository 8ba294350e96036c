//! Statistical equilibrium at a single vertex.

use nalgebra::{DMatrix, DVector};

use crate::Instability;
use crate::sim::constants::EPS;
use crate::sim::molecule::MolData;
use crate::sim::population::{Population, max_relative_change};

use super::config::NlteConfig;
use super::estimator::{Origin, RaySamples, estimate_jbar};

/// Largest accepted ratio between the biggest and smallest LU pivot.
const MAX_PIVOT_RATIO: f64 = 1e14;

/// Converged populations of one species at one vertex.
#[derive(Debug, Clone)]
pub struct StateqSolution {
    pub pops: Vec<f64>,
    /// Mean intensity per line from the last inner pass.
    pub jbar: Vec<f64>,
    pub iterations: usize,
}

/// Rates `r[(i, j)]` for level `i` to level `j` [s^-1], collisional plus radiative.
pub fn transition_rates(mol: &MolData, local: &Population, t_gas: f64, jbar: &[f64]) -> DMatrix<f64> {
    let n = mol.num_levels();
    let mut r = DMatrix::zeros(n, n);

    for (pi, partner) in mol.partners.iter().enumerate() {
        let dens = local.partner_density.get(pi).copied().unwrap_or(0.);
        if dens <= 0. {
            continue;
        }
        let idx = local.rate_index[pi];
        for (it, &(u, l)) in partner.transitions.iter().enumerate() {
            let down = partner.down_rate(it, idx) * dens;
            r[(u, l)] += down;
            r[(l, u)] += mol.upward_rate(u, l, down, t_gas);
        }
    }

    for (line, j) in mol.lines.iter().zip(jbar) {
        r[(line.upper, line.lower)] += line.a + line.b_ul * j;
        r[(line.lower, line.upper)] += line.b_lu * j;
    }
    r
}

/// Solves the rate equations for level fractions.
///
/// The balance equation of the last level is replaced by the normalisation
/// `sum(n) = 1`.
pub fn solve_rates(rates: &DMatrix<f64>, minpop: f64) -> Result<Vec<f64>, Instability> {
    let n = rates.nrows();
    let mut m = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            rates.row(i).sum() - rates[(i, i)]
        } else {
            -rates[(j, i)]
        }
    });
    // Equilibrate the balance rows; the solution does not change.
    for i in 0..n - 1 {
        let scale = m.row(i).amax();
        if scale > 0. {
            m.row_mut(i).scale_mut(1. / scale);
        }
    }
    m.row_mut(n - 1).fill(1.);
    let mut rhs = DVector::zeros(n);
    rhs[n - 1] = 1.;

    let lu = m.lu();
    let u = lu.u();
    let (pmin, pmax) = u
        .diagonal()
        .iter()
        .fold((f64::INFINITY, 0f64), |(lo, hi), d| (lo.min(d.abs()), hi.max(d.abs())));
    if !(pmin > 0.) {
        return Err(Instability::Singular);
    }
    if pmax / pmin > MAX_PIVOT_RATIO {
        return Err(Instability::IllConditioned);
    }
    let x = lu.solve(&rhs).ok_or(Instability::Singular)?;

    let mut pops = Vec::with_capacity(n);
    for &v in x.iter() {
        if !v.is_finite() {
            return Err(Instability::NonFinite);
        }
        if v < -minpop {
            return Err(Instability::NegativePopulation);
        }
        pops.push(v.max(EPS));
    }
    let sum: f64 = pops.iter().sum();
    pops.iter_mut().for_each(|p| *p /= sum);
    Ok(pops)
}

/// Inner iteration for one species at one vertex: alternates the local mean
/// intensity and the rate-equation solve until the populations settle.
///
/// Without rays the mean intensity is the background.
pub fn solve_species(
    origin: Origin,
    species: usize,
    t_gas: f64,
    samples: &RaySamples,
    config: &NlteConfig,
) -> Result<StateqSolution, Instability> {
    let mol = &origin.mols[species];
    let local = &origin.locals[species];
    let mut pops = local.pops.clone();
    let mut jbar = mol.background.clone();
    let mut iterations = 0;

    while iterations < config.max_stateq_iter.max(1) {
        iterations += 1;
        for (l, j) in jbar.iter_mut().enumerate() {
            if let Some(est) =
                estimate_jbar(origin, species, l, &pops, samples, config.taylor_cutoff)
            {
                *j = est.jbar;
            }
        }
        let new = solve_rates(&transition_rates(mol, local, t_gas, &jbar), config.minpop)?;
        let diff = max_relative_change(&pops, &new, config.minpop);
        pops = new;
        if iterations >= config.min_stateq_iter && diff < config.tol {
            break;
        }
    }

    Ok(StateqSolution {
        pops,
        jbar,
        iterations,
    })
}
