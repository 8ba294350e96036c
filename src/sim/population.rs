//! Per-vertex, per-species state.

use crate::sim::molecule::RateIndex;

/// Level populations of one species at one vertex, plus derived local data.
///
/// `pops` holds level fractions summing to one; number densities are
/// `pops[i] * nmol`.
#[derive(Debug, Clone, Default)]
pub struct Population {
    pub pops: Vec<f64>,
    /// Dust opacity per line [m^-1].
    pub knu: Vec<f64>,
    /// Dust emission (Planck function at the dust temperature) per line.
    pub dust: Vec<f64>,
    /// Doppler b parameter [m/s].
    pub dopb: f64,
    pub binv: f64,
    /// Species number density [m^-3].
    pub nmol: f64,
    /// Temperature-grid position per collision partner.
    pub rate_index: Vec<RateIndex>,
    /// Density of each collision partner [m^-3].
    pub partner_density: Vec<f64>,
}

/// Largest relative change between two population vectors, ignoring levels
/// whose new fraction is below `minpop`.
pub fn max_relative_change(old: &[f64], new: &[f64], minpop: f64) -> f64 {
    old.iter()
        .zip(new)
        .filter(|(_, n)| **n > minpop)
        .map(|(o, n)| ((n - o) / n).abs())
        .fold(0., f64::max)
}
