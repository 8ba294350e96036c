//! Molecular data: energy levels, radiative transitions and collision rate tables.
//!
//! Records are built by an external loader and validated here. Level energies
//! are in cm^-1, frequencies in Hz, Einstein A in s^-1 and collision rate
//! coefficients in m^3 s^-1.

use serde::{Deserialize, Serialize};

use crate::LineError;
use crate::sim::constants::{CLIGHT, HCKB, HPLANCK};
use crate::sim::radiation::planck;

/// Collision partner names indexed by `id - 1`.
pub const PARTNER_NAMES: [&str; 7] = ["H2", "p-H2", "o-H2", "e", "H", "He", "H+"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Level {
    /// Energy [cm^-1].
    pub energy: f64,
    /// Statistical weight.
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub upper: usize,
    pub lower: usize,
    /// Einstein A [s^-1].
    pub a: f64,
    /// Rest frequency [Hz].
    pub freq: f64,
    /// Einstein B for stimulated emission, derived from `a`.
    pub b_ul: f64,
    /// Einstein B for absorption, derived from `a`.
    pub b_lu: f64,
}

impl Transition {
    pub fn new(upper: usize, lower: usize, a: f64, freq: f64) -> Self {
        Self {
            upper,
            lower,
            a,
            freq,
            b_ul: 0.,
            b_lu: 0.,
        }
    }
}

/// Position of a temperature inside a rate table: `rate = r[bin] + coeff * (r[bin+1] - r[bin])`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateIndex {
    pub bin: usize,
    pub coeff: f64,
}

/// Downward collision rates of one partner as a function of temperature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionPartner {
    /// Partner id, 1..=7 (see [`PARTNER_NAMES`]).
    pub id: u8,
    /// Ascending temperature grid [K].
    pub temperatures: Vec<f64>,
    /// (upper, lower) level pairs.
    pub transitions: Vec<(usize, usize)>,
    /// Downward rate coefficients, `down[itrans][itemp]`.
    pub down: Vec<Vec<f64>>,
}

impl CollisionPartner {
    pub fn name(&self) -> &'static str {
        PARTNER_NAMES
            .get((self.id as usize).wrapping_sub(1))
            .copied()
            .unwrap_or("unknown")
    }

    /// Locates `t` in the temperature grid, clamping at both ends.
    pub fn rate_index(&self, t: f64) -> RateIndex {
        let temps = &self.temperatures;
        let n = temps.len();
        if n < 2 || t <= temps[0] {
            return RateIndex { bin: 0, coeff: 0. };
        }
        if t >= temps[n - 1] {
            return RateIndex {
                bin: n - 2,
                coeff: 1.,
            };
        }
        let bin = temps.partition_point(|&x| x <= t) - 1;
        RateIndex {
            bin,
            coeff: (t - temps[bin]) / (temps[bin + 1] - temps[bin]),
        }
    }

    /// Interpolated downward rate of collisional transition `itrans`.
    pub fn down_rate(&self, itrans: usize, idx: RateIndex) -> f64 {
        let r = &self.down[itrans];
        if r.len() < 2 {
            return r[0];
        }
        r[idx.bin] + idx.coeff * (r[idx.bin + 1] - r[idx.bin])
    }
}

/// Read-only data of one species.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MolData {
    pub name: String,
    /// Molecular mass [amu].
    pub amass: f64,
    pub levels: Vec<Level>,
    pub lines: Vec<Transition>,
    pub partners: Vec<CollisionPartner>,
    /// Background intensity per line [W m^-2 Hz^-1 sr^-1].
    pub background: Vec<f64>,
}

impl MolData {
    /// Validates the record and derives the Einstein B coefficients.
    pub fn new(
        name: &str,
        amass: f64,
        levels: Vec<Level>,
        mut lines: Vec<Transition>,
        partners: Vec<CollisionPartner>,
    ) -> Result<Self, LineError> {
        let bad = |msg: String| LineError::InvalidInput(format!("{name}: {msg}"));
        let nlev = levels.len();
        if nlev < 2 {
            return Err(bad(format!("need at least 2 levels, got {nlev}")));
        }
        if !(amass > 0.) {
            return Err(bad(format!("molecular mass must be positive, got {amass}")));
        }
        if let Some(i) = levels.iter().position(|l| !(l.weight > 0.)) {
            return Err(bad(format!("level {i} has a non-positive weight")));
        }

        for (i, line) in lines.iter_mut().enumerate() {
            if line.upper >= nlev || line.lower >= nlev || line.upper == line.lower {
                return Err(bad(format!("line {i} has invalid levels")));
            }
            if !(line.freq > 0.) || line.a < 0. {
                return Err(bad(format!("line {i} has invalid frequency or A")));
            }
            if levels[line.upper].energy <= levels[line.lower].energy {
                return Err(bad(format!("line {i}: upper level below lower level")));
            }
            let nu = line.freq;
            line.b_ul = line.a * (CLIGHT / nu).powi(2) / (HPLANCK * nu) / 2.;
            line.b_lu = levels[line.upper].weight / levels[line.lower].weight * line.b_ul;
        }

        for p in &partners {
            let ntemp = p.temperatures.len();
            if ntemp == 0 || p.temperatures.windows(2).any(|w| w[1] <= w[0]) {
                return Err(bad(format!(
                    "partner {} needs an ascending temperature grid",
                    p.name()
                )));
            }
            if p.down.len() != p.transitions.len() || p.down.iter().any(|r| r.len() != ntemp) {
                return Err(bad(format!("partner {} rate table has wrong shape", p.name())));
            }
            if p.transitions
                .iter()
                .any(|&(u, l)| u >= nlev || l >= nlev || u == l)
            {
                return Err(bad(format!("partner {} refers to invalid levels", p.name())));
            }
        }

        let background = vec![0.; lines.len()];
        Ok(Self {
            name: name.to_string(),
            amass,
            levels,
            lines,
            partners,
            background,
        })
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    /// Sets the background intensity of every line to a blackbody at `tcmb`.
    pub fn set_background(&mut self, tcmb: f64) {
        self.background = self.lines.iter().map(|l| planck(l.freq, tcmb)).collect();
    }

    /// Upward rate from a downward one by detailed balance at temperature `t`.
    pub fn upward_rate(&self, upper: usize, lower: usize, down: f64, t: f64) -> f64 {
        let (u, l) = (&self.levels[upper], &self.levels[lower]);
        down * u.weight / l.weight * (-HCKB * (u.energy - l.energy) / t).exp()
    }

    /// Boltzmann level fractions at temperature `t` (summing to one).
    pub fn lte_populations(&self, t: f64) -> Vec<f64> {
        let e0 = self
            .levels
            .iter()
            .map(|l| l.energy)
            .fold(f64::INFINITY, f64::min);
        let t = t.max(f64::MIN_POSITIVE);
        let mut pops: Vec<f64> = self
            .levels
            .iter()
            .map(|l| l.weight * (-HCKB * (l.energy - e0) / t).exp())
            .collect();
        let sum: f64 = pops.iter().sum();
        pops.iter_mut().for_each(|p| *p /= sum);
        pops
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two-level test species with a CO(1-0)-like transition.
    pub(crate) fn two_level() -> MolData {
        let levels = vec![
            Level {
                energy: 0.,
                weight: 1.,
            },
            Level {
                energy: 3.845,
                weight: 3.,
            },
        ];
        let lines = vec![Transition::new(1, 0, 7.2e-8, 115.271e9)];
        let partners = vec![CollisionPartner {
            id: 1,
            temperatures: vec![10., 20., 40.],
            transitions: vec![(1, 0)],
            down: vec![vec![3.0e-17, 3.2e-17, 3.6e-17]],
        }];
        MolData::new("co", 28., levels, lines, partners).unwrap()
    }

    #[test]
    fn test_einstein_b() {
        let mol = two_level();
        let line = &mol.lines[0];
        let nu = line.freq;
        let expected = line.a * CLIGHT * CLIGHT / (2. * HPLANCK * nu.powi(3));
        assert!((line.b_ul - expected).abs() / expected < 1e-12);
        assert!((line.b_lu - 3. * line.b_ul).abs() / line.b_lu < 1e-12);
    }

    #[test]
    fn test_rate_index_clamped() {
        let p = &two_level().partners[0];
        assert_eq!(p.rate_index(5.), RateIndex { bin: 0, coeff: 0. });
        assert_eq!(p.rate_index(100.), RateIndex { bin: 1, coeff: 1. });
        let idx = p.rate_index(30.);
        assert_eq!(idx.bin, 1);
        assert!((idx.coeff - 0.5).abs() < 1e-12);
        assert!((p.down_rate(0, idx) - 3.4e-17).abs() < 1e-27);
        assert!((p.down_rate(0, p.rate_index(100.)) - 3.6e-17).abs() < 1e-27);
        assert_eq!(p.name(), "H2");
    }

    #[test]
    fn test_lte_and_detailed_balance() {
        let mol = two_level();
        let t = 20.;
        let pops = mol.lte_populations(t);
        assert!((pops.iter().sum::<f64>() - 1.).abs() < 1e-14);
        let ratio = pops[1] / pops[0];
        assert!((ratio - 3. * (-HCKB * 3.845 / t).exp()).abs() < 1e-12);

        // Collisions alone drive the populations to LTE.
        let down = 1e-16;
        let up = mol.upward_rate(1, 0, down, t);
        assert!((up / down - ratio).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_records() {
        let levels = vec![
            Level {
                energy: 0.,
                weight: 1.,
            },
            Level {
                energy: 1.,
                weight: 1.,
            },
        ];
        let reversed = vec![Transition::new(0, 1, 1e-5, 1e11)];
        assert!(MolData::new("x", 2., levels.clone(), reversed, vec![]).is_err());
        let out_of_range = vec![Transition::new(2, 0, 1e-5, 1e11)];
        assert!(MolData::new("x", 2., levels.clone(), out_of_range, vec![]).is_err());
        let bad_partner = CollisionPartner {
            id: 4,
            temperatures: vec![20., 10.],
            transitions: vec![(1, 0)],
            down: vec![vec![1., 1.]],
        };
        assert!(MolData::new("x", 2., levels, vec![], vec![bad_partner]).is_err());
    }
}
