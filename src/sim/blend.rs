//! Index of overlapping transitions.

use crate::sim::constants::CLIGHT;
use crate::sim::molecule::MolData;

/// A line overlapping the indexed one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blend {
    pub species: usize,
    pub line: usize,
    /// Velocity offset `(nu_other - nu_this) * c / nu_this` [m/s].
    pub delta_v: f64,
}

/// `blends[species][line]` lists every other line within the velocity window.
#[derive(Debug, Clone, Default)]
pub struct BlendInfo {
    blends: Vec<Vec<Vec<Blend>>>,
}

impl BlendInfo {
    /// Finds all line pairs, across and within species, closer than `max_delta_v`.
    pub fn new(mols: &[MolData], max_delta_v: f64) -> Self {
        let blends = mols
            .iter()
            .enumerate()
            .map(|(si, mol)| {
                mol.lines
                    .iter()
                    .enumerate()
                    .map(|(li, line)| {
                        let mut found: Vec<Blend> = mols
                            .iter()
                            .enumerate()
                            .flat_map(|(sj, other)| {
                                other.lines.iter().enumerate().filter_map(move |(lj, o)| {
                                    if si == sj && li == lj {
                                        return None;
                                    }
                                    let delta_v = (o.freq - line.freq) * CLIGHT / line.freq;
                                    (delta_v.abs() < max_delta_v).then_some(Blend {
                                        species: sj,
                                        line: lj,
                                        delta_v,
                                    })
                                })
                            })
                            .collect();
                        found.sort_by(|a, b| a.delta_v.total_cmp(&b.delta_v));
                        found
                    })
                    .collect()
            })
            .collect();
        Self { blends }
    }

    /// An index without any blends, for runs with blending switched off.
    pub fn empty(mols: &[MolData]) -> Self {
        Self {
            blends: mols
                .iter()
                .map(|m| vec![Vec::new(); m.num_lines()])
                .collect(),
        }
    }

    pub fn of(&self, species: usize, line: usize) -> &[Blend] {
        &self.blends[species][line]
    }

    pub fn count(&self) -> usize {
        self.blends.iter().flatten().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::molecule::{Level, Transition};

    fn mol(name: &str, freqs: &[f64]) -> MolData {
        let levels = (0..=freqs.len())
            .map(|i| Level {
                energy: i as f64,
                weight: 1.,
            })
            .collect();
        let lines = freqs
            .iter()
            .enumerate()
            .map(|(i, &f)| Transition::new(i + 1, i, 1e-5, f))
            .collect();
        MolData::new(name, 2., levels, lines, vec![]).unwrap()
    }

    #[test]
    fn test_blends_found_symmetrically() {
        let nu = 1e11;
        // 3 km/s apart: blended. Third line far away.
        let a = mol("a", &[nu, 2. * nu]);
        let b = mol("b", &[nu * (1. + 3e3 / CLIGHT)]);
        let info = BlendInfo::new(&[a, b], 1e4);

        assert_eq!(info.count(), 2);
        let ab = info.of(0, 0);
        assert_eq!(ab.len(), 1);
        assert_eq!((ab[0].species, ab[0].line), (1, 0));
        assert!((ab[0].delta_v - 3e3).abs() < 1e-6);
        let ba = info.of(1, 0);
        assert!((ba[0].delta_v + 3e3).abs() < 0.1);
        assert!(info.of(0, 1).is_empty());
    }

    #[test]
    fn test_empty() {
        let a = mol("a", &[1e11, 1e11 * (1. + 1e-6)]);
        assert_eq!(BlendInfo::new(std::slice::from_ref(&a), 1e4).count(), 2);
        let empty = BlendInfo::empty(&[a]);
        assert_eq!(empty.count(), 0);
        assert!(empty.of(0, 1).is_empty());
    }
}
