//! Dust opacity table and continuum coefficients.

use serde::{Deserialize, Serialize};

use crate::LineError;
use crate::sim::constants::AMU;
use crate::sim::radiation::planck;

/// Mean mass per gas particle in units of AMU.
const MEAN_PARTICLE_MASS: f64 = 2.4;

/// Mass absorption coefficient of the dust as a function of frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DustOpacity {
    /// Ascending frequencies [Hz].
    pub freq: Vec<f64>,
    /// Opacity per unit dust mass [m^2 kg^-1].
    pub kappa: Vec<f64>,
}

impl DustOpacity {
    pub fn new(freq: Vec<f64>, kappa: Vec<f64>) -> Result<Self, LineError> {
        if freq.is_empty() || freq.len() != kappa.len() {
            return Err(LineError::InvalidInput(
                "dust opacity table needs matching, non-empty columns".into(),
            ));
        }
        if freq.iter().chain(&kappa).any(|v| !(*v > 0.)) {
            return Err(LineError::InvalidInput(
                "dust opacity table must be positive for log interpolation".into(),
            ));
        }
        if freq.windows(2).any(|w| w[1] <= w[0]) {
            return Err(LineError::InvalidInput(
                "dust opacity frequencies must be ascending".into(),
            ));
        }
        Ok(Self { freq, kappa })
    }

    /// Opacity at `nu`, interpolated linearly in log-log space.
    ///
    /// Outside the table the end segments are extrapolated.
    pub fn kappa_at(&self, nu: f64) -> f64 {
        let n = self.freq.len();
        if n == 1 {
            return self.kappa[0];
        }
        let i = self
            .freq
            .partition_point(|&f| f <= nu)
            .saturating_sub(1)
            .min(n - 2);
        let (x0, x1) = (self.freq[i].ln(), self.freq[i + 1].ln());
        let (y0, y1) = (self.kappa[i].ln(), self.kappa[i + 1].ln());
        (y0 + (nu.ln() - x0) * (y1 - y0) / (x1 - x0)).exp()
    }
}

/// Dust absorption coefficient [m^-1] and emission (Planck) term at frequency `nu`.
pub fn dust_coefficients(
    opacity: Option<&DustOpacity>,
    nu: f64,
    t_dust: f64,
    gas_to_dust: f64,
    total_density: f64,
) -> (f64, f64) {
    match opacity {
        Some(op) => {
            let knu = op.kappa_at(nu) * MEAN_PARTICLE_MASS * AMU / gas_to_dust * total_density;
            (knu, planck(nu, t_dust))
        }
        None => (0., 0.),
    }
}
