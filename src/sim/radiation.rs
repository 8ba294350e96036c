//! Radiation helpers shared by the radiation estimator and the ray tracer.

use crate::sim::constants::{CLIGHT, EPS, HPIP, HPLANCK, KBOLTZ};
use crate::sim::fastexp::fast_exp;
use crate::sim::molecule::Transition;

/// Blackbody intensity B_nu(T) [W m^-2 Hz^-1 sr^-1].
pub fn planck(freq: f64, t: f64) -> f64 {
    if t < EPS {
        return 0.;
    }
    let x = HPLANCK * freq / (KBOLTZ * t);
    let prefactor = 2. * HPLANCK * freq.powi(3) / (CLIGHT * CLIGHT);
    if x > 100. {
        // Wien limit
        prefactor * (-x).exp()
    } else {
        prefactor / x.exp_m1()
    }
}

/// Normalised Gaussian line profile at velocity offset `v` (without the 1/sqrt(pi)).
pub fn gaussline(v: f64, binv: f64) -> f64 {
    fast_exp((v * binv).powi(2))
}

/// Returns `((1 - e^-dtau)/dtau, e^-dtau)`.
///
/// Below `taylor_cutoff` the first factor uses its second-order series to avoid
/// cancellation.
pub fn calc_source_fn(dtau: f64, taylor_cutoff: f64) -> (f64, f64) {
    let exp_dtau = fast_exp(dtau);
    let remnant = if dtau.abs() < taylor_cutoff {
        1. - dtau * (1. - dtau / 3.) / 2.
    } else {
        (1. - exp_dtau) / dtau
    };
    (remnant, exp_dtau)
}

/// Emission and absorption coefficients accumulated along a path element.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Emissivity {
    pub jnu: f64,
    pub alpha: f64,
}

impl Emissivity {
    /// Adds the line contribution of `line` with profile value `vfac`.
    ///
    /// `pops` are level fractions and `nmol` the species number density.
    pub fn add_line(&mut self, line: &Transition, vfac: f64, binv: f64, nmol: f64, pops: &[f64]) {
        self.add_line_densities(
            line,
            vfac,
            binv,
            nmol * pops[line.upper],
            nmol * pops[line.lower],
        );
    }

    /// Same as [`Emissivity::add_line`] with upper and lower level number densities.
    pub fn add_line_densities(&mut self, line: &Transition, vfac: f64, binv: f64, n_u: f64, n_l: f64) {
        let factor = vfac * HPIP * binv;
        self.jnu += factor * n_u * line.a;
        self.alpha += factor * (n_l * line.b_lu - n_u * line.b_ul);
    }

    /// Adds thermal dust emission and absorption.
    pub fn add_continuum(&mut self, knu: f64, dust: f64) {
        self.jnu += dust * knu;
        self.alpha += knu;
    }
}
