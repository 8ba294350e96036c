//! Physical and engine constants (SI).

/// Atomic mass unit [kg].
pub const AMU: f64 = 1.66053904e-27;
/// Speed of light [m/s].
pub const CLIGHT: f64 = 2.99792458e8;
/// Planck constant [J s].
pub const HPLANCK: f64 = 6.626070040e-34;
/// Boltzmann constant [J/K].
pub const KBOLTZ: f64 = 1.38064852e-23;
/// Parsec [m].
pub const PC: f64 = 3.08567758e16;
/// Astronomical unit [m].
pub const AU: f64 = 1.495978707e11;
/// h c / (4 pi sqrt(pi)).
pub const HPIP: f64 = 8.918502221e-27;
/// 100 h c / k: converts level energies in cm^-1 to K.
pub const HCKB: f64 = 1.43877735;
/// Arcseconds to radians.
pub const ARCSEC_RAD: f64 = std::f64::consts::PI / 180. / 3600.;

/// Maximum dust polarization fraction.
pub const MAXP: f64 = 0.15;
/// Upper bound of the per-vertex photon budget.
pub const MAX_PHOT: usize = 10000;
/// Initial photons per neighbour.
pub const ININPHOT: usize = 9;
/// Populations below this fraction are ignored in convergence tests.
pub const MINPOP: f64 = 1e-6;
/// Floor for clipped populations and divisions.
pub const EPS: f64 = 1e-30;
/// Relative tolerance of the inner statistical-equilibrium loop.
pub const TOL: f64 = 1e-6;
/// Maximum passes of the inner statistical-equilibrium loop.
pub const MAXITER: usize = 50;
/// Transitions closer than this in velocity are blended [m/s].
pub const MAX_BLEND_DELTA_V: f64 = 1e4;
/// Order of the Taylor series used by `fast_exp` for small arguments.
pub const FAST_EXP_MAX_TAYLOR: usize = 3;
/// Optical depth floor guarding against maser blow-up.
pub const MIN_TAU: f64 = -30.;

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_derived_constants() {
        let hpip = HPLANCK * CLIGHT / (4. * PI * PI.sqrt());
        assert!((hpip - HPIP).abs() / HPIP < 1e-8);
        let hckb = 100. * HPLANCK * CLIGHT / KBOLTZ;
        assert!((hckb - HCKB).abs() / HCKB < 1e-8);
    }
}
