//! User supplied physical model.
//!
//! All quantities are SI: densities in m^-3, temperatures in K, velocities in m/s,
//! Doppler widths in m/s and magnetic fields in T.

use crate::{Point, Vector};

/// Physical fields as pure functions of position.
///
/// The engine samples the model at every grid vertex during initialisation, at
/// edge midpoints and along sight-lines. Implementations must be thread safe.
pub trait PhysicalModel: Sync {
    /// Number densities of the collision partners (one entry per component).
    fn density(&self, p: Point) -> Vec<f64>;

    /// Gas and dust temperature.
    fn temperature(&self, p: Point) -> [f64; 2];

    /// Fractional abundance of each species relative to the weighted density.
    fn abundance(&self, p: Point) -> Vec<f64>;

    /// Turbulent Doppler width.
    fn doppler(&self, p: Point) -> f64;

    fn velocity(&self, p: Point) -> Vector;

    fn magnetic_field(&self, _p: Point) -> Vector {
        Vector::zero()
    }

    fn gas_to_dust(&self, _p: Point) -> f64 {
        100.
    }
}

/// Spatially constant model.
#[derive(Debug, Clone)]
pub struct UniformModel {
    pub density: Vec<f64>,
    pub temperature: [f64; 2],
    pub abundance: Vec<f64>,
    pub doppler: f64,
    pub velocity: Vector,
    pub magnetic_field: Vector,
    pub gas_to_dust: f64,
}

impl UniformModel {
    /// Single collision partner and single species at rest.
    pub fn new(density: f64, temperature: f64, abundance: f64, doppler: f64) -> Self {
        Self {
            density: vec![density],
            temperature: [temperature, temperature],
            abundance: vec![abundance],
            doppler,
            velocity: Vector::zero(),
            magnetic_field: Vector::zero(),
            gas_to_dust: 100.,
        }
    }
}

impl PhysicalModel for UniformModel {
    fn density(&self, _p: Point) -> Vec<f64> {
        self.density.clone()
    }

    fn temperature(&self, _p: Point) -> [f64; 2] {
        self.temperature
    }

    fn abundance(&self, _p: Point) -> Vec<f64> {
        self.abundance.clone()
    }

    fn doppler(&self, _p: Point) -> f64 {
        self.doppler
    }

    fn velocity(&self, _p: Point) -> Vector {
        self.velocity
    }

    fn magnetic_field(&self, _p: Point) -> Vector {
        self.magnetic_field
    }

    fn gas_to_dust(&self, _p: Point) -> f64 {
        self.gas_to_dust
    }
}
