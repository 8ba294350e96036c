use serde::{Deserialize, Serialize};

/// What an image shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageKind {
    /// Spectral cube of one transition.
    Line {
        species: usize,
        line: usize,
        nchan: usize,
        /// Channel width [m/s].
        velres: f64,
    },
    /// Dust continuum at a single frequency [Hz].
    Continuum { freq: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrightnessUnit {
    /// Rayleigh-Jeans brightness temperature.
    Kelvin,
    JanskyPerPixel,
    /// W m^-2 Hz^-1 sr^-1.
    Si,
    /// Optical depth instead of intensity.
    Tau,
}

/// Configuration of one synthetic image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub kind: ImageKind,
    /// Pixels per side.
    pub pxls: usize,
    /// Pixel size [arcsec].
    pub imgres: f64,
    /// Distance to the source [m].
    pub distance: f64,
    /// Systemic velocity of the source [m/s].
    pub source_vel: f64,
    /// Inclination around the image x axis [rad].
    pub theta: f64,
    /// Rotation around the model z axis [rad].
    pub phi: f64,
    /// Trace Stokes I, Q and U (continuum only).
    pub polarization: bool,
    /// Sight-lines per pixel; more than one jitters them inside the pixel.
    pub antialias: usize,
    pub unit: BrightnessUnit,
    /// Slack on barycentric coordinates when deciding whether a sight-line
    /// crosses a face. Crossings through edges and vertices then resolve to the
    /// face with the largest smallest coordinate.
    pub face_eps: f64,
    pub seed: u64,
}

impl ImageConfig {
    pub fn new(kind: ImageKind) -> Self {
        Self {
            kind,
            pxls: 64,
            imgres: 0.1,
            distance: 140. * crate::sim::constants::PC,
            source_vel: 0.,
            theta: 0.,
            phi: 0.,
            polarization: false,
            antialias: 1,
            unit: BrightnessUnit::Kelvin,
            face_eps: 1e-9,
            seed: 140281,
        }
    }

    pub fn nchan(&self) -> usize {
        match self.kind {
            ImageKind::Line { nchan, .. } => nchan,
            ImageKind::Continuum { .. } => 1,
        }
    }

    /// Pixel size in the plane of the source [m].
    pub fn pixel_size(&self) -> f64 {
        self.imgres * crate::sim::constants::ARCSEC_RAD * self.distance
    }

    /// Centre velocity of each channel [m/s], symmetric around zero.
    pub fn channel_velocities(&self) -> Vec<f64> {
        match self.kind {
            ImageKind::Line { nchan, velres, .. } => (0..nchan)
                .map(|i| (i as f64 - (nchan as f64 - 1.) / 2.) * velres)
                .collect(),
            ImageKind::Continuum { .. } => vec![0.],
        }
    }
}
