use ndarray as nd;

use crate::sim::constants::{ARCSEC_RAD, CLIGHT, KBOLTZ};

use super::config::{BrightnessUnit, ImageConfig};

/// Result of tracing one image. Intensities are in W m^-2 Hz^-1 sr^-1.
#[derive(Debug, Clone)]
pub struct Image {
    pub config: ImageConfig,
    /// Rest frequency of the imaged line, or the continuum frequency [Hz].
    pub freq: f64,
    /// Background-subtracted intensity, shape `(pxls, pxls, nchan)`.
    pub intensity: nd::Array3<f64>,
    /// Optical depth along each sight-line, shape `(pxls, pxls, nchan)`.
    pub tau: nd::Array3<f64>,
    /// Stokes I, Q and U, shape `(pxls, pxls, 3)`. Only for polarized continuum.
    pub stokes: Option<nd::Array3<f64>>,
    /// Sight-lines dropped because they could not be followed.
    pub discarded: usize,
}

impl Image {
    pub(crate) fn new(config: ImageConfig, freq: f64) -> Self {
        let shape = (config.pxls, config.pxls, config.nchan());
        let stokes = config
            .polarization
            .then(|| nd::Array3::zeros((config.pxls, config.pxls, 3)));
        Self {
            config,
            freq,
            intensity: nd::Array3::zeros(shape),
            tau: nd::Array3::zeros(shape),
            stokes,
            discarded: 0,
        }
    }

    pub fn velocities(&self) -> Vec<f64> {
        self.config.channel_velocities()
    }

    /// Intensity summed over all pixels, per channel.
    pub fn spectrum(&self) -> Vec<f64> {
        self.intensity
            .sum_axis(nd::Axis(0))
            .sum_axis(nd::Axis(0))
            .to_vec()
    }

    /// The intensity cube expressed in `unit`.
    pub fn to_unit(&self, unit: BrightnessUnit) -> nd::Array3<f64> {
        match unit {
            BrightnessUnit::Si => self.intensity.clone(),
            BrightnessUnit::Kelvin => {
                let factor = CLIGHT * CLIGHT / (2. * KBOLTZ * self.freq * self.freq);
                &self.intensity * factor
            }
            BrightnessUnit::JanskyPerPixel => {
                let omega = (self.config.imgres * ARCSEC_RAD).powi(2);
                &self.intensity * (omega * 1e26)
            }
            BrightnessUnit::Tau => self.tau.clone(),
        }
    }

    /// The intensity cube in the configured unit.
    pub fn converted(&self) -> nd::Array3<f64> {
        self.to_unit(self.config.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::raytrace::config::ImageKind;

    #[test]
    fn test_units() {
        let mut config = ImageConfig::new(ImageKind::Continuum { freq: 1e11 });
        config.pxls = 2;
        config.imgres = 1.;
        let mut img = Image::new(config, 1e11);
        img.intensity.fill(1e-18);
        img.tau.fill(0.5);

        let k = img.to_unit(BrightnessUnit::Kelvin);
        let expected = 1e-18 * CLIGHT * CLIGHT / (2. * KBOLTZ * 1e22);
        assert!((k[(0, 0, 0)] - expected).abs() / expected < 1e-12);
        assert_eq!(img.converted(), k);

        let jy = img.to_unit(BrightnessUnit::JanskyPerPixel);
        let expected = 1e-18 * ARCSEC_RAD * ARCSEC_RAD * 1e26;
        assert!((jy[(1, 1, 0)] - expected).abs() / expected < 1e-12);

        assert_eq!(img.to_unit(BrightnessUnit::Tau)[(0, 1, 0)], 0.5);
        assert_eq!(img.spectrum(), vec![4e-18]);
        assert!(img.stokes.is_none());
    }
}
