//! Ray tracing of synthetic images through the mesh.

pub mod config;
pub mod image;
pub mod tracer;
pub(crate) mod walk;

pub use config::{BrightnessUnit, ImageConfig, ImageKind};
pub use image::Image;
pub use tracer::RayTracer;
