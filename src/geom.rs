pub mod bboxes;
pub mod mesh;
pub mod point;
pub mod ray;
pub mod rotation;
pub mod tetrahedron;
pub mod vector;

/// Geometric precision
pub const EPS: f64 = 1e-13;

