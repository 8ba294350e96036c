use crate::Vector;
use crate::geom::point::convert::{array_to_vector, vector_to_array};
use anyhow::{Result, ensure};
use ndarray as nd;

/// Calculate rotation matrix for a unit vector `u` and angle `phi`.
///
/// A rotation in 3D can be described with an axis and angle around that axis.
/// The axis is described with a unit vector `u` `(ux**2 + uy**2 + uz**2 == 1)`
/// and the angle `phi` (in radians).
///
/// Uses the Rodrigues formula:
/// https://en.wikipedia.org/wiki/Rodrigues%27_rotation_formula
pub fn rotation_matrix(u: &Vector, phi: f64) -> Result<nd::Array2<f64>> {
    ensure!(
        (u.length() - 1.).abs() < 1e-9,
        "rotation_matrix() requires u to be a unit vector, got {u}"
    );

    let w: nd::Array2<f64> = nd::arr2(&[[0., -u.dz, u.dy], [u.dz, 0., -u.dx], [-u.dy, u.dx, 0.]]);

    Ok(nd::Array::eye(3) + phi.sin() * &w + (2. * (phi / 2.).sin().powi(2)) * w.dot(&w))
}

/// Rotation from the image frame to the model frame.
///
/// The image frame has x to the right, y up and z pointing at the observer.
/// The model is first inclined by `theta` around the image x axis, then turned by
/// `phi` around the model z axis. Columns of the result are the image axes expressed
/// in model coordinates.
pub fn view_rotation(theta: f64, phi: f64) -> Result<nd::Array2<f64>> {
    let rx = rotation_matrix(&Vector::new(1., 0., 0.), theta)?;
    let rz = rotation_matrix(&Vector::new(0., 0., 1.), phi)?;
    Ok(rz.dot(&rx))
}

/// Applies a 3x3 rotation matrix to a vector.
pub fn rotate_vector(rot: &nd::ArrayView2<f64>, v: Vector) -> Vector {
    if v.dx == 0. && v.dy == 0. && v.dz == 0. {
        return v;
    }
    array_to_vector(&rot.dot(&vector_to_array(v)).view())
}
