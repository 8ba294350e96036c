//! Conversions between geometry types and `ndarray` vectors.

use crate::Vector;
use ndarray as nd;

pub fn vector_to_array(v: Vector) -> nd::Array1<f64> {
    nd::arr1(&[v.dx, v.dy, v.dz])
}

pub fn array_to_vector(arr: &nd::ArrayView1<f64>) -> Vector {
    Vector::new(arr[0], arr[1], arr[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion() {
        let v = Vector::new(-4., 5., 6.);
        assert_eq!(array_to_vector(&vector_to_array(v).view()), v);
    }
}
