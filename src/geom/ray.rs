//! Ray casting against tetrahedron faces.
//!
//! A face is described by its three corner points plus the vertex of the cell
//! opposite to it, which fixes the outward side of the face. The intersection test
//! projects the face onto its own plane and computes 2D barycentric coordinates,
//! so the caller can both decide containment and interpolate vertex data.

use crate::{Point, Vector};

/// Relative threshold below which a ray is treated as parallel to a face.
const PARALLEL_EPS: f64 = 1e-12;

/// A ray defined by an origin point and a direction vector.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin point of the ray
    pub origin: Point,
    /// Direction vector (unit length)
    pub direction: Vector,
}

/// Which way a ray crosses the plane of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Crossing from outside the cell to inside.
    Entering,
    /// Crossing from inside the cell to outside.
    Exiting,
    /// The ray runs parallel to the face.
    Parallel,
}

/// Everything known about the crossing of a ray with one face of a cell.
#[derive(Debug, Clone, Copy)]
pub struct FaceIntersection {
    /// Face index in `0..4`, equal to the index of the opposite cell vertex.
    pub face: usize,
    pub orientation: Orientation,
    /// Barycentric coordinates of the crossing point w.r.t. the face corners,
    /// in the order the corners were passed in.
    pub bary: [f64; 3],
    /// Ray parameter of the crossing point: `r = origin + dist * direction`.
    pub dist: f64,
    /// Smallest barycentric coordinate; negative values lie outside the face
    /// and values near zero are close to an edge.
    pub coll_par: f64,
}

impl FaceIntersection {
    /// True if the crossing point lies inside the face, allowing `eps` slack.
    pub fn is_inside(&self, eps: f64) -> bool {
        self.orientation != Orientation::Parallel && self.coll_par >= -eps
    }
}

impl Ray {
    /// Creates a new ray from origin point and direction vector.
    ///
    /// The direction vector is automatically normalized.
    pub fn new(origin: Point, direction: Vector) -> Option<Self> {
        let normalized = direction.normalize()?;
        Some(Self {
            origin,
            direction: normalized,
        })
    }

    /// Returns the point along the ray at parameter t.
    pub fn point_at(&self, t: f64) -> Point {
        self.origin + self.direction * t
    }

    /// Intersects the ray with the (infinite) plane of a cell face.
    ///
    /// `corners` are the face vertices and `opposite` is the remaining vertex of
    /// the cell, used to orient the face normal outwards.
    pub fn intersect_face(
        &self,
        face: usize,
        corners: [Point; 3],
        opposite: Point,
    ) -> FaceIntersection {
        let [p0, p1, p2] = corners;
        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let mut normal = e1.cross(e2);
        if normal.dot(opposite - p0) > 0. {
            normal = -normal;
        }

        let denom = normal.dot(self.direction);
        let scale = normal.length();
        if denom.abs() <= PARALLEL_EPS * scale {
            return FaceIntersection {
                face,
                orientation: Orientation::Parallel,
                bary: [-1.; 3],
                dist: f64::INFINITY,
                coll_par: -1.,
            };
        }

        let orientation = if denom > 0. {
            Orientation::Exiting
        } else {
            Orientation::Entering
        };
        let dist = normal.dot(p0 - self.origin) / denom;
        let r = self.point_at(dist);
        let bary = barycentric_in_plane(corners, r);
        let coll_par = bary.iter().copied().fold(f64::INFINITY, f64::min);

        FaceIntersection {
            face,
            orientation,
            bary,
            dist,
            coll_par,
        }
    }
}

/// Barycentric coordinates of `r` in the triangle `corners`, computed in the
/// 2D frame spanned by the triangle itself.
///
/// Degenerate triangles return `[-1, -1, -1]` so they never count as hit.
pub fn barycentric_in_plane(corners: [Point; 3], r: Point) -> [f64; 3] {
    let [p0, p1, p2] = corners;
    let e1 = p1 - p0;
    let e2 = p2 - p0;
    let (Some(x_axis), Some(n)) = (e1.normalize(), e1.cross(e2).normalize()) else {
        return [-1.; 3];
    };
    let y_axis = n.cross(x_axis);

    let to_2d = |p: Point| {
        let d = p - p0;
        (d.dot(x_axis), d.dot(y_axis))
    };
    let (x0, y0) = (0., 0.);
    let (x1, y1) = to_2d(p1);
    let (x2, y2) = to_2d(p2);
    let (x, y) = to_2d(r);

    let det = (y1 - y2) * (x0 - x2) + (x2 - x1) * (y0 - y2);
    if det.abs() < f64::MIN_POSITIVE {
        return [-1.; 3];
    }
    let b0 = ((y1 - y2) * (x - x2) + (x2 - x1) * (y - y2)) / det;
    let b1 = ((y2 - y0) * (x - x2) + (x0 - x2) * (y - y2)) / det;
    [b0, b1, 1. - b0 - b1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy_face() -> [Point; 3] {
        [
            Point::new(0., 0., 0.),
            Point::new(1., 0., 0.),
            Point::new(0., 1., 0.),
        ]
    }

    #[test]
    fn test_ray_creation() {
        assert!(Ray::new(Point::new(0., 0., 0.), Vector::new(1., 0., 0.)).is_some());
        assert!(Ray::new(Point::new(0., 0., 0.), Vector::zero()).is_none());
    }

    #[test]
    fn test_exiting_face() {
        // Opposite vertex above the face, so the outward normal points down.
        let ray = Ray::new(Point::new(0.2, 0.2, 1.), Vector::new(0., 0., -1.)).unwrap();
        let hit = ray.intersect_face(3, xy_face(), Point::new(0., 0., 1.));
        assert_eq!(hit.orientation, Orientation::Exiting);
        assert!((hit.dist - 1.).abs() < 1e-12);
        assert!(hit.is_inside(0.));
        assert!((hit.bary[0] - 0.6).abs() < 1e-12);
        assert!((hit.bary[1] - 0.2).abs() < 1e-12);
        assert!((hit.bary[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_entering_face() {
        let ray = Ray::new(Point::new(0.2, 0.2, -1.), Vector::new(0., 0., 1.)).unwrap();
        let hit = ray.intersect_face(0, xy_face(), Point::new(0., 0., 1.));
        assert_eq!(hit.orientation, Orientation::Entering);
        assert!((hit.dist - 1.).abs() < 1e-12);
    }

    #[test]
    fn test_miss_outside_face() {
        let ray = Ray::new(Point::new(2., 2., 1.), Vector::new(0., 0., -1.)).unwrap();
        let hit = ray.intersect_face(0, xy_face(), Point::new(0., 0., 1.));
        assert!(!hit.is_inside(1e-9));
    }

    #[test]
    fn test_parallel_face() {
        let ray = Ray::new(Point::new(0.2, 0.2, 1.), Vector::new(1., 0., 0.)).unwrap();
        let hit = ray.intersect_face(0, xy_face(), Point::new(0., 0., 1.));
        assert_eq!(hit.orientation, Orientation::Parallel);
        assert!(!hit.is_inside(1.));
    }

    #[test]
    fn test_edge_hit_within_tolerance() {
        // Crossing exactly on the edge p0-p1.
        let ray = Ray::new(Point::new(0.5, 0., 1.), Vector::new(0., 0., -1.)).unwrap();
        let hit = ray.intersect_face(0, xy_face(), Point::new(0., 0., 1.));
        assert!(hit.coll_par.abs() < 1e-12);
        assert!(hit.is_inside(1e-9));
    }
}
