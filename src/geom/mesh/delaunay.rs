//! Delaunay tetrahedralization via the Bowyer-Watson incremental insertion algorithm.
//!
//! This is the default [`Triangulator`]; any other provider of simplices can be
//! plugged into [`Mesh::from_points_with`](super::Mesh::from_points_with).

use std::collections::HashMap;

use crate::LineError;
use crate::Point;
use crate::geom::bboxes::bounding_box;
use crate::geom::tetrahedron::{circumsphere, mean_edge_length, tetrahedron_volume};

use super::topology::FaceKey;
use super::{Triangulation, Triangulator};

/// Internal tetrahedron representation with cached circumsphere data.
struct BwTet {
    v: [usize; 4],
    center: Point,
    radius_sq: f64,
}

/// Bowyer-Watson triangulator.
#[derive(Debug, Clone, Copy)]
pub struct BowyerWatson {
    /// Size of the enclosing super-tetrahedron relative to the half diagonal of
    /// the bounding box. Larger values keep more of the convex hull.
    pub super_scale: f64,
    /// Tetrahedra with volume below `sliver_tol * mean_edge^3` are dropped.
    pub sliver_tol: f64,
}

impl Default for BowyerWatson {
    fn default() -> Self {
        Self {
            super_scale: 50.,
            sliver_tol: 1e-9,
        }
    }
}

/// Creates a super-tetrahedron enclosing all given points.
fn super_tetrahedron(points: &[Point], scale_factor: f64) -> [Point; 4] {
    let (pmin, pmax) = bounding_box(points);

    let cx = (pmin.x + pmax.x) * 0.5;
    let cy = (pmin.y + pmax.y) * 0.5;
    let cz = (pmin.z + pmax.z) * 0.5;

    let dx = (pmax.x - pmin.x).max(1e-6);
    let dy = (pmax.y - pmin.y).max(1e-6);
    let dz = (pmax.z - pmin.z).max(1e-6);

    // Half-diagonal of the bounding box
    let half_diag = (dx * dx + dy * dy + dz * dz).sqrt() * 0.5;
    let scale = scale_factor * half_diag;

    [
        Point::new(cx + scale, cy, cz - scale * 0.707),
        Point::new(cx - scale, cy, cz - scale * 0.707),
        Point::new(cx, cy + scale, cz + scale * 0.707),
        Point::new(cx, cy - scale, cz + scale * 0.707),
    ]
}

/// The four faces of a tetrahedron as triples of vertex indices.
fn tet_faces(v: &[usize; 4]) -> [[usize; 3]; 4] {
    [
        [v[0], v[1], v[2]],
        [v[0], v[1], v[3]],
        [v[0], v[2], v[3]],
        [v[1], v[2], v[3]],
    ]
}

impl BowyerWatson {
    /// Runs the incremental insertion and returns tetrahedra indexing `points`.
    fn tetrahedralize(&self, points: &[Point]) -> Result<Vec<[usize; 4]>, LineError> {
        let n = points.len();
        if n < 4 {
            return Err(LineError::InsufficientPoints {
                found: n,
                required: 4,
            });
        }

        let super_pts = super_tetrahedron(points, self.super_scale);
        let mut all_points: Vec<Point> = points.to_vec();
        all_points.extend_from_slice(&super_pts);

        let si = [n, n + 1, n + 2, n + 3];
        let (center, radius_sq) = circumsphere(
            all_points[si[0]],
            all_points[si[1]],
            all_points[si[2]],
            all_points[si[3]],
        )
        .ok_or_else(|| LineError::DegenerateGeometry("super-tetrahedron is flat".into()))?;

        let mut tets: Vec<BwTet> = vec![BwTet {
            v: si,
            center,
            radius_sq,
        }];

        for i in 0..n {
            let pt = all_points[i];

            // Bad tets: those whose circumsphere contains the new point
            let mut bad_indices: Vec<usize> = Vec::new();
            for (ti, tet) in tets.iter().enumerate() {
                let d = pt - tet.center;
                if d.dot(d) < tet.radius_sq * (1. + 1e-10) {
                    bad_indices.push(ti);
                }
            }

            if bad_indices.is_empty() {
                continue;
            }

            // Cavity boundary: faces shared by exactly one bad tet
            let mut face_count: HashMap<FaceKey, (usize, [usize; 3])> = HashMap::new();
            for &bi in &bad_indices {
                for face in &tet_faces(&tets[bi].v) {
                    face_count
                        .entry(FaceKey::new(face[0], face[1], face[2]))
                        .and_modify(|(count, _)| *count += 1)
                        .or_insert((1, *face));
                }
            }
            let boundary_faces: Vec<[usize; 3]> = face_count
                .into_values()
                .filter(|(count, _)| *count == 1)
                .map(|(_, face)| face)
                .collect();

            // Remove bad tets (in reverse order to preserve indices)
            bad_indices.sort_unstable();
            for &bi in bad_indices.iter().rev() {
                tets.swap_remove(bi);
            }

            for face in &boundary_faces {
                let v = [face[0], face[1], face[2], i];
                if let Some((center, radius_sq)) = circumsphere(
                    all_points[v[0]],
                    all_points[v[1]],
                    all_points[v[2]],
                    all_points[v[3]],
                ) {
                    tets.push(BwTet {
                        v,
                        center,
                        radius_sq,
                    });
                }
            }
        }

        // Remove tets referencing super-tet vertices, then slivers
        let result: Vec<[usize; 4]> = tets
            .into_iter()
            .filter(|t| t.v.iter().all(|&vi| vi < n))
            .filter(|t| {
                let pts = t.v.map(|vi| all_points[vi]);
                let vol = tetrahedron_volume(pts[0], pts[1], pts[2], pts[3]);
                vol > self.sliver_tol * mean_edge_length(&pts).powi(3)
            })
            .map(|t| t.v)
            .collect();

        if result.is_empty() {
            Err(LineError::DegenerateGeometry(
                "all points are coplanar".into(),
            ))
        } else {
            Ok(result)
        }
    }
}

impl Triangulator for BowyerWatson {
    fn triangulate(&self, points: &[Point]) -> Result<Triangulation, LineError> {
        Ok(Triangulation {
            simplices: self.tetrahedralize(points)?,
            adjacency: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bowyer_watson_single_tet() {
        let points = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
        ];
        let tets = BowyerWatson::default().tetrahedralize(&points).unwrap();
        assert_eq!(tets.len(), 1);
    }

    #[test]
    fn test_bowyer_watson_fills_convex_hull() {
        // Interior points inside a corner tetrahedron of volume 1/6.
        let points = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
            Point::new(0.11, 0.21, 0.17),
            Point::new(0.23, 0.09, 0.31),
            Point::new(0.27, 0.24, 0.12),
            Point::new(0.13, 0.33, 0.22),
        ];
        let tets = BowyerWatson::default().tetrahedralize(&points).unwrap();

        let total_vol: f64 = tets
            .iter()
            .map(|t| tetrahedron_volume(points[t[0]], points[t[1]], points[t[2]], points[t[3]]))
            .sum();
        assert!(
            (total_vol - 1.0 / 6.0).abs() < 1e-9,
            "Volume should be 1/6, got {}",
            total_vol
        );
    }

    #[test]
    fn test_bowyer_watson_delaunay_property() {
        let points = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
            Point::new(1.0, 1.0, 1.0),
        ];
        let tets = BowyerWatson::default().tetrahedralize(&points).unwrap();

        // No point should lie strictly inside any tet's circumsphere
        for t in &tets {
            let (center, radius_sq) =
                circumsphere(points[t[0]], points[t[1]], points[t[2]], points[t[3]]).unwrap();
            for (pi, pt) in points.iter().enumerate() {
                if t.contains(&pi) {
                    continue;
                }
                let d = *pt - center;
                assert!(
                    d.dot(d) >= radius_sq - 1e-8,
                    "Point {} is inside circumsphere of tet {:?}",
                    pi,
                    t
                );
            }
        }
    }

    #[test]
    fn test_bowyer_watson_coplanar_fails() {
        let points = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(1.0, 1.0, 0.0),
        ];
        let err = BowyerWatson::default().tetrahedralize(&points).unwrap_err();
        assert!(matches!(err, LineError::DegenerateGeometry(_)));
    }

    #[test]
    fn test_bowyer_watson_too_few_points() {
        let points = vec![Point::new(0.0, 0.0, 0.0), Point::new(1.0, 0.0, 0.0)];
        let err = BowyerWatson::default().tetrahedralize(&points).unwrap_err();
        assert!(matches!(
            err,
            LineError::InsufficientPoints {
                found: 2,
                required: 4
            }
        ));
    }
}
