//! Cell-to-cell traversal of a straight sight-line.

use crate::LineError;
use crate::Mesh;
use crate::geom::ray::{FaceIntersection, Orientation, Ray};

/// Piece of a sight-line inside one cell.
///
/// Weights are barycentric weights of the cell vertices at entry and exit.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub cell: usize,
    pub d_in: f64,
    pub d_out: f64,
    pub w_in: [f64; 4],
    pub w_out: [f64; 4],
}

/// All cells crossed by `ray`, ordered along it.
///
/// After leaving through an external face the search for an entry face is
/// repeated further along the ray. Returns an empty list if the ray misses.
pub fn follow(
    mesh: &Mesh,
    ray: &Ray,
    external: &[(usize, usize)],
    eps: f64,
) -> Result<Vec<Segment>, LineError> {
    let mut segments = Vec::new();
    let mut min_dist = f64::NEG_INFINITY;

    while let Some((mut cell, mut hit)) = find_entry(mesh, ray, external, eps, min_dist) {
        let mut left = false;
        for _ in 0..=mesh.cells().len() {
            let exit = find_exit(mesh, ray, cell, hit.face, eps).ok_or_else(|| {
                LineError::RayTraceDegenerate(format!("no exit face found in cell {cell}"))
            })?;
            segments.push(Segment {
                cell,
                d_in: hit.dist,
                d_out: exit.dist,
                w_in: vertex_weights(&hit),
                w_out: vertex_weights(&exit),
            });

            let Some(next) = mesh.cell(cell).neighbors[exit.face] else {
                min_dist = exit.dist;
                left = true;
                break;
            };
            let back = mesh.cell(next).face_towards(cell).ok_or_else(|| {
                LineError::RayTraceDegenerate(format!(
                    "cells {cell} and {next} disagree on adjacency"
                ))
            })?;
            let (corners, opposite) = mesh.face_points(next, back);
            hit = ray.intersect_face(back, corners, opposite);
            cell = next;
        }
        if !left {
            return Err(LineError::RayTraceDegenerate(
                "sight-line crossed more cells than the mesh holds".into(),
            ));
        }
    }
    Ok(segments)
}

/// Nearest external face the ray enters beyond `min_dist`.
fn find_entry(
    mesh: &Mesh,
    ray: &Ray,
    external: &[(usize, usize)],
    eps: f64,
    min_dist: f64,
) -> Option<(usize, FaceIntersection)> {
    let threshold = if min_dist.is_finite() {
        min_dist + 1e-9 * min_dist.abs().max(1.)
    } else {
        min_dist
    };
    external
        .iter()
        .filter_map(|&(cell, face)| {
            let (corners, opposite) = mesh.face_points(cell, face);
            let hit = ray.intersect_face(face, corners, opposite);
            (hit.orientation == Orientation::Entering && hit.is_inside(eps) && hit.dist > threshold)
                .then_some((cell, hit))
        })
        .min_by(|a, b| a.1.dist.total_cmp(&b.1.dist))
}

/// Face through which the ray leaves `cell`, having entered through `entry_face`.
///
/// Of the faces the ray exits, the one whose crossing lies deepest inside it
/// wins, so crossings through edges or vertices resolve to a single face.
fn find_exit(
    mesh: &Mesh,
    ray: &Ray,
    cell: usize,
    entry_face: usize,
    eps: f64,
) -> Option<FaceIntersection> {
    (0..4)
        .filter(|&f| f != entry_face)
        .map(|f| {
            let (corners, opposite) = mesh.face_points(cell, f);
            ray.intersect_face(f, corners, opposite)
        })
        .filter(|h| h.orientation == Orientation::Exiting && h.is_inside(eps))
        .max_by(|a, b| a.coll_par.total_cmp(&b.coll_par))
}

/// Barycentric weights over the four cell vertices of a point on one face.
fn vertex_weights(hit: &FaceIntersection) -> [f64; 4] {
    let mut w = [0.; 4];
    let mut k = 0;
    for (i, wi) in w.iter_mut().enumerate() {
        if i != hit.face {
            *wi = hit.bary[k].max(0.);
            k += 1;
        }
    }
    let sum: f64 = w.iter().sum();
    if sum > 0. {
        w.iter_mut().for_each(|x| *x /= sum);
    }
    w
}
