//! Point-cloud mesh: vertices with neighbour graphs plus tetrahedral cells.
//!
//! The mesh is an arena. Vertices and cells are addressed by their index, and
//! every relation (vertex neighbours, cell vertices, cell neighbours) is a list of
//! indices into the arena. Topology is fixed once the mesh is built.

pub mod delaunay;
pub(crate) mod topology;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::LineError;
use crate::geom::bboxes::bounding_box;
use crate::geom::tetrahedron::{mean_edge_length, tetrahedron_centroid, tetrahedron_volume};
use crate::{Point, Vector};

pub use delaunay::BowyerWatson;

/// Cells with volume below this fraction of `mean_edge^3` are rejected.
const DEGENERATE_VOLUME_TOL: f64 = 1e-10;

/// A mesh vertex and its neighbour graph.
///
/// `neighbors`, `dir`, `ds` and `w` are index-aligned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshVertex {
    pub id: usize,
    pub position: Point,
    /// Indices of the neighbouring vertices.
    pub neighbors: Vec<usize>,
    /// Unit vectors pointing at each neighbour.
    pub dir: Vec<Vector>,
    /// Distance to each neighbour.
    pub ds: Vec<f64>,
    /// Normalised inverse-distance weight of each neighbour.
    pub w: Vec<f64>,
    /// Boundary vertex carrying prescribed populations.
    pub sink: bool,
}

impl MeshVertex {
    pub fn num_neigh(&self) -> usize {
        self.neighbors.len()
    }
}

/// A tetrahedral cell. Vertex `i` is opposite the face shared with `neighbors[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub id: usize,
    pub vertices: [usize; 4],
    /// `None` marks an external face.
    pub neighbors: [Option<usize>; 4],
    pub centre: Point,
    pub volume: f64,
}

impl Cell {
    /// Vertex indices of face `face` (all vertices except `vertices[face]`).
    pub fn face_vertices(&self, face: usize) -> [usize; 3] {
        topology::face_of(&self.vertices, face)
    }

    /// Index of the face shared with cell `other`, if they are adjacent.
    pub fn face_towards(&self, other: usize) -> Option<usize> {
        self.neighbors.iter().position(|n| *n == Some(other))
    }
}

/// Simplices produced by a triangulation primitive.
#[derive(Debug, Clone, Default)]
pub struct Triangulation {
    pub simplices: Vec<[usize; 4]>,
    /// Optional neighbour cells per simplex; computed from shared faces when absent.
    pub adjacency: Option<Vec<[Option<usize>; 4]>>,
}

/// Source of a Delaunay (or any conforming) tetrahedralization.
pub trait Triangulator {
    fn triangulate(&self, points: &[Point]) -> Result<Triangulation, LineError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    vertices: Vec<MeshVertex>,
    cells: Vec<Cell>,
}

impl Mesh {
    /// Tetrahedralizes `points` with the built-in Bowyer-Watson triangulator.
    pub fn from_points(points: Vec<Point>) -> Result<Self, LineError> {
        Self::from_points_with(points, &BowyerWatson::default())
    }

    /// Tetrahedralizes `points` with a user supplied triangulator.
    pub fn from_points_with<T: Triangulator>(
        points: Vec<Point>,
        triangulator: &T,
    ) -> Result<Self, LineError> {
        check_duplicates(&points)?;
        let triangulation = triangulator.triangulate(&points)?;
        Self::from_triangulation(points, triangulation)
    }

    /// Builds the mesh from points and externally computed simplices.
    ///
    /// Vertices on external faces become sinks.
    pub fn from_triangulation(
        points: Vec<Point>,
        triangulation: Triangulation,
    ) -> Result<Self, LineError> {
        let n = points.len();
        if n < 4 {
            return Err(LineError::InsufficientPoints {
                found: n,
                required: 4,
            });
        }
        let simplices = triangulation.simplices;
        if simplices.is_empty() {
            return Err(LineError::DegenerateGeometry("no simplices".into()));
        }

        let mut cells = Vec::with_capacity(simplices.len());
        for (ci, s) in simplices.iter().enumerate() {
            if s.iter().any(|&v| v >= n) {
                return Err(LineError::InvalidTopology(format!(
                    "cell {ci} refers to a vertex outside 0..{n}"
                )));
            }
            let pts = s.map(|v| points[v]);
            let volume = tetrahedron_volume(pts[0], pts[1], pts[2], pts[3]);
            if !(volume > DEGENERATE_VOLUME_TOL * mean_edge_length(&pts).powi(3)) {
                return Err(LineError::DegenerateCell { cell: ci, volume });
            }
            cells.push(Cell {
                id: ci,
                vertices: *s,
                neighbors: [None; 4],
                centre: tetrahedron_centroid(pts[0], pts[1], pts[2], pts[3]),
                volume,
            });
        }

        let adjacency = match triangulation.adjacency {
            Some(adj) => {
                topology::validate_adjacency(&simplices, &adj)?;
                adj
            }
            None => topology::cell_adjacency(&simplices)?,
        };
        for (cell, neigh) in cells.iter_mut().zip(&adjacency) {
            cell.neighbors = *neigh;
        }

        let neighbours = topology::vertex_neighbours(n, &simplices);
        if let Some(orphan) = neighbours.iter().position(|l| l.is_empty()) {
            return Err(LineError::InvalidTopology(format!(
                "vertex {orphan} belongs to no cell"
            )));
        }
        let sinks = topology::hull_vertices(n, &simplices, &adjacency);

        let vertices = build_vertices(&points, neighbours, &sinks)?;
        let mesh = Self { vertices, cells };
        debug!(
            vertices = mesh.vertices.len(),
            cells = mesh.cells.len(),
            sinks = mesh.num_sinks(),
            "built tetrahedral mesh"
        );
        Ok(mesh)
    }

    /// Builds a cell-less neighbour graph from explicit undirected edges.
    ///
    /// Such a mesh supports the radiation estimator but cannot be ray traced.
    pub fn from_graph(
        points: Vec<Point>,
        edges: &[(usize, usize)],
        sinks: &[usize],
    ) -> Result<Self, LineError> {
        let n = points.len();
        if n == 0 {
            return Err(LineError::InsufficientPoints {
                found: 0,
                required: 1,
            });
        }
        let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(a, b) in edges {
            if a >= n || b >= n || a == b {
                return Err(LineError::InvalidTopology(format!("invalid edge ({a}, {b})")));
            }
            neighbours[a].push(b);
            neighbours[b].push(a);
        }
        for list in &mut neighbours {
            list.sort_unstable();
            list.dedup();
        }
        let mut sink_flags = vec![false; n];
        for &s in sinks {
            *sink_flags.get_mut(s).ok_or_else(|| {
                LineError::InvalidTopology(format!("sink {s} is not a vertex"))
            })? = true;
        }
        let vertices = build_vertices(&points, neighbours, &sink_flags)?;
        Ok(Self {
            vertices,
            cells: Vec::new(),
        })
    }

    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    pub fn vertex(&self, id: usize) -> &MeshVertex {
        &self.vertices[id]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, id: usize) -> &Cell {
        &self.cells[id]
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_sinks(&self) -> usize {
        self.vertices.iter().filter(|v| v.sink).count()
    }

    /// Positions of the corners of face `face` of cell `cell` and of the opposite vertex.
    pub fn face_points(&self, cell: usize, face: usize) -> ([Point; 3], Point) {
        let c = &self.cells[cell];
        let corners = c.face_vertices(face).map(|v| self.vertices[v].position);
        (corners, self.vertices[c.vertices[face]].position)
    }

    /// All (cell, face) pairs lying on the outer boundary.
    pub fn external_faces(&self) -> Vec<(usize, usize)> {
        self.cells
            .iter()
            .flat_map(|c| {
                c.neighbors
                    .iter()
                    .enumerate()
                    .filter(|(_, n)| n.is_none())
                    .map(move |(fi, _)| (c.id, fi))
            })
            .collect()
    }

    /// Total volume covered by the cells.
    pub fn volume(&self) -> f64 {
        self.cells.iter().map(|c| c.volume).sum()
    }
}

/// Fills in directions, distances and weights for every vertex.
fn build_vertices(
    points: &[Point],
    neighbours: Vec<Vec<usize>>,
    sinks: &[bool],
) -> Result<Vec<MeshVertex>, LineError> {
    points
        .iter()
        .zip(neighbours)
        .enumerate()
        .map(|(id, (&position, neighbors))| {
            let mut dir = Vec::with_capacity(neighbors.len());
            let mut ds = Vec::with_capacity(neighbors.len());
            for &j in &neighbors {
                let edge = points[j] - position;
                let unit = edge.normalize().ok_or_else(|| {
                    LineError::DegenerateGeometry(format!("vertices {id} and {j} coincide"))
                })?;
                dir.push(unit);
                ds.push(edge.length());
            }
            let inv_sum: f64 = ds.iter().map(|d| 1. / d).sum();
            let w = ds.iter().map(|d| (1. / d) / inv_sum).collect();
            Ok(MeshVertex {
                id,
                position,
                neighbors,
                dir,
                ds,
                w,
                sink: sinks[id],
            })
        })
        .collect()
}

/// Rejects coincident input points.
///
/// Points are quantized relative to the bounding box diagonal, so that points
/// closer than about 1e-9 of the model size count as duplicates.
fn check_duplicates(points: &[Point]) -> Result<(), LineError> {
    let (pmin, pmax) = bounding_box(points);
    let diag = (pmax - pmin).length();
    if diag == 0. {
        return if points.len() > 1 {
            Err(LineError::DegenerateGeometry("all points coincide".into()))
        } else {
            Ok(())
        };
    }
    let scale = 1e9 / diag;

    let mut seen: HashMap<(i64, i64, i64), usize> = HashMap::new();
    for (i, p) in points.iter().enumerate() {
        let key = (
            ((p.x - pmin.x) * scale).round() as i64,
            ((p.y - pmin.y) * scale).round() as i64,
            ((p.z - pmin.z) * scale).round() as i64,
        );
        if let Some(j) = seen.insert(key, i) {
            return Err(LineError::DegenerateGeometry(format!(
                "points {j} and {i} coincide"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn corner_tet_cloud() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
            Point::new(0.11, 0.21, 0.17),
            Point::new(0.23, 0.09, 0.31),
            Point::new(0.27, 0.24, 0.12),
            Point::new(0.13, 0.33, 0.22),
        ]
    }

    #[test]
    fn test_from_points_topology() {
        let mesh = Mesh::from_points(corner_tet_cloud()).unwrap();
        assert!((mesh.volume() - 1. / 6.).abs() < 1e-9);

        // Hull corners are sinks, interior points are not.
        for v in 0..4 {
            assert!(mesh.vertex(v).sink);
        }
        for v in 4..8 {
            assert!(!mesh.vertex(v).sink, "vertex {v} should be interior");
        }

        // Opposite-face invariant.
        for cell in mesh.cells() {
            for (fi, n) in cell.neighbors.iter().enumerate() {
                if let Some(nj) = n {
                    let other = mesh.cell(*nj);
                    assert!(!other.vertices.contains(&cell.vertices[fi]));
                    for v in cell.face_vertices(fi) {
                        assert!(other.vertices.contains(&v));
                    }
                    assert_eq!(other.face_towards(cell.id).map(|f| other.neighbors[f]), Some(Some(cell.id)));
                }
            }
        }
    }

    #[test]
    fn test_vertex_arrays_aligned() {
        let mesh = Mesh::from_points(corner_tet_cloud()).unwrap();
        for v in mesh.vertices() {
            assert_eq!(v.dir.len(), v.num_neigh());
            assert_eq!(v.ds.len(), v.num_neigh());
            assert_eq!(v.w.len(), v.num_neigh());
            let wsum: f64 = v.w.iter().sum();
            assert!((wsum - 1.).abs() < 1e-12);
            for (k, &j) in v.neighbors.iter().enumerate() {
                let expected = (mesh.vertex(j).position - v.position).normalize().unwrap();
                assert!(v.dir[k].is_close(&expected));
            }
        }
    }

    #[test]
    fn test_external_faces_of_random_cloud() {
        let mut rng = StdRng::seed_from_u64(7);
        let pts: Vec<Point> = (0..40)
            .map(|_| {
                Point::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                )
            })
            .collect();
        let mesh = Mesh::from_points(pts).unwrap();
        let ext = mesh.external_faces();
        assert!(!ext.is_empty());
        for (c, f) in ext {
            for v in mesh.cell(c).face_vertices(f) {
                assert!(mesh.vertex(v).sink);
            }
        }
    }

    #[test]
    fn test_insufficient_points() {
        let err = Mesh::from_points(vec![Point::new(0., 0., 0.), Point::new(1., 0., 0.)])
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, LineError::InsufficientPoints { .. }));
    }

    #[test]
    fn test_duplicate_points() {
        let mut pts = corner_tet_cloud();
        pts.push(pts[5]);
        assert!(matches!(
            Mesh::from_points(pts),
            Err(LineError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_degenerate_external_simplex() {
        let pts = vec![
            Point::new(0., 0., 0.),
            Point::new(1., 0., 0.),
            Point::new(0., 1., 0.),
            Point::new(1., 1., 0.),
        ];
        let tri = Triangulation {
            simplices: vec![[0, 1, 2, 3]],
            adjacency: None,
        };
        assert!(matches!(
            Mesh::from_triangulation(pts, tri),
            Err(LineError::DegenerateCell { cell: 0, .. })
        ));
    }

    #[test]
    fn test_from_graph() {
        let pts = vec![Point::new(0., 0., 0.), Point::new(2., 0., 0.)];
        let mesh = Mesh::from_graph(pts, &[(0, 1)], &[1]).unwrap();
        assert!(mesh.cells().is_empty());
        assert!(!mesh.vertex(0).sink);
        assert!(mesh.vertex(1).sink);
        assert_eq!(mesh.vertex(0).neighbors, vec![1]);
        assert!((mesh.vertex(0).ds[0] - 2.).abs() < 1e-12);
        assert!(Mesh::from_graph(vec![Point::default()], &[(0, 0)], &[]).is_err());
    }
}
