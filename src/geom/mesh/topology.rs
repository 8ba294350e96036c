//! Face and edge bookkeeping for tetrahedral meshes.

use std::collections::HashMap;

use crate::LineError;

/// A face key with sorted vertex indices for hashing.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub(crate) struct FaceKey([usize; 3]);

impl FaceKey {
    pub(crate) fn new(a: usize, b: usize, c: usize) -> Self {
        let mut arr = [a, b, c];
        arr.sort_unstable();
        FaceKey(arr)
    }
}

/// Vertices of face `face` of a simplex, i.e. all vertices except `simplex[face]`.
pub(crate) fn face_of(simplex: &[usize; 4], face: usize) -> [usize; 3] {
    let mut out = [0; 3];
    let mut k = 0;
    for (i, &v) in simplex.iter().enumerate() {
        if i != face {
            out[k] = v;
            k += 1;
        }
    }
    out
}

/// Computes cell neighbours so that neighbour `i` shares the face opposite vertex `i`.
///
/// Faces on the outer boundary get `None`. A face shared by more than two
/// simplices means the input is not a valid triangulation.
pub(crate) fn cell_adjacency(simplices: &[[usize; 4]]) -> Result<Vec<[Option<usize>; 4]>, LineError> {
    let mut owners: HashMap<FaceKey, Vec<(usize, usize)>> = HashMap::new();
    for (ci, s) in simplices.iter().enumerate() {
        for fi in 0..4 {
            let [a, b, c] = face_of(s, fi);
            owners.entry(FaceKey::new(a, b, c)).or_default().push((ci, fi));
        }
    }

    let mut adjacency = vec![[None; 4]; simplices.len()];
    for (key, cells) in owners {
        match cells.as_slice() {
            [_] => {}
            [(c0, f0), (c1, f1)] => {
                adjacency[*c0][*f0] = Some(*c1);
                adjacency[*c1][*f1] = Some(*c0);
            }
            _ => {
                return Err(LineError::InvalidTopology(format!(
                    "face {:?} is shared by {} cells",
                    key.0,
                    cells.len()
                )));
            }
        }
    }
    Ok(adjacency)
}

/// Checks that externally supplied adjacency honours the opposite-face rule.
pub(crate) fn validate_adjacency(
    simplices: &[[usize; 4]],
    adjacency: &[[Option<usize>; 4]],
) -> Result<(), LineError> {
    if simplices.len() != adjacency.len() {
        return Err(LineError::InvalidTopology(format!(
            "{} simplices but {} adjacency entries",
            simplices.len(),
            adjacency.len()
        )));
    }
    for (ci, (s, neigh)) in simplices.iter().zip(adjacency).enumerate() {
        for (fi, n) in neigh.iter().enumerate() {
            let Some(nj) = *n else { continue };
            let other = simplices.get(nj).ok_or_else(|| {
                LineError::InvalidTopology(format!("cell {ci} refers to missing cell {nj}"))
            })?;
            let face = face_of(s, fi);
            if !face.iter().all(|v| other.contains(v)) || other.contains(&s[fi]) {
                return Err(LineError::InvalidTopology(format!(
                    "neighbour {fi} of cell {ci} does not share the opposite face"
                )));
            }
            if !adjacency[nj].contains(&Some(ci)) {
                return Err(LineError::InvalidTopology(format!(
                    "adjacency between cells {ci} and {nj} is not symmetric"
                )));
            }
        }
    }
    Ok(())
}

/// Sorted, de-duplicated neighbour lists built from simplex edges.
pub(crate) fn vertex_neighbours(num_vertices: usize, simplices: &[[usize; 4]]) -> Vec<Vec<usize>> {
    let mut neigh: Vec<Vec<usize>> = vec![Vec::new(); num_vertices];
    for s in simplices {
        for i in 0..4 {
            for j in 0..4 {
                if i != j {
                    neigh[s[i]].push(s[j]);
                }
            }
        }
    }
    for list in &mut neigh {
        list.sort_unstable();
        list.dedup();
    }
    neigh
}

/// Flags every vertex lying on an external face.
pub(crate) fn hull_vertices(
    num_vertices: usize,
    simplices: &[[usize; 4]],
    adjacency: &[[Option<usize>; 4]],
) -> Vec<bool> {
    let mut on_hull = vec![false; num_vertices];
    for (s, neigh) in simplices.iter().zip(adjacency) {
        for (fi, n) in neigh.iter().enumerate() {
            if n.is_none() {
                for v in face_of(s, fi) {
                    on_hull[v] = true;
                }
            }
        }
    }
    on_hull
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two tetrahedra glued along face {1, 2, 3}.
    fn two_tets() -> Vec<[usize; 4]> {
        vec![[0, 1, 2, 3], [4, 1, 2, 3]]
    }

    #[test]
    fn test_face_of() {
        assert_eq!(face_of(&[5, 6, 7, 8], 0), [6, 7, 8]);
        assert_eq!(face_of(&[5, 6, 7, 8], 2), [5, 6, 8]);
    }

    #[test]
    fn test_cell_adjacency() {
        let adj = cell_adjacency(&two_tets()).unwrap();
        assert_eq!(adj[0], [Some(1), None, None, None]);
        assert_eq!(adj[1], [Some(0), None, None, None]);
        assert!(validate_adjacency(&two_tets(), &adj).is_ok());
    }

    #[test]
    fn test_overshared_face() {
        let simplices = vec![[0, 1, 2, 3], [4, 1, 2, 3], [5, 1, 2, 3]];
        assert!(matches!(
            cell_adjacency(&simplices),
            Err(LineError::InvalidTopology(_))
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_face() {
        let adj = vec![[None, Some(1), None, None], [Some(0), None, None, None]];
        assert!(validate_adjacency(&two_tets(), &adj).is_err());
    }

    #[test]
    fn test_neighbours_and_hull() {
        let simplices = two_tets();
        let adj = cell_adjacency(&simplices).unwrap();
        let neigh = vertex_neighbours(5, &simplices);
        assert_eq!(neigh[0], vec![1, 2, 3]);
        assert_eq!(neigh[1], vec![0, 2, 3, 4]);
        // Every vertex of two glued tets lies on the hull.
        assert!(hull_vertices(5, &simplices, &adj).iter().all(|&h| h));
    }
}
