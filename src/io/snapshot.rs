//! Population snapshots for restarting a run.
//!
//! A snapshot maps vertex ids to level populations (fractions per species). The
//! file hooks store it as JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Populations of one vertex, one vector per species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexPopulations {
    pub id: usize,
    pub converged: bool,
    pub pops: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    /// Species names, in grid order.
    pub species: Vec<String>,
    pub vertices: Vec<VertexPopulations>,
}

/// Writes a snapshot to a JSON file.
///
/// # Example
/// ```no_run
/// use lines3d::io::write_snapshot;
/// # fn demo(grid: &lines3d::Grid) -> anyhow::Result<()> {
/// write_snapshot(std::path::Path::new("pops.json"), &grid.snapshot())?;
/// # Ok(())
/// # }
/// ```
pub fn write_snapshot(path: &Path, snapshot: &PopulationSnapshot) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    let writer = BufWriter::new(file);

    serde_json::to_writer(writer, snapshot)
        .with_context(|| format!("Failed to serialize populations to: {}", path.display()))?;

    Ok(())
}

/// Reads a snapshot written by [`write_snapshot`].
pub fn read_snapshot(path: &Path) -> Result<PopulationSnapshot> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let snapshot: PopulationSnapshot = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to deserialize populations from: {}", path.display()))?;

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> PopulationSnapshot {
        PopulationSnapshot {
            species: vec!["co".into(), "hco+".into()],
            vertices: vec![
                VertexPopulations {
                    id: 0,
                    converged: true,
                    pops: vec![vec![0.7, 0.3], vec![0.5, 0.25, 0.25]],
                },
                VertexPopulations {
                    id: 3,
                    converged: false,
                    pops: vec![vec![1., 0.], vec![0.1, 0.2, 0.7]],
                },
            ],
        }
    }

    #[test]
    fn test_write_and_read_snapshot() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("pops.json");

        let original = sample();
        write_snapshot(&path, &original)?;
        let loaded = read_snapshot(&path)?;

        assert_eq!(loaded, original);
        Ok(())
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let err = read_snapshot(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to open file"));
    }

    #[test]
    fn test_read_garbage() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"species\": 3}")?;
        assert!(read_snapshot(&path).is_err());
        Ok(())
    }
}
