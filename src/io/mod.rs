//! Restart hooks.

pub mod snapshot;

pub use snapshot::{PopulationSnapshot, VertexPopulations, read_snapshot, write_snapshot};
