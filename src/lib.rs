pub mod geom;
pub mod io;
pub mod model;
pub mod sim;
mod error;

// Prelude
pub use error::{Instability, LineError};
pub use geom::mesh::{Cell, Mesh, MeshVertex};
pub use geom::point::Point;
pub use geom::vector::Vector;
pub use model::{PhysicalModel, UniformModel};
pub use sim::grid::{Grid, GridConfig};
pub use sim::molecule::{CollisionPartner, MolData};
pub use sim::nlte::{ConvergenceDriver, ConvergenceState, NlteConfig};
pub use sim::raytrace::{BrightnessUnit, Image, ImageConfig, ImageKind, RayTracer};
