pub mod blend;
pub mod constants;
pub mod dust;
pub mod fastexp;
pub mod grid;
pub mod molecule;
pub mod nlte;
pub mod population;
pub mod radiation;
pub mod raytrace;
