use thiserror::Error;

/// Why a rate-matrix solve at one vertex was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Instability {
    /// The LU factorisation hit a zero pivot.
    #[error("singular rate matrix")]
    Singular,
    /// Pivot ratio exceeded the condition-number guard.
    #[error("ill-conditioned rate matrix")]
    IllConditioned,
    /// At least one level population came out negative.
    #[error("negative level population")]
    NegativePopulation,
    /// The solution contained NaN or infinity.
    #[error("non-finite level population")]
    NonFinite,
}

#[derive(Debug, Error)]
pub enum LineError {
    #[error("not enough points for a triangulation: found {found}, need at least {required}")]
    InsufficientPoints { found: usize, required: usize },

    #[error("cell {cell} is degenerate (volume {volume:e})")]
    DegenerateCell { cell: usize, volume: f64 },

    #[error("degenerate point set: {0}")]
    DegenerateGeometry(String),

    #[error("invalid mesh topology: {0}")]
    InvalidTopology(String),

    #[error("vertex {vertex}, species {species}: {kind}")]
    NumericalInstability {
        vertex: usize,
        species: usize,
        kind: Instability,
    },

    #[error("no convergence after {iterations} iterations ({percent:.1}% of points stable)")]
    ConvergenceFailure { iterations: usize, percent: f64 },

    #[error("sight-line could not be followed: {0}")]
    RayTraceDegenerate(String),

    #[error("no sight-line of image {image} entered the mesh")]
    NoCellsEntered { image: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl LineError {
    /// Fatal errors abort the run; the rest are resolved at vertex or ray scope.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InsufficientPoints { .. }
            | Self::DegenerateCell { .. }
            | Self::DegenerateGeometry(_)
            | Self::InvalidTopology(_)
            | Self::NoCellsEntered { .. }
            | Self::InvalidInput(_) => true,
            Self::NumericalInstability { .. }
            | Self::ConvergenceFailure { .. }
            | Self::RayTraceDegenerate(_) => false,
        }
    }
}
