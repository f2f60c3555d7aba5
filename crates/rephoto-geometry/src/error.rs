use crate::correspondence::CorrespondenceId;

/// Errors returned by the transform solvers.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Not enough point pairs for the requested transform family.
    #[error("Insufficient correspondences: {required} point pairs required, {found} available")]
    InsufficientCorrespondences {
        /// Minimum number of usable point pairs.
        required: usize,
        /// Number of usable point pairs supplied.
        found: usize,
    },

    /// The point configuration cannot determine the transform (e.g. collinear points).
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// The linear system is singular or too ill-conditioned to trust.
    #[error("Singular system: {0}")]
    SingularSystem(String),
}

/// Errors returned by the correspondence store.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No correspondence with the given id.
    #[error("Correspondence {0} not found")]
    NotFound(CorrespondenceId),

    /// A correspondence or an edit does not have the expected shape.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
}
