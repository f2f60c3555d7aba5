use rephoto_geometry::{SolverError, StoreError};
use rephoto_image::ImageError;
use rephoto_io::IoError;

use crate::project::ProjectError;

/// Errors of the alignment pipeline.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A correspondence edit was rejected.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transform could not be fitted.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Image buffers do not fit together.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// An image could not be read or written.
    #[error(transparent)]
    Io(#[from] IoError),

    /// A project file could not be read or written.
    #[error(transparent)]
    Project(#[from] ProjectError),

    /// The compute worker is unavailable or did not answer in time.
    #[error("Compute worker error: {0}")]
    Worker(String),
}
