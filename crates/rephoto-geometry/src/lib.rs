#![deny(missing_docs)]
//! Correspondences between a historical and a modern image, and the transforms fitted to them.

/// Point, line and face correspondences.
pub mod correspondence;

/// Error types for the geometry module.
pub mod error;

/// Homography fitting with the normalized direct linear transform.
pub mod homography;

/// Small linear algebra helpers.
pub mod linalg;

/// Robust homography fitting by random sample consensus.
pub mod ransac;

/// Ordered, generation-tracked correspondence storage.
pub mod store;

/// Thin plate spline fitting and evaluation.
pub mod tps;

/// Transform families and the solver entry point.
pub mod transform;

pub use crate::correspondence::{
    Correspondence, CorrespondenceId, CorrespondenceKind, CorrespondenceType, Point2, PointPair,
    Side,
};
pub use crate::error::{SolverError, StoreError};
pub use crate::homography::Homography;
pub use crate::ransac::{fit_homography_ransac, RansacConfig, RansacHomography};
pub use crate::store::{CorrespondenceStore, StoreSnapshot};
pub use crate::tps::{ThinPlateSpline, TpsTransform};
pub use crate::transform::{
    compute_transform, CoordinateField, SolverConfig, Transform, TransformKind,
};
