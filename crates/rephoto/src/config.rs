use serde::{Deserialize, Serialize};

use rephoto_geometry::{SolverConfig, TransformKind};
use rephoto_imgproc::{composite::CompositeMode, warp::WarpConfig};

/// Settings of an alignment session.
///
/// Every field has a default, so a partial JSON object is a valid configuration.
///
/// ```
/// use rephoto::SessionConfig;
///
/// let config: SessionConfig =
///     serde_json::from_str(r#"{"transformKind": "thinPlateSpline"}"#).unwrap();
/// assert_eq!(config.solver, Default::default());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Transform family fitted to the correspondences.
    pub transform_kind: TransformKind,
    /// Solver tolerances.
    pub solver: SolverConfig,
    /// Resampling settings.
    pub warp: WarpConfig,
    /// Visualization of the reference and warped images.
    pub composite: CompositeMode,
}
