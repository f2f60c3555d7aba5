use serde::{Deserialize, Serialize};

use crate::{
    correspondence::{Point2, PointPair},
    error::SolverError,
    homography::{Homography, DEFAULT_CONDITION_LIMIT, HOMOGRAPHY_MIN_PAIRS},
    ransac::{fit_homography_ransac, RansacConfig},
    tps::{TpsTransform, TPS_MIN_PAIRS},
};

/// The transform family to fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformKind {
    /// Planar projective transform, 4+ point pairs.
    #[default]
    Homography,
    /// Thin plate spline, 3+ non-collinear point pairs.
    ThinPlateSpline,
}

impl TransformKind {
    /// Minimum number of point pairs the family needs.
    pub fn min_pairs(&self) -> usize {
        match self {
            TransformKind::Homography => HOMOGRAPHY_MIN_PAIRS,
            TransformKind::ThinPlateSpline => TPS_MIN_PAIRS,
        }
    }
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransformKind::Homography => write!(f, "homography"),
            TransformKind::ThinPlateSpline => write!(f, "thin plate spline"),
        }
    }
}

/// Numerical settings of the solvers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SolverConfig {
    /// Largest accepted condition number of the normalized homography design matrix.
    pub homography_condition_limit: f64,
    /// Kernel regularization of the thin plate spline; zero interpolates exactly.
    pub tps_smoothing: f64,
    /// Fit the homography by random sample consensus instead of least squares over every
    /// pair, discarding pairs farther than the threshold.
    pub homography_ransac: Option<RansacConfig>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            homography_condition_limit: DEFAULT_CONDITION_LIMIT,
            tps_smoothing: 0.0,
            homography_ransac: None,
        }
    }
}

/// A fitted B -> A transform, with a way back for resampling.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    /// A fitted homography.
    Homography(Homography),
    /// A pair of fitted thin plate splines.
    ThinPlateSpline(TpsTransform),
}

impl Transform {
    /// The identity homography.
    pub fn identity() -> Self {
        Transform::Homography(Homography::identity())
    }

    /// The family of this transform.
    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Homography(_) => TransformKind::Homography,
            Transform::ThinPlateSpline(_) => TransformKind::ThinPlateSpline,
        }
    }

    /// Map a point from image B to image A.
    #[inline]
    pub fn apply(&self, p: &Point2) -> Point2 {
        match self {
            Transform::Homography(h) => h.apply(p),
            Transform::ThinPlateSpline(t) => t.apply(p),
        }
    }

    /// Map a point from image A to image B.
    #[inline]
    pub fn apply_inverse(&self, p: &Point2) -> Point2 {
        match self {
            Transform::Homography(h) => h.apply_inverse(p),
            Transform::ThinPlateSpline(t) => t.apply_inverse(p),
        }
    }

    /// Map a batch of image A points to image B.
    ///
    /// PRECONDITION: `out` has the same length as `points`.
    pub fn apply_inverse_batch(&self, points: &[Point2], out: &mut [Point2]) {
        debug_assert_eq!(points.len(), out.len());
        match self {
            Transform::Homography(h) => points
                .iter()
                .zip(out.iter_mut())
                .for_each(|(p, o)| *o = h.apply_inverse(p)),
            Transform::ThinPlateSpline(t) => t.inverse().apply_batch(points, out),
        }
    }

    /// Largest distance between the forward mapping of `b` and `a` over the pairs.
    pub fn max_residual(&self, pairs: &[PointPair]) -> f64 {
        pairs
            .iter()
            .map(|pair| {
                let p = self.apply(&pair.b);
                ((p[0] - pair.a[0]).powi(2) + (p[1] - pair.a[1]).powi(2)).sqrt()
            })
            .fold(0.0, f64::max)
    }
}

/// Fit a transform of the requested family to B -> A point pairs.
///
/// # Arguments
///
/// * `pairs` - The flattened correspondences, in store order.
/// * `kind` - The transform family.
/// * `config` - Solver tolerances.
///
/// # Errors
///
/// The solver errors of the chosen family, see [`Homography::fit`],
/// [`fit_homography_ransac`] and [`crate::tps::ThinPlateSpline::fit`].
pub fn compute_transform(
    pairs: &[PointPair],
    kind: TransformKind,
    config: &SolverConfig,
) -> Result<Transform, SolverError> {
    let transform = match (kind, &config.homography_ransac) {
        (TransformKind::Homography, None) => {
            Transform::Homography(Homography::fit(pairs, config.homography_condition_limit)?)
        }
        (TransformKind::Homography, Some(ransac)) => {
            let fit = fit_homography_ransac(pairs, config.homography_condition_limit, ransac)?;
            log::info!(
                "ransac kept {} of {} point pairs",
                fit.inliers.len(),
                pairs.len()
            );
            Transform::Homography(fit.homography)
        }
        (TransformKind::ThinPlateSpline, _) => {
            Transform::ThinPlateSpline(TpsTransform::fit(pairs, config.tps_smoothing)?)
        }
    };
    log::info!("{} computed from {} point pairs", kind, pairs.len());
    Ok(transform)
}

/// Per-pixel source coordinates of a destination grid.
///
/// `map_x[y * width + x]`, `map_y[y * width + x]` hold the image B coordinate sampled for
/// output pixel `(x, y)`.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateField {
    width: usize,
    height: usize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl CoordinateField {
    /// Evaluate the inverse mapping at every pixel center of a `width` x `height` grid.
    pub fn from_transform(transform: &Transform, width: usize, height: usize) -> Self {
        let mut map_x = Vec::with_capacity(width * height);
        let mut map_y = Vec::with_capacity(width * height);
        let mut row = vec![[0.0; 2]; width];
        let mut mapped = vec![[0.0; 2]; width];
        for y in 0..height {
            for (x, p) in row.iter_mut().enumerate() {
                *p = [x as f64, y as f64];
            }
            transform.apply_inverse_batch(&row, &mut mapped);
            for p in &mapped {
                map_x.push(p[0] as f32);
                map_y.push(p[1] as f32);
            }
        }
        Self {
            width,
            height,
            map_x,
            map_y,
        }
    }

    /// Grid width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Source x coordinates, row-major.
    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    /// Source y coordinates, row-major.
    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }
}
