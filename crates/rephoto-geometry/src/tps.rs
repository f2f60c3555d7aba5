use faer::prelude::SpSolver;

use crate::{
    correspondence::{Point2, PointPair},
    error::SolverError,
    linalg::{self, Normalization},
};

/// Minimum number of non-collinear control points of a thin plate spline.
pub const TPS_MIN_PAIRS: usize = 3;

/// Control points closer than this, in normalized units, are treated as duplicates.
const DUPLICATE_EPS: f64 = 1e-8;

/// Relative residual above which the spline system is considered singular.
const RESIDUAL_TOLERANCE: f64 = 1e-6;

/// Radial basis `U(r) = r^2 log(r)`, written in terms of `r^2`.
#[inline]
fn radial_basis(r2: f64) -> f64 {
    if r2 <= 0.0 {
        0.0
    } else {
        0.5 * r2 * r2.ln()
    }
}

/// A 2d thin plate spline interpolating a set of control points.
///
/// The mapping is an affine part plus a weighted sum of radial terms centered at the control
/// points. Control points are normalized (centroid, isotropic scale) before the system is
/// built, which keeps the kernel well conditioned for multi-megapixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct ThinPlateSpline {
    normalization: Normalization,
    centers: Vec<Point2>,
    weights: Vec<[f64; 2]>,
    // rows: constant, x, y; columns: output x, output y
    affine: [[f64; 2]; 3],
}

impl ThinPlateSpline {
    /// Fit a spline mapping every `src[i]` to `dst[i]`.
    ///
    /// `smoothing` is added to the kernel diagonal; zero gives exact interpolation.
    ///
    /// # Errors
    ///
    /// * [`SolverError::InsufficientCorrespondences`] with fewer than 3 pairs or when every
    ///   source point lies on one line.
    /// * [`SolverError::SingularSystem`] for duplicated source points without smoothing, or
    ///   when the solve does not reproduce the system.
    pub fn fit(src: &[Point2], dst: &[Point2], smoothing: f64) -> Result<Self, SolverError> {
        if src.len() != dst.len() {
            return Err(SolverError::DegenerateGeometry(format!(
                "{} source points for {} target points",
                src.len(),
                dst.len()
            )));
        }
        let n = src.len();
        if n < TPS_MIN_PAIRS {
            return Err(SolverError::InsufficientCorrespondences {
                required: TPS_MIN_PAIRS,
                found: n,
            });
        }
        if src.iter().chain(dst).flatten().any(|v| !v.is_finite()) {
            return Err(SolverError::DegenerateGeometry(
                "control points contain non-finite coordinates".to_string(),
            ));
        }
        if !(smoothing >= 0.0 && smoothing.is_finite()) {
            return Err(SolverError::SingularSystem(format!(
                "smoothing must be a finite non-negative value, got {smoothing}"
            )));
        }

        let normalization = Normalization::from_points(src.iter());
        let centers: Vec<Point2> = src.iter().map(|p| normalization.apply(p)).collect();

        if linalg::all_collinear(centers.iter()) {
            let distinct = centers
                .iter()
                .any(|c| squared_distance(c, &centers[0]) > DUPLICATE_EPS * DUPLICATE_EPS);
            return Err(SolverError::InsufficientCorrespondences {
                required: TPS_MIN_PAIRS,
                found: if distinct { 2 } else { 1 },
            });
        }

        if smoothing == 0.0 {
            for i in 0..n {
                for j in (i + 1)..n {
                    if squared_distance(&centers[i], &centers[j]) < DUPLICATE_EPS * DUPLICATE_EPS {
                        return Err(SolverError::SingularSystem(format!(
                            "control points {i} and {j} coincide"
                        )));
                    }
                }
            }
        }

        // L = [[K + lambda*I, P], [P^T, 0]]
        let mut mat_l = faer::Mat::<f64>::zeros(n + 3, n + 3);
        let mut rhs = faer::Mat::<f64>::zeros(n + 3, 2);
        for i in 0..n {
            for j in 0..n {
                let mut k = radial_basis(squared_distance(&centers[i], &centers[j]));
                if i == j {
                    k += smoothing;
                }
                mat_l.write(i, j, k);
            }
            let [x, y] = centers[i];
            mat_l.write(i, n, 1.0);
            mat_l.write(i, n + 1, x);
            mat_l.write(i, n + 2, y);
            mat_l.write(n, i, 1.0);
            mat_l.write(n + 1, i, x);
            mat_l.write(n + 2, i, y);

            rhs.write(i, 0, dst[i][0]);
            rhs.write(i, 1, dst[i][1]);
        }

        // the kernel is shared by both output dimensions
        let solution = mat_l.partial_piv_lu().solve(rhs.as_ref());
        check_solution(&mat_l, &solution, &rhs)?;

        let weights = (0..n)
            .map(|i| [solution.read(i, 0), solution.read(i, 1)])
            .collect();
        let affine = [
            [solution.read(n, 0), solution.read(n, 1)],
            [solution.read(n + 1, 0), solution.read(n + 1, 1)],
            [solution.read(n + 2, 0), solution.read(n + 2, 1)],
        ];

        Ok(Self {
            normalization,
            centers,
            weights,
            affine,
        })
    }

    /// Number of control points.
    pub fn num_control_points(&self) -> usize {
        self.centers.len()
    }

    /// Evaluate the spline at `p`.
    #[inline]
    pub fn apply(&self, p: &Point2) -> Point2 {
        let q = self.normalization.apply(p);
        let mut out = [
            self.affine[0][0] + self.affine[1][0] * q[0] + self.affine[2][0] * q[1],
            self.affine[0][1] + self.affine[1][1] * q[0] + self.affine[2][1] * q[1],
        ];
        for (c, w) in self.centers.iter().zip(&self.weights) {
            let u = radial_basis(squared_distance(&q, c));
            out[0] += w[0] * u;
            out[1] += w[1] * u;
        }
        out
    }

    /// Evaluate the spline for a batch of points.
    ///
    /// PRECONDITION: `out` has the same length as `points`.
    pub fn apply_batch(&self, points: &[Point2], out: &mut [Point2]) {
        debug_assert_eq!(points.len(), out.len());
        points
            .iter()
            .zip(out.iter_mut())
            .for_each(|(p, o)| *o = self.apply(p));
    }
}

#[inline]
fn squared_distance(p: &Point2, q: &Point2) -> f64 {
    (p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)
}

fn check_solution(
    mat_l: &faer::Mat<f64>,
    solution: &faer::Mat<f64>,
    rhs: &faer::Mat<f64>,
) -> Result<(), SolverError> {
    let size = mat_l.nrows();
    let rhs_scale = (0..size)
        .flat_map(|i| [rhs.read(i, 0).abs(), rhs.read(i, 1).abs()])
        .fold(1.0, f64::max);

    for col in 0..2 {
        for i in 0..size {
            let lx: f64 = (0..size)
                .map(|j| mat_l.read(i, j) * solution.read(j, col))
                .sum();
            let residual = (lx - rhs.read(i, col)).abs();
            if !residual.is_finite() || residual > RESIDUAL_TOLERANCE * rhs_scale {
                return Err(SolverError::SingularSystem(format!(
                    "thin plate spline system is singular (residual {residual:.3e})"
                )));
            }
        }
    }
    Ok(())
}

/// Thin plate spline transform between image B and image A.
///
/// A spline has no closed-form inverse, so two splines are fitted from the same control
/// points: `forward` maps B -> A and `inverse` maps A -> B for resampling.
#[derive(Clone, Debug, PartialEq)]
pub struct TpsTransform {
    forward: ThinPlateSpline,
    inverse: ThinPlateSpline,
    smoothing: f64,
}

impl TpsTransform {
    /// Fit both directions from B -> A point pairs.
    pub fn fit(pairs: &[PointPair], smoothing: f64) -> Result<Self, SolverError> {
        let a: Vec<Point2> = pairs.iter().map(|p| p.a).collect();
        let b: Vec<Point2> = pairs.iter().map(|p| p.b).collect();

        let forward = ThinPlateSpline::fit(&b, &a, smoothing)?;
        let inverse = ThinPlateSpline::fit(&a, &b, smoothing)?;

        log::debug!(
            "thin plate spline fitted from {} pairs, smoothing {}",
            pairs.len(),
            smoothing
        );

        Ok(Self {
            forward,
            inverse,
            smoothing,
        })
    }

    /// Smoothing used for both splines.
    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// Map a point from image B to image A.
    #[inline]
    pub fn apply(&self, p: &Point2) -> Point2 {
        self.forward.apply(p)
    }

    /// Map a point from image A to image B.
    #[inline]
    pub fn apply_inverse(&self, p: &Point2) -> Point2 {
        self.inverse.apply(p)
    }

    /// The B -> A spline.
    pub fn forward(&self) -> &ThinPlateSpline {
        &self.forward
    }

    /// The A -> B spline.
    pub fn inverse(&self) -> &ThinPlateSpline {
        &self.inverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn control_points() -> (Vec<Point2>, Vec<Point2>) {
        let src = vec![
            [0.0, 0.0],
            [640.0, 0.0],
            [640.0, 480.0],
            [0.0, 480.0],
            [320.0, 240.0],
            [100.0, 350.0],
        ];
        let dst = vec![
            [12.0, 4.0],
            [630.0, -8.0],
            [655.0, 470.0],
            [-3.0, 490.0],
            [330.0, 250.0],
            [95.0, 360.0],
        ];
        (src, dst)
    }

    #[test]
    fn radial_basis_at_zero() {
        assert_eq!(radial_basis(0.0), 0.0);
        // U(r) = r^2 log r, r = e
        let e = std::f64::consts::E;
        assert_relative_eq!(radial_basis(e * e), e * e, epsilon = 1e-12);
    }

    #[test]
    fn interpolates_control_points() -> Result<(), SolverError> {
        let (src, dst) = control_points();
        let tps = ThinPlateSpline::fit(&src, &dst, 0.0)?;
        assert_eq!(tps.num_control_points(), 6);
        for (s, d) in src.iter().zip(&dst) {
            let p = tps.apply(s);
            assert_relative_eq!(p[0], d[0], epsilon = 1e-6);
            assert_relative_eq!(p[1], d[1], epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn reproduces_affine_maps() -> Result<(), SolverError> {
        let src = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [7.0, 3.0]];
        let affine = |p: &Point2| [2.0 * p[0] + 0.5 * p[1] + 3.0, -p[0] + p[1] - 1.0];
        let dst: Vec<Point2> = src.iter().map(affine).collect();
        let tps = ThinPlateSpline::fit(&src, &dst, 0.0)?;

        let query = [4.0, 8.0];
        let p = tps.apply(&query);
        let expected = affine(&query);
        assert_relative_eq!(p[0], expected[0], epsilon = 1e-9);
        assert_relative_eq!(p[1], expected[1], epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn smoothing_relaxes_interpolation() -> Result<(), SolverError> {
        let (src, dst) = control_points();
        let tps = ThinPlateSpline::fit(&src, &dst, 1.0)?;
        let max_err = src
            .iter()
            .zip(&dst)
            .map(|(s, d)| squared_distance(&tps.apply(s), d).sqrt())
            .fold(0.0, f64::max);
        assert!(max_err > 1e-6);
        Ok(())
    }

    #[test]
    fn too_few_points() {
        let src = [[0.0, 0.0], [1.0, 1.0]];
        assert_eq!(
            ThinPlateSpline::fit(&src, &src, 0.0),
            Err(SolverError::InsufficientCorrespondences {
                required: 3,
                found: 2
            })
        );
    }

    #[test]
    fn collinear_points_are_insufficient() {
        let src = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        assert!(matches!(
            ThinPlateSpline::fit(&src, &src, 0.0),
            Err(SolverError::InsufficientCorrespondences { .. })
        ));
    }

    #[test]
    fn duplicated_points_are_singular() {
        let src = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 0.0]];
        let dst = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [12.0, 1.0]];
        assert!(matches!(
            ThinPlateSpline::fit(&src, &dst, 0.0),
            Err(SolverError::SingularSystem(_))
        ));
    }

    #[test]
    fn transform_fits_both_directions() -> Result<(), SolverError> {
        let (b, a) = control_points();
        let pairs: Vec<PointPair> = a
            .iter()
            .zip(&b)
            .map(|(&a, &b)| PointPair { a, b })
            .collect();
        let tps = TpsTransform::fit(&pairs, 0.0)?;
        for pair in &pairs {
            let fwd = tps.apply(&pair.b);
            assert_relative_eq!(fwd[0], pair.a[0], epsilon = 1e-6);
            assert_relative_eq!(fwd[1], pair.a[1], epsilon = 1e-6);
            let inv = tps.apply_inverse(&pair.a);
            assert_relative_eq!(inv[0], pair.b[0], epsilon = 1e-6);
            assert_relative_eq!(inv[1], pair.b[1], epsilon = 1e-6);
        }
        Ok(())
    }
}
