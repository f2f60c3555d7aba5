use crate::{
    correspondence::{Point2, PointPair},
    error::SolverError,
    linalg::{self, Mat33, Normalization},
};

/// Minimum number of point pairs that determine a homography.
pub const HOMOGRAPHY_MIN_PAIRS: usize = 4;

/// Default limit on the ratio between the largest and the 8th singular value of the
/// normalized design matrix.
pub const DEFAULT_CONDITION_LIMIT: f64 = 1e10;

/// A planar projective transform mapping image B coordinates to image A coordinates.
///
/// The inverse matrix is computed once at construction so resampling never re-derives it.
#[derive(Clone, Debug, PartialEq)]
pub struct Homography {
    matrix: Mat33,
    inverse: Mat33,
}

impl Homography {
    /// Build a homography from a B -> A matrix.
    ///
    /// Fails with [`SolverError::SingularSystem`] when the matrix is not invertible.
    pub fn from_matrix(matrix: Mat33) -> Result<Self, SolverError> {
        if matrix.iter().flatten().any(|v| !v.is_finite()) {
            return Err(SolverError::SingularSystem(
                "homography has non-finite entries".to_string(),
            ));
        }
        let mut matrix = matrix;
        linalg::normalize_mat33_inplace(&mut matrix);
        let mut inverse = linalg::inverse_mat33(&matrix).ok_or_else(|| {
            SolverError::SingularSystem("homography matrix is not invertible".to_string())
        })?;
        linalg::normalize_mat33_inplace(&mut inverse);
        Ok(Self { matrix, inverse })
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: linalg::IDENTITY33,
            inverse: linalg::IDENTITY33,
        }
    }

    /// Fit a homography from B -> A point pairs with the normalized direct linear transform.
    ///
    /// With exactly 4 pairs the null vector of the 8x9 design matrix is the exact solution;
    /// with more pairs the smallest right singular vector is the algebraic least squares fit.
    ///
    /// # Errors
    ///
    /// * [`SolverError::InsufficientCorrespondences`] with fewer than 4 pairs.
    /// * [`SolverError::DegenerateGeometry`] when no four points on either side are free of
    ///   three collinear ones, i.e. all points but at most one share a line.
    /// * [`SolverError::SingularSystem`] when the design matrix condition exceeds
    ///   `condition_limit`.
    pub fn fit(pairs: &[PointPair], condition_limit: f64) -> Result<Self, SolverError> {
        if pairs.len() < HOMOGRAPHY_MIN_PAIRS {
            return Err(SolverError::InsufficientCorrespondences {
                required: HOMOGRAPHY_MIN_PAIRS,
                found: pairs.len(),
            });
        }
        if pairs.iter().any(|p| !(p.a.iter().chain(&p.b)).all(|v| v.is_finite())) {
            return Err(SolverError::DegenerateGeometry(
                "point pairs contain non-finite coordinates".to_string(),
            ));
        }
        check_general_position(pairs)?;

        let norm_b = Normalization::from_points(pairs.iter().map(|p| &p.b));
        let norm_a = Normalization::from_points(pairs.iter().map(|p| &p.a));

        // construct the design matrix A, one pair of rows per correspondence
        let n = pairs.len();
        let mut mat_a = faer::Mat::<f64>::zeros(2 * n, 9);
        for (i, pair) in pairs.iter().enumerate() {
            let [xb, yb] = norm_b.apply(&pair.b);
            let [xa, ya] = norm_a.apply(&pair.a);

            mat_a.write(2 * i, 0, xb);
            mat_a.write(2 * i, 1, yb);
            mat_a.write(2 * i, 2, 1.0);
            mat_a.write(2 * i, 6, -xa * xb);
            mat_a.write(2 * i, 7, -xa * yb);
            mat_a.write(2 * i, 8, -xa);

            mat_a.write(2 * i + 1, 3, xb);
            mat_a.write(2 * i + 1, 4, yb);
            mat_a.write(2 * i + 1, 5, 1.0);
            mat_a.write(2 * i + 1, 6, -ya * xb);
            mat_a.write(2 * i + 1, 7, -ya * yb);
            mat_a.write(2 * i + 1, 8, -ya);
        }

        // the solution is the right singular vector of the smallest singular value
        let svd = mat_a.svd();
        let s = svd.s_diagonal();
        let (s_max, s_8th) = (s.read(0), s.read(7));
        let condition = if s_8th > 0.0 {
            s_max / s_8th
        } else {
            f64::INFINITY
        };
        if !condition.is_finite() || condition > condition_limit {
            return Err(SolverError::SingularSystem(format!(
                "homography design matrix condition {condition:.3e} exceeds {condition_limit:.3e}"
            )));
        }

        let h = svd.v().col(8);
        let h_norm = [
            [h.read(0), h.read(1), h.read(2)],
            [h.read(3), h.read(4), h.read(5)],
            [h.read(6), h.read(7), h.read(8)],
        ];

        // denormalize: H = Ta^-1 * Hn * Tb
        let matrix = linalg::mul_mat33(
            &linalg::mul_mat33(&norm_a.inverse_matrix(), &h_norm),
            &norm_b.matrix(),
        );
        let homography = Self::from_matrix(matrix)?;

        log::debug!(
            "homography fitted from {} pairs, condition {:.3e}, max residual {:.3e}",
            n,
            condition,
            homography.max_residual(pairs)
        );

        Ok(homography)
    }

    /// The B -> A matrix, normalized so that `m[2][2] == 1` when possible.
    pub fn matrix(&self) -> &Mat33 {
        &self.matrix
    }

    /// The A -> B matrix used for resampling.
    pub fn inverse_matrix(&self) -> &Mat33 {
        &self.inverse
    }

    /// Map a point from image B to image A.
    #[inline]
    pub fn apply(&self, p: &Point2) -> Point2 {
        linalg::transform_point(&self.matrix, p)
    }

    /// Map a point from image A to image B.
    #[inline]
    pub fn apply_inverse(&self, p: &Point2) -> Point2 {
        linalg::transform_point(&self.inverse, p)
    }

    /// Largest Euclidean distance between `apply(b)` and `a` over the pairs.
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

fn check_general_position(pairs: &[PointPair]) -> Result<(), SolverError> {
    for (name, side) in [("A", true), ("B", false)] {
        let pts: Vec<Point2> = pairs
            .iter()
            .map(|p| if side { p.a } else { p.b })
            .collect();
        if !linalg::has_general_quad(&pts) {
            return Err(SolverError::DegenerateGeometry(format!(
                "all but at most one point in image {name} lie on a common line"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn pairs_from(a: &[Point2], b: &[Point2]) -> Vec<PointPair> {
        a.iter()
            .zip(b)
            .map(|(&a, &b)| PointPair { a, b })
            .collect()
    }

    #[test]
    fn fit_identity() -> Result<(), SolverError> {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let homo = Homography::fit(&pairs_from(&pts, &pts), DEFAULT_CONDITION_LIMIT)?;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(
                    homo.matrix()[i][j],
                    linalg::IDENTITY33[i][j],
                    epsilon = 1e-9
                );
            }
        }
        Ok(())
    }

    #[test]
    fn fit_translation() -> Result<(), SolverError> {
        let b = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let expected = [[1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 0.0, 1.0]];
        let a: Vec<Point2> = b
            .iter()
            .map(|p| linalg::transform_point(&expected, p))
            .collect();
        let homo = Homography::fit(&pairs_from(&a, &b), DEFAULT_CONDITION_LIMIT)?;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(homo.matrix()[i][j], expected[i][j], epsilon = 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn fit_perspective_quad_is_exact() -> Result<(), SolverError> {
        let a = [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]];
        let b = [[10.0, 5.0], [120.0, 0.0], [115.0, 110.0], [5.0, 95.0]];
        let pairs = pairs_from(&a, &b);
        let homo = Homography::fit(&pairs, DEFAULT_CONDITION_LIMIT)?;

        for pair in &pairs {
            let p = homo.apply(&pair.b);
            assert_relative_eq!(p[0], pair.a[0], epsilon = 1e-6);
            assert_relative_eq!(p[1], pair.a[1], epsilon = 1e-6);
            let q = homo.apply_inverse(&pair.a);
            assert_relative_eq!(q[0], pair.b[0], epsilon = 1e-6);
            assert_relative_eq!(q[1], pair.b[1], epsilon = 1e-6);
        }
        assert!(homo.max_residual(&pairs) < 1e-6);
        Ok(())
    }

    #[test]
    fn fit_overdetermined_recovers_random_homography() -> Result<(), SolverError> {
        let mut rng = rand::rng();
        for _ in 0..10 {
            let truth = [
                [
                    rng.random_range(0.8..1.2),
                    rng.random_range(-0.2..0.2),
                    rng.random_range(-20.0..20.0),
                ],
                [
                    rng.random_range(-0.2..0.2),
                    rng.random_range(0.8..1.2),
                    rng.random_range(-20.0..20.0),
                ],
                [
                    rng.random_range(-1e-4..1e-4),
                    rng.random_range(-1e-4..1e-4),
                    1.0,
                ],
            ];
            let b = [
                [0.0, 0.0],
                [640.0, 0.0],
                [640.0, 480.0],
                [0.0, 480.0],
                [320.0, 240.0],
                [100.0, 400.0],
                [500.0, 60.0],
            ];
            let a: Vec<Point2> = b
                .iter()
                .map(|p| linalg::transform_point(&truth, p))
                .collect();
            let pairs = pairs_from(&a, &b);
            let homo = Homography::fit(&pairs, DEFAULT_CONDITION_LIMIT)?;
            assert!(homo.max_residual(&pairs) < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn fit_requires_four_pairs() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let res = Homography::fit(&pairs_from(&pts, &pts), DEFAULT_CONDITION_LIMIT);
        assert_eq!(
            res,
            Err(SolverError::InsufficientCorrespondences {
                required: 4,
                found: 3
            })
        );
    }

    #[test]
    fn fit_rejects_collinear_points() {
        let line = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let res = Homography::fit(&pairs_from(&line, &line), DEFAULT_CONDITION_LIMIT);
        assert!(matches!(res, Err(SolverError::DegenerateGeometry(_))));

        let a = [[0.0, 0.0], [10.0, 0.0], [20.0, 0.0], [0.0, 10.0]];
        let b = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let res = Homography::fit(&pairs_from(&a, &b), DEFAULT_CONDITION_LIMIT);
        assert!(matches!(res, Err(SolverError::DegenerateGeometry(_))));
    }

    #[test]
    fn fit_rejects_underdetermined_configuration() {
        // four collinear points plus one outlier cannot determine a homography
        let a = [
            [0.0, 0.0],
            [10.0, 0.0],
            [20.0, 0.0],
            [30.0, 0.0],
            [0.0, 10.0],
        ];
        let res = Homography::fit(&pairs_from(&a, &a), DEFAULT_CONDITION_LIMIT);
        assert!(matches!(res, Err(SolverError::DegenerateGeometry(_))));

        // same on side B only
        let b = [
            [0.0, 0.0],
            [10.0, 0.0],
            [10.0, 10.0],
            [0.0, 10.0],
            [5.0, 5.0],
        ];
        let res = Homography::fit(&pairs_from(&b, &a), DEFAULT_CONDITION_LIMIT);
        assert!(matches!(res, Err(SolverError::DegenerateGeometry(_))));
    }

    #[test]
    fn from_matrix_rejects_singular() {
        let m = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]];
        assert!(matches!(
            Homography::from_matrix(m),
            Err(SolverError::SingularSystem(_))
        ));
    }
}
