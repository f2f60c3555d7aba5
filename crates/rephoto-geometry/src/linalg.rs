//! Small fixed-size linear algebra helpers shared by the solvers.

use crate::correspondence::Point2;

/// A row-major 3x3 matrix.
pub type Mat33 = [[f64; 3]; 3];

/// The 3x3 identity matrix.
pub const IDENTITY33: Mat33 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

#[rustfmt::skip]
pub(crate) fn det_mat33(m: &Mat33) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]) -
    m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0]) +
    m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

#[rustfmt::skip]
fn adjugate_mat33(m: &Mat33) -> Mat33 {
    [
        [
            m[1][1] * m[2][2] - m[1][2] * m[2][1],
            m[0][2] * m[2][1] - m[0][1] * m[2][2],
            m[0][1] * m[1][2] - m[0][2] * m[1][1],
        ],
        [
            m[1][2] * m[2][0] - m[1][0] * m[2][2],
            m[0][0] * m[2][2] - m[0][2] * m[2][0],
            m[0][2] * m[1][0] - m[0][0] * m[1][2],
        ],
        [
            m[1][0] * m[2][1] - m[1][1] * m[2][0],
            m[0][1] * m[2][0] - m[0][0] * m[2][1],
            m[0][0] * m[1][1] - m[0][1] * m[1][0],
        ],
    ]
}

/// Invert a 3x3 matrix through its adjugate.
///
/// Returns `None` when the determinant is zero relative to the matrix magnitude.
pub(crate) fn inverse_mat33(m: &Mat33) -> Option<Mat33> {
    let det = det_mat33(m);
    let scale = frobenius_norm(m).powi(3);
    if !det.is_finite() || scale == 0.0 || det.abs() <= 1e-12 * scale {
        return None;
    }

    let adj = adjugate_mat33(m);
    let inv_det = 1.0 / det;

    let mut inv = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            inv[i][j] = adj[i][j] * inv_det;
        }
    }
    Some(inv)
}

pub(crate) fn mul_mat33(a: &Mat33, b: &Mat33) -> Mat33 {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

pub(crate) fn frobenius_norm(m: &Mat33) -> f64 {
    m.iter().flatten().map(|v| v * v).sum::<f64>().sqrt()
}

/// Scale a homogeneous matrix so that `m[2][2] == 1`, or to unit norm when that entry vanishes.
pub(crate) fn normalize_mat33_inplace(m: &mut Mat33) {
    let norm = frobenius_norm(m);
    let scale = if m[2][2].abs() > 1e-12 * norm {
        m[2][2]
    } else {
        norm
    };
    if scale == 0.0 {
        return;
    }
    m.iter_mut().flatten().for_each(|v| *v /= scale);
}

/// Apply a homogeneous 3x3 matrix to a 2d point.
///
/// Points mapped to the line at infinity produce non-finite coordinates.
#[inline]
pub fn transform_point(m: &Mat33, p: &Point2) -> Point2 {
    let w = m[2][0] * p[0] + m[2][1] * p[1] + m[2][2];
    let x = (m[0][0] * p[0] + m[0][1] * p[1] + m[0][2]) / w;
    let y = (m[1][0] * p[0] + m[1][1] * p[1] + m[1][2]) / w;
    [x, y]
}

/// Isotropic similarity normalization of a point set.
///
/// Translates the centroid to the origin and scales so that the mean distance to it is
/// `sqrt(2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Normalization {
    pub mean: Point2,
    pub scale: f64,
}

impl Normalization {
    pub fn from_points<'a>(points: impl Iterator<Item = &'a Point2> + Clone) -> Self {
        let (mut mx, mut my, mut n) = (0.0, 0.0, 0usize);
        for p in points.clone() {
            mx += p[0];
            my += p[1];
            n += 1;
        }
        if n == 0 {
            return Self {
                mean: [0.0, 0.0],
                scale: 1.0,
            };
        }
        mx /= n as f64;
        my /= n as f64;

        let mean_dist = points
            .map(|p| ((p[0] - mx).powi(2) + (p[1] - my).powi(2)).sqrt())
            .sum::<f64>()
            / n as f64;
        let scale = if mean_dist > 0.0 {
            std::f64::consts::SQRT_2 / mean_dist
        } else {
            1.0
        };

        Self {
            mean: [mx, my],
            scale,
        }
    }

    #[inline]
    pub fn apply(&self, p: &Point2) -> Point2 {
        [
            (p[0] - self.mean[0]) * self.scale,
            (p[1] - self.mean[1]) * self.scale,
        ]
    }

    /// Similarity matrix `T = [[s,0,-s*mx],[0,s,-s*my],[0,0,1]]`.
    pub fn matrix(&self) -> Mat33 {
        let s = self.scale;
        [
            [s, 0.0, -s * self.mean[0]],
            [0.0, s, -s * self.mean[1]],
            [0.0, 0.0, 1.0],
        ]
    }

    pub fn inverse_matrix(&self) -> Mat33 {
        let s = 1.0 / self.scale;
        [
            [s, 0.0, self.mean[0]],
            [0.0, s, self.mean[1]],
            [0.0, 0.0, 1.0],
        ]
    }
}

/// Relative tolerance on the sine of the angle spanned by three points.
pub(crate) const COLLINEAR_EPS: f64 = 1e-6;

/// Whether three points lie on a common line, up to [`COLLINEAR_EPS`].
pub(crate) fn are_collinear(p0: &Point2, p1: &Point2, p2: &Point2) -> bool {
    let (ux, uy) = (p1[0] - p0[0], p1[1] - p0[1]);
    let (vx, vy) = (p2[0] - p0[0], p2[1] - p0[1]);
    let cross = ux * vy - uy * vx;
    let nu = (ux * ux + uy * uy).sqrt();
    let nv = (vx * vx + vy * vy).sqrt();
    // coincident points count as collinear
    cross.abs() <= COLLINEAR_EPS * nu * nv
}

/// Whether all the points lie on a single line (or coincide).
///
/// Uses the eigenvalues of the 2x2 scatter matrix: the set is collinear when the smaller one
/// vanishes relative to the larger.
pub(crate) fn all_collinear<'a>(points: impl Iterator<Item = &'a Point2> + Clone) -> bool {
    let norm = Normalization::from_points(points.clone());
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let [x, y] = norm.apply(p);
        sxx += x * x;
        sxy += x * y;
        syy += y * y;
    }
    let trace = sxx + syy;
    if trace <= 0.0 {
        return true;
    }
    let det = sxx * syy - sxy * sxy;
    let disc = (trace * trace / 4.0 - det).max(0.0).sqrt();
    let lambda_min = trace / 2.0 - disc;
    let lambda_max = trace / 2.0 + disc;
    lambda_min <= COLLINEAR_EPS * COLLINEAR_EPS * lambda_max
}

/// Whether some four of the points have no three on a common line.
///
/// Coincident points count once. For distinct points this fails exactly when all of them but
/// at most one lie on a single line.
pub(crate) fn has_general_quad(points: &[Point2]) -> bool {
    let (mut min, mut max) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
    for p in points {
        for d in 0..2 {
            min[d] = min[d].min(p[d]);
            max[d] = max[d].max(p[d]);
        }
    }
    let extent = (max[0] - min[0]).max(max[1] - min[1]);
    if extent.is_nan() || extent <= 0.0 {
        return false;
    }
    let tol = COLLINEAR_EPS * extent;

    let mut distinct: Vec<&Point2> = Vec::with_capacity(points.len());
    for p in points {
        let seen = distinct
            .iter()
            .any(|q| (p[0] - q[0]).abs() <= tol && (p[1] - q[1]).abs() <= tol);
        if !seen {
            distinct.push(p);
        }
    }
    let n = distinct.len();
    if n < 4 {
        return false;
    }

    for i in 0..n {
        for j in i + 1..n {
            let on_line = distinct
                .iter()
                .filter(|k| are_collinear(distinct[i], distinct[j], k))
                .count();
            if n - on_line <= 1 {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inverse_of_translation() {
        let m = [[1.0, 0.0, -1.0], [0.0, 1.0, 1.0], [0.0, 0.0, 1.0]];
        let expected = [[1.0, 0.0, 1.0], [0.0, 1.0, -1.0], [0.0, 0.0, 1.0]];
        assert_eq!(inverse_mat33(&m), Some(expected));
    }

    #[test]
    fn inverse_of_singular_is_none() {
        let m = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]];
        assert_eq!(inverse_mat33(&m), None);
    }

    #[test]
    fn transform_point_translation() {
        let m = [[1.0, 0.0, -1.0], [0.0, 1.0, 1.0], [0.0, 0.0, 1.0]];
        assert_eq!(transform_point(&m, &[1.0, 1.0]), [0.0, 2.0]);
    }

    #[test]
    fn normalization_matrices_are_inverse() {
        let points = [[3.0, 4.0], [10.0, -2.0], [7.0, 7.0]];
        let norm = Normalization::from_points(points.iter());
        let prod = mul_mat33(&norm.inverse_matrix(), &norm.matrix());
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(prod[i][j], IDENTITY33[i][j], epsilon = 1e-12);
            }
        }
        let mapped = norm.apply(&points[1]);
        let via_matrix = transform_point(&norm.matrix(), &points[1]);
        assert_relative_eq!(mapped[0], via_matrix[0], epsilon = 1e-12);
        assert_relative_eq!(mapped[1], via_matrix[1], epsilon = 1e-12);
    }

    #[test]
    fn collinearity() {
        assert!(are_collinear(&[0.0, 0.0], &[1.0, 1.0], &[5.0, 5.0]));
        assert!(are_collinear(&[0.0, 0.0], &[0.0, 0.0], &[5.0, 1.0]));
        assert!(!are_collinear(&[0.0, 0.0], &[1.0, 0.0], &[0.0, 1.0]));

        let line = [[0.0, 1.0], [2.0, 3.0], [4.0, 5.0], [100.0, 101.0]];
        assert!(all_collinear(line.iter()));
        let spread = [[0.0, 1.0], [2.0, 3.0], [4.0, 5.0], [100.0, 0.0]];
        assert!(!all_collinear(spread.iter()));
    }

    #[test]
    fn general_quad_needs_two_points_off_every_line() {
        let square = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!(has_general_quad(&square));

        let line_and_one = [[0.0, 0.0], [10.0, 0.0], [20.0, 0.0], [30.0, 0.0], [0.0, 10.0]];
        assert!(!has_general_quad(&line_and_one));

        let two_lines = [[1.0, 0.0], [2.0, 0.0], [0.0, 1.0], [0.0, 2.0], [0.0, 0.0]];
        assert!(has_general_quad(&two_lines));

        // a duplicated outlier is still a single point
        let duplicated = [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [5.0, 5.0], [5.0, 5.0]];
        assert!(!has_general_quad(&duplicated));
        assert!(!has_general_quad(&[[3.0, 3.0]; 4]));
    }
}
