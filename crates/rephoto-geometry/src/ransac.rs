use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    correspondence::{Point2, PointPair},
    error::SolverError,
    homography::{Homography, HOMOGRAPHY_MIN_PAIRS},
    linalg,
};

/// Settings of the robust homography fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RansacConfig {
    /// Largest distance in image A, in pixels, between a mapped B point and its partner for
    /// the pair to count as an inlier.
    pub threshold: f64,
    /// Upper bound on the number of sampled minimal sets.
    pub max_iterations: usize,
    /// Probability in `[0, 1)` of drawing at least one outlier-free sample, used to stop early.
    pub confidence: f64,
    /// Seed of the sampler, so a given set of pairs always gives the same fit.
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 1_234_567,
        }
    }
}

/// A homography fitted on a consensus set.
#[derive(Clone, Debug, PartialEq)]
pub struct RansacHomography {
    /// The least squares fit over the inliers.
    pub homography: Homography,
    /// Indices of the pairs within the threshold of the final fit.
    pub inliers: Vec<usize>,
}

fn residual(h: &Homography, pair: &PointPair) -> f64 {
    let p = h.apply(&pair.b);
    ((p[0] - pair.a[0]).powi(2) + (p[1] - pair.a[1]).powi(2)).sqrt()
}

fn inliers_of(h: &Homography, pairs: &[PointPair], threshold: f64) -> (Vec<usize>, f64) {
    let mut inliers = Vec::with_capacity(pairs.len());
    let mut sum_sq = 0.0;
    for (i, pair) in pairs.iter().enumerate() {
        let r = residual(h, pair);
        if r <= threshold {
            inliers.push(i);
            sum_sq += r * r;
        }
    }
    let rms = if inliers.is_empty() {
        f64::INFINITY
    } else {
        (sum_sq / inliers.len() as f64).sqrt()
    };
    (inliers, rms)
}

/// Number of samples needed to draw one clean minimal set with probability `confidence`.
fn adaptive_iterations(
    confidence: f64,
    inlier_ratio: f64,
    iterations_so_far: usize,
    max_iterations: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iterations;
    }
    let denom = (1.0 - inlier_ratio.powi(HOMOGRAPHY_MIN_PAIRS as i32))
        .max(1e-12)
        .ln();
    if denom >= 0.0 {
        return max_iterations;
    }
    let n = ((1.0 - confidence).max(1e-12).ln() / denom).ceil() as usize;
    n.clamp(iterations_so_far, max_iterations)
}

fn sample_is_degenerate(pairs: &[PointPair], sample: &[usize]) -> bool {
    let side = |a: bool| -> Vec<Point2> {
        sample
            .iter()
            .map(|&i| if a { pairs[i].a } else { pairs[i].b })
            .collect()
    };
    !linalg::has_general_quad(&side(true)) || !linalg::has_general_quad(&side(false))
}

/// Fit a homography robust to mismatched pairs.
///
/// Minimal sets of 4 pairs are drawn at random and fitted exactly; the model with the most
/// pairs within `config.threshold` wins (ties go to the lower inlier RMS), and the result is
/// refitted by least squares on its inliers.
///
/// # Errors
///
/// * The errors of [`Homography::fit`] for the whole set: too few pairs or degenerate
///   geometry.
/// * [`SolverError::DegenerateGeometry`] when no sample yields a model with at least 4
///   inliers.
pub fn fit_homography_ransac(
    pairs: &[PointPair],
    condition_limit: f64,
    config: &RansacConfig,
) -> Result<RansacHomography, SolverError> {
    // validates the count and the overall configuration
    let all_pairs_fit = Homography::fit(pairs, condition_limit);
    if let Err(err @ SolverError::InsufficientCorrespondences { .. })
    | Err(err @ SolverError::DegenerateGeometry(_)) = &all_pairs_fit
    {
        return Err(err.clone());
    }

    let indices: Vec<usize> = (0..pairs.len()).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut sample = Vec::with_capacity(HOMOGRAPHY_MIN_PAIRS);
    let mut subset = Vec::with_capacity(HOMOGRAPHY_MIN_PAIRS);

    let mut best: Option<(Homography, Vec<usize>, f64)> = None;
    let mut max_iterations = config.max_iterations;
    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;

        sample.clear();
        sample.extend(
            indices
                .as_slice()
                .choose_multiple(&mut rng, HOMOGRAPHY_MIN_PAIRS)
                .copied(),
        );
        if sample_is_degenerate(pairs, &sample) {
            continue;
        }

        subset.clear();
        subset.extend(sample.iter().map(|&i| pairs[i]));
        let Ok(model) = Homography::fit(&subset, condition_limit) else {
            continue;
        };

        let (inliers, rms) = inliers_of(&model, pairs, config.threshold);
        if inliers.len() < HOMOGRAPHY_MIN_PAIRS {
            continue;
        }

        let better = match &best {
            None => true,
            Some((_, best_inliers, best_rms)) => {
                inliers.len() > best_inliers.len()
                    || (inliers.len() == best_inliers.len() && rms < *best_rms)
            }
        };
        if better {
            let ratio = inliers.len() as f64 / pairs.len() as f64;
            max_iterations =
                adaptive_iterations(config.confidence, ratio, iterations, config.max_iterations);
            best = Some((model, inliers, rms));
        }
    }

    let Some((model, inliers, _)) = best else {
        return Err(SolverError::DegenerateGeometry(format!(
            "no sample of {HOMOGRAPHY_MIN_PAIRS} pairs agrees with at least {HOMOGRAPHY_MIN_PAIRS} pairs"
        )));
    };

    // least squares on the consensus set, then the inliers of that fit
    let consensus: Vec<PointPair> = inliers.iter().map(|&i| pairs[i]).collect();
    let (homography, inliers) = match Homography::fit(&consensus, condition_limit) {
        Ok(refit) => {
            let (refit_inliers, _) = inliers_of(&refit, pairs, config.threshold);
            if refit_inliers.len() >= inliers.len() {
                (refit, refit_inliers)
            } else {
                (model, inliers)
            }
        }
        Err(_) => (model, inliers),
    };

    log::debug!(
        "ransac homography after {} samples: {} of {} pairs are inliers",
        iterations,
        inliers.len(),
        pairs.len()
    );

    Ok(RansacHomography {
        homography,
        inliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homography::DEFAULT_CONDITION_LIMIT;
    use approx::assert_relative_eq;

    fn grid_pairs(truth: &linalg::Mat33) -> Vec<PointPair> {
        let mut pairs = Vec::new();
        for y in 0..4 {
            for x in 0..5 {
                let b = [x as f64 * 50.0 + 3.0, y as f64 * 40.0 + 7.0];
                pairs.push(PointPair {
                    a: linalg::transform_point(truth, &b),
                    b,
                });
            }
        }
        pairs
    }

    const TRUTH: linalg::Mat33 = [[1.05, 0.02, 12.0], [-0.03, 0.98, -6.0], [1e-4, -5e-5, 1.0]];

    #[test]
    fn ransac_ignores_mismatched_clicks() -> Result<(), SolverError> {
        let mut pairs = grid_pairs(&TRUTH);
        // three badly placed partners
        pairs[2].a[0] += 60.0;
        pairs[9].a[1] -= 45.0;
        pairs[17].a = [5.0, 300.0];

        let fit = fit_homography_ransac(&pairs, DEFAULT_CONDITION_LIMIT, &RansacConfig::default())?;
        assert_eq!(fit.inliers.len(), pairs.len() - 3);
        assert!(!fit.inliers.contains(&2));
        assert!(!fit.inliers.contains(&9));
        assert!(!fit.inliers.contains(&17));

        for (i, pair) in pairs.iter().enumerate() {
            if fit.inliers.contains(&i) {
                let p = fit.homography.apply(&pair.b);
                assert_relative_eq!(p[0], pair.a[0], epsilon = 1e-6);
                assert_relative_eq!(p[1], pair.a[1], epsilon = 1e-6);
            }
        }

        // the plain least squares fit is pulled off by the same pairs
        let plain = Homography::fit(&pairs, DEFAULT_CONDITION_LIMIT)?;
        assert!(plain.max_residual(&[pairs[0]]) > 1e-3);
        Ok(())
    }

    #[test]
    fn ransac_is_deterministic_for_a_seed() -> Result<(), SolverError> {
        let mut pairs = grid_pairs(&TRUTH);
        pairs[4].a = [0.0, 0.0];
        let config = RansacConfig::default();
        let first = fit_homography_ransac(&pairs, DEFAULT_CONDITION_LIMIT, &config)?;
        let second = fit_homography_ransac(&pairs, DEFAULT_CONDITION_LIMIT, &config)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn ransac_keeps_solver_errors() {
        let config = RansacConfig::default();
        let few = &grid_pairs(&TRUTH)[..3];
        assert!(matches!(
            fit_homography_ransac(few, DEFAULT_CONDITION_LIMIT, &config),
            Err(SolverError::InsufficientCorrespondences { .. })
        ));

        let line: Vec<PointPair> = (0..6)
            .map(|i| {
                let p = [i as f64, 2.0 * i as f64];
                PointPair { a: p, b: p }
            })
            .collect();
        assert!(matches!(
            fit_homography_ransac(&line, DEFAULT_CONDITION_LIMIT, &config),
            Err(SolverError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn adaptive_iterations_shrink_with_inliers() {
        assert_eq!(adaptive_iterations(0.995, 0.0, 1, 2000), 2000);
        let clean = adaptive_iterations(0.995, 1.0, 1, 2000);
        assert_eq!(clean, 1);
        let half = adaptive_iterations(0.995, 0.5, 1, 2000);
        assert!(half > clean && half < 2000);
    }
}
