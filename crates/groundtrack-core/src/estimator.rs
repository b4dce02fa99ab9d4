//! Image-to-ground homography estimation with a fixed degradation cascade.
//!
//! Exactly four correspondences are solved exactly. Five or more go through
//! an ordered list of attempts, stopping at the first that yields a matrix:
//!
//! 1. [`EstimationMode::Robust`]: RANSAC over 4-point subsets, refit on the consensus set.
//! 2. [`EstimationMode::RobustUnweighted`]: least-squares DLT over every point.
//! 3. [`EstimationMode::DegradedExact`]: exact solve on the first four points.
//!
//! If every step fails the caller gets [`CalibrationError::HomographyUnavailable`]
//! with the reason for each step.

use std::fmt;

use log::{debug, info, warn};
use nalgebra::Point2;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::calibration::{CalibrationSpec, RansacParams};
use crate::error::{AttemptFailure, CalibrationError, FailedAttempt};
use crate::homography::{
    all_collinear, homography_from_4pt, homography_least_squares, transfer_error, Homography,
    SolveError,
};

/// Smallest correspondence set that determines a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// How the returned matrix was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMode {
    Exact,
    Robust,
    RobustUnweighted,
    DegradedExact,
}

impl fmt::Display for EstimationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EstimationMode::Exact => "exact",
            EstimationMode::Robust => "robust",
            EstimationMode::RobustUnweighted => "robust_unweighted",
            EstimationMode::DegradedExact => "degraded_exact",
        };
        f.write_str(name)
    }
}

/// Output of a successful calibration.
#[derive(Clone, Debug, PartialEq)]
pub struct HomographyEstimate {
    /// Maps reference-resolution pixels to ground coordinates.
    pub homography: Homography,
    pub mode: EstimationMode,
    /// World points after axis-convention normalisation, in correspondence order.
    pub world_points: Vec<Point2<f64>>,
    /// Consensus mask, only for [`EstimationMode::Robust`].
    pub inliers: Option<Vec<bool>>,
    /// Ground-space distance between each projected image point and its world point.
    pub residuals: Vec<f64>,
}

impl HomographyEstimate {
    pub fn rms_residual(&self) -> f64 {
        if self.residuals.is_empty() {
            return 0.0;
        }
        let sq = self.residuals.iter().map(|r| r * r).sum::<f64>();
        (sq / self.residuals.len() as f64).sqrt()
    }

    pub fn inlier_count(&self) -> usize {
        match &self.inliers {
            Some(mask) => mask.iter().filter(|&&m| m).count(),
            None => self.residuals.len(),
        }
    }
}

/// Owns one camera calibration and estimates its homography on demand.
#[derive(Clone, Debug)]
pub struct HomographyEstimator {
    spec: CalibrationSpec,
}

impl HomographyEstimator {
    pub fn new(spec: CalibrationSpec) -> Self {
        Self { spec }
    }

    #[inline]
    pub fn spec(&self) -> &CalibrationSpec {
        &self.spec
    }

    pub fn estimate(&self) -> Result<HomographyEstimate, CalibrationError> {
        estimate_homography(&self.spec)
    }
}

/// Candidate produced by one cascade step.
#[derive(Clone, Debug)]
struct Fit {
    homography: Homography,
    inliers: Option<Vec<bool>>,
}

impl From<Homography> for Fit {
    fn from(homography: Homography) -> Self {
        Self {
            homography,
            inliers: None,
        }
    }
}

type Attempt<'a> = &'a dyn Fn() -> Result<Fit, AttemptFailure>;

/// Estimate the image-to-ground homography for one calibration.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(spec), fields(points = spec.correspondences.len()))
)]
pub fn estimate_homography(spec: &CalibrationSpec) -> Result<HomographyEstimate, CalibrationError> {
    let n = spec.correspondences.len();
    if n < MIN_CORRESPONDENCES {
        return Err(CalibrationError::InsufficientPoints {
            needed: MIN_CORRESPONDENCES,
            got: n,
        });
    }
    if !spec.all_finite() {
        return Err(CalibrationError::DegenerateConfiguration(
            SolveError::NonFinite,
        ));
    }

    let image = spec.image_points();
    let world = spec.normalized_world_points();
    debug!(
        "world points normalised with {:?}: {:?}",
        spec.world_axes,
        world.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>()
    );

    for (set, pts) in [("source", &image), ("destination", &world)] {
        if all_collinear(pts) {
            return Err(CalibrationError::DegenerateConfiguration(
                SolveError::Collinear { set },
            ));
        }
    }

    let (mode, fit) = if n == MIN_CORRESPONDENCES {
        let h = exact_first_four(&image, &world).map_err(CalibrationError::DegenerateConfiguration)?;
        (EstimationMode::Exact, Fit::from(h))
    } else {
        let robust = || ransac(&image, &world, &spec.ransac);
        let unweighted = || -> Result<Fit, AttemptFailure> {
            Ok(Fit::from(homography_least_squares(&image, &world)?))
        };
        let degraded = || -> Result<Fit, AttemptFailure> {
            Ok(Fit::from(exact_first_four(&image, &world)?))
        };
        let steps: [(EstimationMode, Attempt<'_>); 3] = [
            (EstimationMode::Robust, &robust),
            (EstimationMode::RobustUnweighted, &unweighted),
            (EstimationMode::DegradedExact, &degraded),
        ];
        run_cascade(&steps)?
    };

    let residuals: Vec<f64> = image
        .iter()
        .zip(&world)
        .map(|(&i, &w)| transfer_error(&fit.homography, i, w))
        .collect();

    let estimate = HomographyEstimate {
        homography: fit.homography,
        mode,
        world_points: world,
        inliers: fit.inliers,
        residuals,
    };
    info!(
        "homography estimated ({}) from {} correspondences, {} inliers, rms residual {:.4}",
        estimate.mode,
        n,
        estimate.inlier_count(),
        estimate.rms_residual()
    );
    debug!("homography: {:?}", estimate.homography.to_array());
    Ok(estimate)
}

/// Try each step in order and return the first success, tagged with its mode.
fn run_cascade(
    steps: &[(EstimationMode, Attempt<'_>)],
) -> Result<(EstimationMode, Fit), CalibrationError> {
    let mut attempts = Vec::new();
    for &(mode, attempt) in steps {
        match attempt() {
            Ok(fit) => return Ok((mode, fit)),
            Err(failure) => {
                warn!("{mode} homography estimation failed: {failure}");
                attempts.push(FailedAttempt { mode, failure });
            }
        }
    }
    Err(CalibrationError::HomographyUnavailable { attempts })
}

fn exact_first_four(image: &[Point2<f64>], world: &[Point2<f64>]) -> Result<Homography, SolveError> {
    match (image.get(..4), world.get(..4)) {
        (Some(i), Some(w)) => {
            let src: &[Point2<f64>; 4] = i.try_into().map_err(|_| SolveError::Singular)?;
            let dst: &[Point2<f64>; 4] = w.try_into().map_err(|_| SolveError::Singular)?;
            homography_from_4pt(src, dst)
        }
        _ => Err(SolveError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: image.len().min(world.len()),
        }),
    }
}

/// Best model seen so far while scanning subsets.
struct Consensus {
    count: usize,
    mask: Vec<bool>,
    homography: Option<Homography>,
}

impl Consensus {
    fn new(n: usize) -> Self {
        Self {
            count: 0,
            mask: vec![false; n],
            homography: None,
        }
    }

    /// Score a minimal subset. Degenerate subsets are skipped.
    fn evaluate(&mut self, subset: [usize; 4], src: &[Point2<f64>], dst: &[Point2<f64>], thr: f64) {
        let s4 = subset.map(|i| src[i]);
        let d4 = subset.map(|i| dst[i]);
        let Ok(h) = homography_from_4pt(&s4, &d4) else {
            return;
        };
        let mask = inlier_mask(&h, src, dst, thr);
        let count = mask.iter().filter(|&&m| m).count();
        if count > self.count {
            self.count = count;
            self.mask = mask;
            self.homography = Some(h);
        }
    }

    fn is_complete(&self) -> bool {
        self.count == self.mask.len()
    }
}

fn inlier_mask(h: &Homography, src: &[Point2<f64>], dst: &[Point2<f64>], thr: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(&s, &d)| transfer_error(h, s, d) <= thr)
        .collect()
}

/// Number of 4-element subsets of `n` items, `None` on overflow.
fn subsets_of_four(n: usize) -> Option<usize> {
    if n < 4 {
        return Some(0);
    }
    n.checked_mul(n - 1)?
        .checked_mul(n - 2)?
        .checked_mul(n - 3)
        .map(|v| v / 24)
}

/// RANSAC with a world-space inlier threshold.
///
/// Small correspondence sets are scanned exhaustively in lexicographic order;
/// larger ones use `max_iters` seeded random subsets. Either way the result is
/// deterministic for a given spec.
fn ransac(src: &[Point2<f64>], dst: &[Point2<f64>], params: &RansacParams) -> Result<Fit, AttemptFailure> {
    let n = src.len();
    let needed = params.min_inliers.max(MIN_CORRESPONDENCES);
    let thr = params.inlier_threshold;
    let mut best = Consensus::new(n);

    match subsets_of_four(n) {
        Some(total) if total <= params.max_iters => {
            'scan: for a in 0..n {
                for b in (a + 1)..n {
                    for c in (b + 1)..n {
                        for d in (c + 1)..n {
                            best.evaluate([a, b, c, d], src, dst, thr);
                            if best.is_complete() {
                                break 'scan;
                            }
                        }
                    }
                }
            }
        }
        _ => {
            let mut rng = StdRng::seed_from_u64(params.seed);
            for _ in 0..params.max_iters {
                let idx = rand::seq::index::sample(&mut rng, n, 4);
                let subset = [idx.index(0), idx.index(1), idx.index(2), idx.index(3)];
                best.evaluate(subset, src, dst, thr);
                if best.is_complete() {
                    break;
                }
            }
        }
    }

    let Some(best_h) = best.homography.filter(|_| best.count >= needed) else {
        return Err(AttemptFailure::NoConsensus {
            best_inliers: best.count,
            needed,
        });
    };

    let (inlier_src, inlier_dst): (Vec<Point2<f64>>, Vec<Point2<f64>>) = src
        .iter()
        .zip(dst)
        .zip(&best.mask)
        .filter(|(_, m)| **m)
        .map(|((&s, &d), _)| (s, d))
        .unzip();

    // Keep the refit only if it still explains the consensus set.
    if let Ok(refit) = homography_least_squares(&inlier_src, &inlier_dst) {
        let mask = inlier_mask(&refit, src, dst, thr);
        if mask.iter().filter(|&&m| m).count() >= best.count {
            return Ok(Fit {
                homography: refit,
                inliers: Some(mask),
            });
        }
    }
    Ok(Fit {
        homography: best_h,
        inliers: Some(best.mask),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CorrespondencePoint, Resolution, WorldAxisConvention};

    fn truth() -> Homography {
        Homography::from_array([
            [0.021, 0.002, -3.0],
            [-0.001, 0.034, -1.5],
            [0.00002, 0.00011, 1.0],
        ])
        .expect("valid")
    }

    fn spec_from_image(points: &[[f64; 2]]) -> CalibrationSpec {
        let h = truth();
        let correspondences = points
            .iter()
            .map(|&p| {
                let w = h.project(Point2::new(p[0], p[1])).expect("finite");
                CorrespondencePoint::new(p, [w.x, w.y])
            })
            .collect();
        CalibrationSpec::new(Resolution::new(1920, 1080).expect("res"), correspondences)
    }

    fn grid_points() -> Vec<[f64; 2]> {
        vec![
            [120.0, 900.0],
            [1750.0, 980.0],
            [1600.0, 160.0],
            [300.0, 120.0],
            [960.0, 540.0],
            [500.0, 700.0],
            [1300.0, 300.0],
        ]
    }

    #[test]
    fn robust_mode_rejects_gross_outlier() {
        let mut spec = spec_from_image(&grid_points());
        spec.correspondences[4].world[0] += 40.0;

        let est = estimate_homography(&spec).expect("estimate");
        assert_eq!(est.mode, EstimationMode::Robust);
        let mask = est.inliers.as_ref().expect("mask");
        assert!(!mask[4]);
        assert_eq!(est.inlier_count(), 6);
        for (i, r) in est.residuals.iter().enumerate() {
            if i != 4 {
                assert!(*r < 1e-6, "residual {i} = {r}");
            }
        }
    }

    #[test]
    fn falls_back_to_unweighted_without_consensus() {
        let spec = spec_from_image(&grid_points()[..5]).with_ransac(RansacParams {
            min_inliers: 6,
            ..RansacParams::default()
        });
        let est = estimate_homography(&spec).expect("estimate");
        assert_eq!(est.mode, EstimationMode::RobustUnweighted);
        assert!(est.inliers.is_none());
        assert!(est.rms_residual() < 1e-6);
    }

    #[test]
    fn random_sampling_is_deterministic_for_a_seed() {
        let pts: Vec<[f64; 2]> = (0..12)
            .map(|i| [100.0 + 140.0 * i as f64, 80.0 + 73.0 * ((i * 7) % 12) as f64])
            .collect();
        let mut spec = spec_from_image(&pts).with_ransac(RansacParams {
            max_iters: 50,
            seed: 7,
            ..RansacParams::default()
        });
        spec.correspondences[3].world[1] -= 25.0;

        let a = estimate_homography(&spec).expect("a");
        let b = estimate_homography(&spec).expect("b");
        assert_eq!(a.mode, EstimationMode::Robust);
        assert_eq!(a.homography, b.homography);
        assert_eq!(a.inliers, b.inliers);
    }

    #[test]
    fn cascade_returns_first_success_in_order() {
        let fail = || -> Result<Fit, AttemptFailure> {
            Err(AttemptFailure::NoConsensus {
                best_inliers: 0,
                needed: 4,
            })
        };
        let unweighted_fails = || -> Result<Fit, AttemptFailure> { Err(SolveError::RankDeficient.into()) };
        let degraded = || -> Result<Fit, AttemptFailure> { Ok(Fit::from(truth())) };
        let steps: [(EstimationMode, Attempt<'_>); 3] = [
            (EstimationMode::Robust, &fail),
            (EstimationMode::RobustUnweighted, &unweighted_fails),
            (EstimationMode::DegradedExact, &degraded),
        ];
        let (mode, fit) = run_cascade(&steps).expect("degraded step succeeds");
        assert_eq!(mode, EstimationMode::DegradedExact);
        assert_eq!(fit.homography, truth());
    }

    #[test]
    fn exhausted_cascade_lists_every_attempt() {
        let fail = || -> Result<Fit, AttemptFailure> { Err(SolveError::Singular.into()) };
        let steps: [(EstimationMode, Attempt<'_>); 2] = [
            (EstimationMode::Robust, &fail),
            (EstimationMode::DegradedExact, &fail),
        ];
        match run_cascade(&steps) {
            Err(CalibrationError::HomographyUnavailable { attempts }) => {
                let modes: Vec<_> = attempts.iter().map(|a| a.mode).collect();
                assert_eq!(modes, [EstimationMode::Robust, EstimationMode::DegradedExact]);
            }
            other => panic!("expected HomographyUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn axis_convention_is_applied_before_estimation() {
        let mut spec = spec_from_image(&grid_points()[..4]);
        let plain = estimate_homography(&spec).expect("plain");

        spec.world_axes = WorldAxisConvention::reflect_about_max();
        let flipped = estimate_homography(&spec).expect("flipped");

        let max_x = spec.correspondences.iter().map(|c| c.world[0]).fold(f64::MIN, f64::max);
        let max_y = spec.correspondences.iter().map(|c| c.world[1]).fold(f64::MIN, f64::max);
        for c in &spec.correspondences {
            let g = flipped.homography.project(c.image_point()).expect("finite");
            assert!((g.x - (max_x - c.world[0])).abs() < 1e-6);
            assert!((g.y - (max_y - c.world[1])).abs() < 1e-6);
        }
        assert_ne!(plain.homography, flipped.homography);
    }

    #[test]
    fn collinear_survey_is_degenerate_before_the_cascade() {
        let correspondences = (0..6)
            .map(|i| {
                let t = i as f64;
                CorrespondencePoint::new([100.0 + 250.0 * t, 900.0 - 90.0 * (t * t)], [2.0 * t, 5.0 + t])
            })
            .collect();
        let spec = CalibrationSpec::new(Resolution::new(1920, 1080).expect("res"), correspondences);
        assert_eq!(
            estimate_homography(&spec),
            Err(CalibrationError::DegenerateConfiguration(
                SolveError::Collinear { set: "destination" }
            ))
        );
    }

    #[test]
    fn inlier_threshold_is_inclusive() {
        let identity = Homography::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
            .expect("identity");
        let src = [Point2::new(0.0, 0.0), Point2::new(10.0, 10.0)];
        let dst = [Point2::new(3.0, 4.0), Point2::new(10.0, 15.5)];
        assert_eq!(inlier_mask(&identity, &src, &dst, 5.0), [true, false]);
    }

    #[test]
    fn subset_count_matches_binomial() {
        assert_eq!(subsets_of_four(3), Some(0));
        assert_eq!(subsets_of_four(4), Some(1));
        assert_eq!(subsets_of_four(7), Some(35));
        assert_eq!(subsets_of_four(usize::MAX), None);
    }
}
