//! Pixel-to-ground mapping for tracker observations.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::calibration::Resolution;
use crate::homography::{Homography, PROJECTION_EPS};

/// Per-axis factor taking working-resolution pixels to reference-resolution pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct ResolutionScale {
    pub x: f64,
    pub y: f64,
}

/// Scale factors that are zero, negative, or non-finite.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
#[error("resolution scale must be finite and > 0, got ({x}, {y})")]
pub struct InvalidScale {
    pub x: f64,
    pub y: f64,
}

impl ResolutionScale {
    pub const IDENTITY: Self = Self { x: 1.0, y: 1.0 };

    pub fn new(x: f64, y: f64) -> Result<Self, InvalidScale> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(x) && valid(y) {
            Ok(Self { x, y })
        } else {
            Err(InvalidScale { x, y })
        }
    }

    /// Scale from frames of size `working` to the calibration's `reference` size.
    pub fn between(working: Resolution, reference: Resolution) -> Self {
        Self {
            x: reference.width as f64 / working.width as f64,
            y: reference.height as f64 / working.height as f64,
        }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(p.x * self.x, p.y * self.y)
    }
}

impl TryFrom<[f64; 2]> for ResolutionScale {
    type Error = InvalidScale;

    fn try_from([x, y]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(x, y)
    }
}

impl From<ResolutionScale> for [f64; 2] {
    fn from(s: ResolutionScale) -> Self {
        [s.x, s.y]
    }
}

impl Default for ResolutionScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One tracked subject in one frame, in working-resolution pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackObservation {
    pub subject_id: u64,
    pub frame_index: u64,
    pub x: f64,
    pub y: f64,
}

/// A [`TrackObservation`] mapped onto the ground plane, in ground units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundObservation {
    pub subject_id: u64,
    pub frame_index: u64,
    pub x: f64,
    pub y: f64,
}

/// Per-point projection failures.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum ProjectionError {
    #[error("point ({x}, {y}) has non-finite coordinates")]
    NonFiniteInput { x: f64, y: f64 },
    /// `x`, `y` are the rescaled (reference-resolution) coordinates.
    #[error("point ({x}, {y}) maps to infinity (w = {w:e})")]
    DegenerateProjection { x: f64, y: f64, w: f64 },
}

/// Map a working-resolution pixel to the ground plane.
///
/// Rescales by `scale`, then applies `h` with a perspective divide. A `w`
/// below [`PROJECTION_EPS`] is reported instead of divided.
pub fn to_ground(
    point: Point2<f64>,
    h: &Homography,
    scale: ResolutionScale,
) -> Result<Point2<f64>, ProjectionError> {
    if !point.x.is_finite() || !point.y.is_finite() {
        return Err(ProjectionError::NonFiniteInput {
            x: point.x,
            y: point.y,
        });
    }
    let p = scale.apply(point);
    let v = h.apply_homogeneous(p);
    let w = v[2];
    let degenerate = ProjectionError::DegenerateProjection { x: p.x, y: p.y, w };
    if !w.is_finite() || w.abs() < PROJECTION_EPS {
        return Err(degenerate);
    }
    let g = Point2::new(v[0] / w, v[1] / w);
    if !g.x.is_finite() || !g.y.is_finite() {
        return Err(degenerate);
    }
    Ok(g)
}

/// A record that could not be mapped, with its position in the input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RejectedObservation {
    pub index: usize,
    pub observation: TrackObservation,
    pub error: ProjectionError,
}

/// Result of a batch transform.
///
/// `ground` keeps the input order of the successful records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformOutcome {
    pub ground: Vec<GroundObservation>,
    pub rejected: Vec<RejectedObservation>,
}

/// Immutable homography plus resolution scale, shareable across threads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateTransformer {
    homography: Homography,
    scale: ResolutionScale,
}

impl CoordinateTransformer {
    pub fn new(homography: Homography, scale: ResolutionScale) -> Self {
        Self { homography, scale }
    }

    #[inline]
    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    #[inline]
    pub fn scale(&self) -> ResolutionScale {
        self.scale
    }

    #[inline]
    pub fn to_ground(&self, point: Point2<f64>) -> Result<Point2<f64>, ProjectionError> {
        to_ground(point, &self.homography, self.scale)
    }

    pub fn observe(&self, obs: &TrackObservation) -> Result<GroundObservation, ProjectionError> {
        let g = self.to_ground(Point2::new(obs.x, obs.y))?;
        Ok(GroundObservation {
            subject_id: obs.subject_id,
            frame_index: obs.frame_index,
            x: g.x,
            y: g.y,
        })
    }

    /// Map every observation. Failures are collected, never dropped.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, observations), fields(n = observations.len()))
    )]
    pub fn transform_all(&self, observations: &[TrackObservation]) -> TransformOutcome {
        #[cfg(feature = "rayon")]
        let mapped: Vec<Result<GroundObservation, ProjectionError>> =
            observations.par_iter().map(|o| self.observe(o)).collect();
        #[cfg(not(feature = "rayon"))]
        let mapped: Vec<Result<GroundObservation, ProjectionError>> =
            observations.iter().map(|o| self.observe(o)).collect();

        let mut out = TransformOutcome {
            ground: Vec::with_capacity(observations.len()),
            rejected: Vec::new(),
        };
        for (index, (res, obs)) in mapped.into_iter().zip(observations).enumerate() {
            match res {
                Ok(g) => out.ground.push(g),
                Err(error) => out.rejected.push(RejectedObservation {
                    index,
                    observation: *obs,
                    error,
                }),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn h() -> Homography {
        Homography::from_array([
            [0.02, 0.001, -1.0],
            [0.0005, 0.03, -2.0],
            [0.0, 0.0002, 1.0],
        ])
        .expect("valid")
    }

    #[test]
    fn scale_is_reference_over_working() {
        let s = ResolutionScale::between(
            Resolution::new(1920, 1080).expect("res"),
            Resolution::new(5996, 3372).expect("res"),
        );
        assert_relative_eq!(s.x, 5996.0 / 1920.0);
        assert_relative_eq!(s.y, 3372.0 / 1080.0);
    }

    #[test]
    fn degenerate_scales_are_rejected() {
        for (x, y) in [(0.0, 1.0), (1.0, -2.0), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            assert!(ResolutionScale::new(x, y).is_err(), "({x}, {y})");
        }
        let s: ResolutionScale = serde_json::from_str("[2.0, 0.5]").expect("parse");
        assert_eq!(s, ResolutionScale::new(2.0, 0.5).expect("scale"));
        assert_eq!(serde_json::to_string(&s).expect("serialize"), "[2.0,0.5]");
        assert!(serde_json::from_str::<ResolutionScale>("[0.0, 1.0]").is_err());
    }

    #[test]
    fn rescales_before_projecting() {
        let scale = ResolutionScale::new(2.0, 3.0).expect("scale");
        let direct = to_ground(Point2::new(200.0, 300.0), &h(), ResolutionScale::IDENTITY)
            .expect("finite");
        let scaled = to_ground(Point2::new(100.0, 100.0), &h(), scale).expect("finite");
        assert_relative_eq!(direct.x, scaled.x, epsilon = 1e-12);
        assert_relative_eq!(direct.y, scaled.y, epsilon = 1e-12);
    }

    #[test]
    fn horizon_points_are_rejected() {
        // w = 0.0002 * y + 1 vanishes at y = -5000.
        let err = to_ground(Point2::new(10.0, -5000.0), &h(), ResolutionScale::IDENTITY)
            .expect_err("at infinity");
        assert!(matches!(err, ProjectionError::DegenerateProjection { .. }));
    }

    #[test]
    fn non_finite_inputs_are_rejected() {
        let err = to_ground(Point2::new(f64::NAN, 1.0), &h(), ResolutionScale::IDENTITY)
            .expect_err("nan");
        assert!(matches!(err, ProjectionError::NonFiniteInput { .. }));
    }

    #[test]
    fn batch_keeps_order_and_reports_rejections() {
        let t = CoordinateTransformer::new(h(), ResolutionScale::new(1.0, 2.0).expect("scale"));
        let obs: Vec<TrackObservation> = [(1, 0, 10.0, 10.0), (2, 0, 5.0, -2500.0), (1, 1, 20.0, 15.0)]
            .iter()
            .map(|&(subject_id, frame_index, x, y)| TrackObservation {
                subject_id,
                frame_index,
                x,
                y,
            })
            .collect();

        let out = t.transform_all(&obs);
        assert_eq!(out.ground.len(), 2);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].index, 1);
        assert_eq!(out.rejected[0].observation.subject_id, 2);
        assert_eq!(
            (out.ground[0].subject_id, out.ground[0].frame_index),
            (1, 0)
        );
        assert_eq!(
            (out.ground[1].subject_id, out.ground[1].frame_index),
            (1, 1)
        );
        let single = t.observe(&obs[2]).expect("finite");
        assert_eq!(single, out.ground[1]);
    }
}
