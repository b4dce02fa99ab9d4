//! Ground-plane calibration and pixel-to-ground transforms.
//!
//! The crate is purely geometric: it estimates an image-to-ground homography
//! from surveyed correspondences and maps tracker pixels through it. It does
//! no I/O and holds no global state apart from the optional logger.
//!
//! ```
//! use groundtrack_core::{
//!     estimate_homography, CalibrationSpec, CoordinateTransformer, CorrespondencePoint,
//!     EstimationMode, Resolution, ResolutionScale,
//! };
//! use nalgebra::Point2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = CalibrationSpec::new(
//!     Resolution::new(1920, 1080)?,
//!     vec![
//!         CorrespondencePoint::new([0.0, 0.0], [0.0, 0.0]),
//!         CorrespondencePoint::new([1920.0, 0.0], [40.0, 0.0]),
//!         CorrespondencePoint::new([1920.0, 1080.0], [40.0, 20.0]),
//!         CorrespondencePoint::new([0.0, 1080.0], [0.0, 20.0]),
//!     ],
//! );
//! let estimate = estimate_homography(&spec)?;
//! assert_eq!(estimate.mode, EstimationMode::Exact);
//!
//! let working = Resolution::new(960, 540)?;
//! let scale = ResolutionScale::between(working, spec.reference_resolution);
//! let transformer = CoordinateTransformer::new(estimate.homography, scale);
//! let g = transformer.to_ground(Point2::new(480.0, 270.0))?;
//! assert!((g.x - 20.0).abs() < 1e-9 && (g.y - 10.0).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```

mod calibration;
mod error;
mod estimator;
mod homography;
mod logger;
mod transform;

pub use calibration::{
    AxisFlip, CalibrationSpec, CorrespondencePoint, RansacParams, Resolution, ResolutionError,
    WorldAxisConvention,
};
pub use error::{AttemptFailure, CalibrationError, FailedAttempt};
pub use estimator::{
    estimate_homography, EstimationMode, HomographyEstimate, HomographyEstimator,
    MIN_CORRESPONDENCES,
};
pub use homography::{
    homography_from_4pt, homography_least_squares, transfer_error, Homography, SolveError,
    PROJECTION_EPS,
};
pub use transform::{
    to_ground, CoordinateTransformer, GroundObservation, InvalidScale, ProjectionError,
    RejectedObservation, ResolutionScale, TrackObservation, TransformOutcome,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, verbosity_level};
