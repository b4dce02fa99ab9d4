//! Camera calibration data: surveyed correspondences and their conventions.
//!
//! A [`CalibrationSpec`] is plain configuration. Several of them can coexist,
//! one per camera, and none of them is touched by estimation.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A surveyed pair linking a pixel to its ground-plane location.
///
/// `image` is in pixels of the calibration's reference resolution, `world` is
/// in ground units (meters) in the convention the survey was recorded in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrespondencePoint {
    pub image: [f64; 2],
    pub world: [f64; 2],
}

impl CorrespondencePoint {
    pub fn new(image: [f64; 2], world: [f64; 2]) -> Self {
        Self { image, world }
    }

    #[inline]
    pub fn image_point(&self) -> Point2<f64> {
        Point2::new(self.image[0], self.image[1])
    }

    fn is_finite(&self) -> bool {
        self.image.iter().chain(self.world.iter()).all(|v| v.is_finite())
    }
}

/// How one world axis is re-oriented before estimation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AxisFlip {
    /// Use the surveyed value unchanged.
    #[default]
    Keep,
    /// `v' = max(v) - v`, the maximum taken over the whole correspondence set.
    ReflectAboutMax,
    /// `v' = origin - v` for a fixed reference value.
    ReflectAbout { origin: f64 },
}

impl AxisFlip {
    fn apply(self, v: f64, set_max: f64) -> f64 {
        match self {
            AxisFlip::Keep => v,
            AxisFlip::ReflectAboutMax => set_max - v,
            AxisFlip::ReflectAbout { origin } => origin - v,
        }
    }
}

/// Per-axis orientation of the surveyed world coordinates relative to the image.
///
/// Image points use a top-left origin with `y` pointing down. Surveys are often
/// taken from some other reference vertex, so each axis can be reflected to
/// line the two conventions up. Which flip is right depends on how the camera
/// is mounted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldAxisConvention {
    #[serde(default)]
    pub x: AxisFlip,
    #[serde(default)]
    pub y: AxisFlip,
}

impl WorldAxisConvention {
    /// Reflect both axes about their maximum (survey origin at the bottom-right vertex).
    pub fn reflect_about_max() -> Self {
        Self {
            x: AxisFlip::ReflectAboutMax,
            y: AxisFlip::ReflectAboutMax,
        }
    }

    /// Re-orient a whole set of world points.
    pub fn apply(&self, world: &[[f64; 2]]) -> Vec<Point2<f64>> {
        let max_x = world
            .iter()
            .map(|w| w[0])
            .fold(f64::NEG_INFINITY, f64::max);
        let max_y = world
            .iter()
            .map(|w| w[1])
            .fold(f64::NEG_INFINITY, f64::max);
        world
            .iter()
            .map(|w| Point2::new(self.x.apply(w[0], max_x), self.y.apply(w[1], max_y)))
            .collect()
    }
}

/// Consensus-estimation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Inlier distance in world units.
    pub inlier_threshold: f64,
    /// Upper bound on evaluated 4-point subsets.
    pub max_iters: usize,
    /// Minimal consensus size; values below 4 are treated as 4.
    pub min_inliers: usize,
    /// Seed for subset sampling when subsets are not enumerated exhaustively.
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            inlier_threshold: 5.0,
            max_iters: 2000,
            min_inliers: 4,
            seed: 0,
        }
    }
}

/// Image size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("resolution must be non-zero (got {width}x{height})")]
pub struct ResolutionError {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self, ResolutionError> {
        let r = Self { width, height };
        r.validate()?;
        Ok(r)
    }

    pub fn validate(&self) -> Result<(), ResolutionError> {
        if self.width == 0 || self.height == 0 {
            return Err(ResolutionError {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Everything needed to calibrate one camera against its ground plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSpec {
    /// Resolution the correspondence image points were picked at.
    pub reference_resolution: Resolution,
    pub correspondences: Vec<CorrespondencePoint>,
    #[serde(default)]
    pub world_axes: WorldAxisConvention,
    #[serde(default)]
    pub ransac: RansacParams,
}

impl CalibrationSpec {
    pub fn new(reference_resolution: Resolution, correspondences: Vec<CorrespondencePoint>) -> Self {
        Self {
            reference_resolution,
            correspondences,
            world_axes: WorldAxisConvention::default(),
            ransac: RansacParams::default(),
        }
    }

    pub fn with_world_axes(mut self, world_axes: WorldAxisConvention) -> Self {
        self.world_axes = world_axes;
        self
    }

    pub fn with_ransac(mut self, ransac: RansacParams) -> Self {
        self.ransac = ransac;
        self
    }

    pub fn image_points(&self) -> Vec<Point2<f64>> {
        self.correspondences.iter().map(|c| c.image_point()).collect()
    }

    /// World points re-oriented into the image convention.
    pub fn normalized_world_points(&self) -> Vec<Point2<f64>> {
        let raw: Vec<[f64; 2]> = self.correspondences.iter().map(|c| c.world).collect();
        self.world_axes.apply(&raw)
    }

    pub(crate) fn all_finite(&self) -> bool {
        self.correspondences.iter().all(CorrespondencePoint::is_finite)
    }
}
