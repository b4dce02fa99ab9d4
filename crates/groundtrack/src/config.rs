//! JSON run configuration.

use std::{fs, path::Path};

use groundtrack_core::{CalibrationSpec, CorrespondencePoint, Resolution, WorldAxisConvention};
use groundtrack_heatmap::{HistogramParams, PositionCounter};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GroundtrackError};

fn default_working_resolution() -> Resolution {
    Resolution {
        width: 1920,
        height: 1080,
    }
}

fn default_reference_resolution() -> Resolution {
    Resolution {
        width: 5996,
        height: 3372,
    }
}

/// Heatmap settings: binning, trimming and position rounding.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    pub bins: usize,
    pub outlier_percentile: f64,
    /// Ground positions are snapped to multiples of this before counting.
    pub rounding_precision: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        let hist = HistogramParams::default();
        Self {
            bins: hist.bins,
            outlier_percentile: hist.outlier_percentile,
            rounding_precision: 0.1,
        }
    }
}

impl HeatmapConfig {
    pub fn histogram_params(&self) -> HistogramParams {
        HistogramParams {
            bins: self.bins,
            outlier_percentile: self.outlier_percentile,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.histogram_params().validate()?;
        PositionCounter::new(self.rounding_precision)?;
        Ok(())
    }
}

/// Everything a run needs: the camera calibration, the resolution the tracks
/// were recorded at, and heatmap settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundtrackConfig {
    pub calibration: CalibrationSpec,
    #[serde(default = "default_working_resolution")]
    pub working_resolution: Resolution,
    #[serde(default)]
    pub heatmap: HeatmapConfig,
}

impl GroundtrackConfig {
    pub fn new(calibration: CalibrationSpec) -> Self {
        Self {
            calibration,
            working_resolution: default_working_resolution(),
            heatmap: HeatmapConfig::default(),
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, GroundtrackError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), GroundtrackError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.working_resolution
            .validate()
            .map_err(ConfigError::WorkingResolution)?;
        self.calibration
            .reference_resolution
            .validate()
            .map_err(ConfigError::ReferenceResolution)?;
        let thr = self.calibration.ransac.inlier_threshold;
        if !thr.is_finite() || thr <= 0.0 {
            return Err(ConfigError::RansacThreshold(thr));
        }
        self.heatmap.validate()
    }

    /// Five-point survey of the site the tools were first built for.
    ///
    /// World coordinates were measured from the far corner of the site, so
    /// both axes are reflected about their maxima.
    pub fn surveyed_site() -> Self {
        let correspondences = vec![
            CorrespondencePoint::new([5499.0, 3342.0], [0.0, 0.0]),
            CorrespondencePoint::new([4259.0, 1953.0], [2.67, 10.72]),
            CorrespondencePoint::new([2415.0, 792.0], [0.65, 86.626]),
            CorrespondencePoint::new([1515.0, 1002.0], [-12.34, -54.30]),
            CorrespondencePoint::new([244.0, 1235.0], [-10.07, -44.52]),
        ];
        let calibration = CalibrationSpec::new(default_reference_resolution(), correspondences)
            .with_world_axes(WorldAxisConvention::reflect_about_max());
        Self::new(calibration)
    }
}
