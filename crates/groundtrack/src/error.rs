use groundtrack_core::{CalibrationError, ResolutionError};
use groundtrack_heatmap::AggregateError;

/// Invalid values in a [`GroundtrackConfig`](crate::GroundtrackConfig).
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid working resolution: {0}")]
    WorkingResolution(ResolutionError),
    #[error("invalid reference resolution: {0}")]
    ReferenceResolution(ResolutionError),
    #[error("ransac inlier threshold must be finite and > 0, got {0}")]
    RansacThreshold(f64),
    #[error("heatmap: {0}")]
    Heatmap(#[from] AggregateError),
}

/// Everything that can stop a `groundtrack` run.
#[derive(thiserror::Error, Debug)]
pub enum GroundtrackError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[cfg(feature = "image")]
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("a {bins}x{bins} heatmap at {cell_px} px per bin exceeds {max} px per side")]
    ImageTooLarge { bins: usize, cell_px: u32, max: u32 },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}
