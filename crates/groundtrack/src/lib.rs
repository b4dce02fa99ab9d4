//! Ground-plane occupancy from tracked pixel positions.
//!
//! `groundtrack` ties the workspace together:
//! - `groundtrack::core`: homography estimation and pixel-to-ground transforms.
//! - `groundtrack::heatmap`: position compression, outlier trimming and binning.
//! - [`GroundtrackConfig`]: JSON run configuration.
//! - [`io`]: `personId,frame_idx,x,y` CSV files and JSON reports.
//! - [`pipeline`]: the calibrate / transform / aggregate stages.
//! - `render` (feature `image`): PNG heatmaps.
//!
//! The `groundtrack` binary (feature `cli`) exposes the same stages as
//! `calibrate`, `transform` and `heatmap` subcommands.
//!
//! ## Quickstart
//!
//! ```no_run
//! use groundtrack::{io, pipeline, GroundtrackConfig};
//!
//! # fn main() -> Result<(), groundtrack::GroundtrackError> {
//! let config = GroundtrackConfig::load_json("site.json")?;
//! let estimate = pipeline::calibrate(&config)?;
//! let transformer = pipeline::transformer_for(&config, &estimate, config.working_resolution);
//!
//! let tracks = io::read_tracks("tracks.csv")?;
//! let outcome = pipeline::transform_tracks(&transformer, &tracks);
//! io::write_ground("tracks_ground.csv", &outcome.ground)?;
//!
//! let heatmap = pipeline::build_heatmap(&outcome.ground, &config.heatmap)?;
//! println!("max bin weight {}", heatmap.aggregation.histogram.max_weight());
//! # Ok(())
//! # }
//! ```

pub use groundtrack_core as core;
pub use groundtrack_heatmap as heatmap;

mod config;
mod error;
pub mod io;
pub mod pipeline;
#[cfg(feature = "image")]
pub mod render;

pub use config::{GroundtrackConfig, HeatmapConfig};
pub use error::{ConfigError, GroundtrackError};
pub use groundtrack_core::{
    CalibrationSpec, CorrespondencePoint, EstimationMode, Resolution, WorldAxisConvention,
};
