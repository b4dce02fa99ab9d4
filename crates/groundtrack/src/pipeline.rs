//! The three stages wired together: calibrate, transform, aggregate.

use groundtrack_core::{
    estimate_homography, CoordinateTransformer, EstimationMode, GroundObservation,
    HomographyEstimate, Resolution, ResolutionScale, TrackObservation, TransformOutcome,
};
use groundtrack_heatmap::{aggregate, AggregateError, Aggregation, PositionCounter, WeightedPoint};
use log::{debug, info, warn};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::{GroundtrackConfig, HeatmapConfig};
use crate::error::GroundtrackError;

/// Validate the config and estimate its homography.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip(config)))]
pub fn calibrate(config: &GroundtrackConfig) -> Result<HomographyEstimate, GroundtrackError> {
    config.validate()?;
    let estimate = estimate_homography(&config.calibration)?;
    if matches!(
        estimate.mode,
        EstimationMode::RobustUnweighted | EstimationMode::DegradedExact
    ) {
        warn!(
            "calibration fell back to {} estimation; check the surveyed points",
            estimate.mode
        );
    }
    Ok(estimate)
}

/// Transformer for tracks recorded at `working` resolution.
pub fn transformer_for(
    config: &GroundtrackConfig,
    estimate: &HomographyEstimate,
    working: Resolution,
) -> CoordinateTransformer {
    let scale = ResolutionScale::between(working, config.calibration.reference_resolution);
    debug!(
        "working {}x{} -> reference {}x{}, scale ({:.4}, {:.4})",
        working.width,
        working.height,
        config.calibration.reference_resolution.width,
        config.calibration.reference_resolution.height,
        scale.x,
        scale.y
    );
    CoordinateTransformer::new(estimate.homography, scale)
}

/// Map a batch of tracks; rejected records are logged and returned.
pub fn transform_tracks(
    transformer: &CoordinateTransformer,
    tracks: &[TrackObservation],
) -> TransformOutcome {
    let outcome = transformer.transform_all(tracks);
    if !outcome.rejected.is_empty() {
        warn!(
            "{} of {} observations could not be mapped to the ground plane",
            outcome.rejected.len(),
            tracks.len()
        );
        for r in &outcome.rejected {
            warn!(
                "rejected row {} (person {}, frame {}): {}",
                r.index, r.observation.subject_id, r.observation.frame_index, r.error
            );
        }
    }
    info!("mapped {} observations", outcome.ground.len());
    outcome
}

/// Collapse ground positions into weighted points at `precision`.
pub fn compress_positions(
    ground: &[GroundObservation],
    precision: f64,
) -> Result<Vec<WeightedPoint>, AggregateError> {
    let mut counter = PositionCounter::new(precision)?;
    for g in ground {
        counter.add(g.x, g.y)?;
    }
    info!(
        "{} positions, {} distinct at precision {}",
        counter.total(),
        counter.distinct(),
        precision
    );
    Ok(counter.into_weighted_points())
}

/// Weighted points and the histogram built from them.
#[derive(Clone, Debug, PartialEq)]
pub struct Heatmap {
    pub points: Vec<WeightedPoint>,
    pub aggregation: Aggregation,
}

/// Compress and bin ground positions with the given settings.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(ground, settings), fields(n = ground.len()))
)]
pub fn build_heatmap(
    ground: &[GroundObservation],
    settings: &HeatmapConfig,
) -> Result<Heatmap, GroundtrackError> {
    settings.validate()?;
    let points = compress_positions(ground, settings.rounding_precision)?;
    let aggregation = aggregate(&points, &settings.histogram_params())?;
    Ok(Heatmap {
        points,
        aggregation,
    })
}
