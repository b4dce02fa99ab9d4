//! CSV track files and JSON reports.

use std::{
    fs,
    io::{Read, Write},
    path::Path,
};

use groundtrack_core::{
    CalibrationSpec, EstimationMode, GroundObservation, HomographyEstimate, RejectedObservation,
    Resolution, TrackObservation,
};
use groundtrack_heatmap::{Aggregation, OutlierBounds, WeightedPoint};
use serde::{Deserialize, Serialize};

use crate::error::GroundtrackError;

/// One CSV row: `personId,frame_idx,x,y`.
///
/// The same layout is used for pixel tracks and for ground tracks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    #[serde(rename = "personId")]
    pub person_id: u64,
    pub frame_idx: u64,
    pub x: f64,
    pub y: f64,
}

impl From<ObservationRecord> for TrackObservation {
    fn from(r: ObservationRecord) -> Self {
        TrackObservation {
            subject_id: r.person_id,
            frame_index: r.frame_idx,
            x: r.x,
            y: r.y,
        }
    }
}

impl From<ObservationRecord> for GroundObservation {
    fn from(r: ObservationRecord) -> Self {
        GroundObservation {
            subject_id: r.person_id,
            frame_index: r.frame_idx,
            x: r.x,
            y: r.y,
        }
    }
}

impl From<&GroundObservation> for ObservationRecord {
    fn from(g: &GroundObservation) -> Self {
        ObservationRecord {
            person_id: g.subject_id,
            frame_idx: g.frame_index,
            x: g.x,
            y: g.y,
        }
    }
}

fn read_records<R: Read, T: From<ObservationRecord>>(rdr: R) -> Result<Vec<T>, GroundtrackError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut out = Vec::new();
    for row in csv.deserialize::<ObservationRecord>() {
        out.push(row?.into());
    }
    Ok(out)
}

/// Parse pixel tracks from any reader.
pub fn read_tracks_from<R: Read>(rdr: R) -> Result<Vec<TrackObservation>, GroundtrackError> {
    read_records(rdr)
}

/// Load pixel tracks from a CSV file.
pub fn read_tracks(path: impl AsRef<Path>) -> Result<Vec<TrackObservation>, GroundtrackError> {
    read_tracks_from(fs::File::open(path)?)
}

pub fn read_ground_from<R: Read>(rdr: R) -> Result<Vec<GroundObservation>, GroundtrackError> {
    read_records(rdr)
}

/// Load ground tracks written by [`write_ground`].
pub fn read_ground(path: impl AsRef<Path>) -> Result<Vec<GroundObservation>, GroundtrackError> {
    read_ground_from(fs::File::open(path)?)
}

pub fn write_ground_to<W: Write>(
    wtr: W,
    ground: &[GroundObservation],
) -> Result<(), GroundtrackError> {
    let mut csv = csv::Writer::from_writer(wtr);
    for g in ground {
        csv.serialize(ObservationRecord::from(g))?;
    }
    csv.flush()?;
    Ok(())
}

/// Write ground tracks with the `personId,frame_idx,x,y` header, in input order.
pub fn write_ground(
    path: impl AsRef<Path>,
    ground: &[GroundObservation],
) -> Result<(), GroundtrackError> {
    write_ground_to(fs::File::create(path)?, ground)
}

/// A track row that could not be mapped, with its zero-based data row and the reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub row: usize,
    #[serde(rename = "personId")]
    pub person_id: u64,
    pub frame_idx: u64,
    pub x: f64,
    pub y: f64,
    pub reason: String,
}

impl From<&RejectedObservation> for RejectedRecord {
    fn from(r: &RejectedObservation) -> Self {
        RejectedRecord {
            row: r.index,
            person_id: r.observation.subject_id,
            frame_idx: r.observation.frame_index,
            x: r.observation.x,
            y: r.observation.y,
            reason: r.error.to_string(),
        }
    }
}

pub fn write_rejected_to<W: Write>(
    wtr: W,
    rejected: &[RejectedObservation],
) -> Result<(), GroundtrackError> {
    let mut csv = csv::Writer::from_writer(wtr);
    for r in rejected {
        csv.serialize(RejectedRecord::from(r))?;
    }
    csv.flush()?;
    Ok(())
}

/// Write rejected rows as `row,personId,frame_idx,x,y,reason`.
pub fn write_rejected(
    path: impl AsRef<Path>,
    rejected: &[RejectedObservation],
) -> Result<(), GroundtrackError> {
    write_rejected_to(fs::File::create(path)?, rejected)
}

/// Serialize any report as pretty JSON.
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), GroundtrackError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Calibration summary written by `groundtrack calibrate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Row-major matrix mapping reference-resolution pixels to ground units.
    pub homography: [[f64; 3]; 3],
    pub mode: EstimationMode,
    pub reference_resolution: Resolution,
    /// World points after the axis convention was applied.
    pub world_points: Vec<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inliers: Option<Vec<bool>>,
    pub residuals: Vec<f64>,
    pub rms_residual: f64,
}

impl CalibrationReport {
    pub fn new(spec: &CalibrationSpec, estimate: &HomographyEstimate) -> Self {
        Self {
            homography: estimate.homography.to_array(),
            mode: estimate.mode,
            reference_resolution: spec.reference_resolution,
            world_points: estimate.world_points.iter().map(|p| [p.x, p.y]).collect(),
            inliers: estimate.inliers.clone(),
            residuals: estimate.residuals.clone(),
            rms_residual: estimate.rms_residual(),
        }
    }
}

/// Heatmap summary written by `groundtrack heatmap`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeatmapReport {
    pub bins: usize,
    pub x_edges: Vec<f64>,
    pub y_edges: Vec<f64>,
    /// One row per x bin, `bins` weights each.
    pub weights: Vec<Vec<f64>>,
    pub bounds: OutlierBounds,
    pub rounding_precision: f64,
    pub observations: u64,
    pub distinct_positions: usize,
    pub retained_positions: usize,
    pub retained_weight: f64,
    /// Smallest and largest weight among retained positions.
    pub weight_range: [f64; 2],
}

impl HeatmapReport {
    pub fn new(
        aggregation: &Aggregation,
        points: &[WeightedPoint],
        rounding_precision: f64,
    ) -> Self {
        let h = &aggregation.histogram;
        let weight_range = points
            .iter()
            .filter(|p| aggregation.bounds.contains(p))
            .fold([f64::INFINITY, f64::NEG_INFINITY], |[lo, hi], p| {
                [lo.min(p.weight), hi.max(p.weight)]
            });
        Self {
            bins: h.bins(),
            x_edges: h.x_edges().to_vec(),
            y_edges: h.y_edges().to_vec(),
            weights: h.rows().map(<[f64]>::to_vec).collect(),
            bounds: aggregation.bounds,
            rounding_precision,
            observations: aggregation.input_weight.round() as u64,
            distinct_positions: aggregation.input_points,
            retained_positions: aggregation.retained_points,
            retained_weight: aggregation.retained_weight,
            weight_range,
        }
    }
}
