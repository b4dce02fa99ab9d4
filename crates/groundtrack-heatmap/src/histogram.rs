//! Weighted 2D occupancy histogram over outlier-trimmed ground positions.

use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::AggregateError;
use crate::percentile::OutlierBounds;
use crate::weighting::WeightedPoint;

/// Largest accepted bins-per-axis count.
pub const MAX_BINS: usize = 4096;

/// Binning parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramParams {
    /// Bins per axis.
    pub bins: usize,
    /// Percentile `p` trimmed from each end of each axis, in percent.
    pub outlier_percentile: f64,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            bins: 100,
            outlier_percentile: 1.0,
        }
    }
}

impl HistogramParams {
    pub fn validate(&self) -> Result<(), AggregateError> {
        if self.bins == 0 || self.bins > MAX_BINS {
            return Err(AggregateError::InvalidBinCount(self.bins));
        }
        let p = self.outlier_percentile;
        if !p.is_finite() || !(0.0..50.0).contains(&p) {
            return Err(AggregateError::InvalidPercentile(p));
        }
        Ok(())
    }
}

/// One cell of a [`SpatialHistogram`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpatialBin {
    pub ix: usize,
    pub iy: usize,
    /// `[lower, upper]` edge values along x.
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    pub weight_sum: f64,
}

/// `bins × bins` grid of summed weights with explicit edges.
///
/// Weights are stored x-major: cell `(ix, iy)` lives at `ix * bins + iy`.
///
/// Serialize-only: a histogram is built by [`aggregate`], never read back.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpatialHistogram {
    bins: usize,
    x_edges: Vec<f64>,
    y_edges: Vec<f64>,
    weights: Vec<f64>,
}

impl SpatialHistogram {
    fn empty(bins: usize, x_edges: Vec<f64>, y_edges: Vec<f64>) -> Self {
        Self {
            bins,
            x_edges,
            y_edges,
            weights: vec![0.0; bins * bins],
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// `bins + 1` ascending x edges; the last equals the retained maximum.
    pub fn x_edges(&self) -> &[f64] {
        &self.x_edges
    }

    pub fn y_edges(&self) -> &[f64] {
        &self.y_edges
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weight(&self, ix: usize, iy: usize) -> Option<f64> {
        if ix >= self.bins || iy >= self.bins {
            return None;
        }
        Some(self.weights[ix * self.bins + iy])
    }

    /// Weight rows, one per x bin.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.weights.chunks(self.bins)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn max_weight(&self) -> f64 {
        self.weights.iter().copied().fold(0.0, f64::max)
    }

    pub fn iter_bins(&self) -> impl Iterator<Item = SpatialBin> + '_ {
        (0..self.bins).flat_map(move |ix| {
            (0..self.bins).map(move |iy| SpatialBin {
                ix,
                iy,
                x_range: [self.x_edges[ix], self.x_edges[ix + 1]],
                y_range: [self.y_edges[iy], self.y_edges[iy + 1]],
                weight_sum: self.weights[ix * self.bins + iy],
            })
        })
    }

    fn accumulate(&mut self, x: f64, y: f64, weight: f64) {
        let ix = bin_index(x, &self.x_edges, self.bins);
        let iy = bin_index(y, &self.y_edges, self.bins);
        self.weights[ix * self.bins + iy] += weight;
    }
}

/// Result of one aggregation run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Aggregation {
    pub histogram: SpatialHistogram,
    pub bounds: OutlierBounds,
    pub input_points: usize,
    pub retained_points: usize,
    pub input_weight: f64,
    pub retained_weight: f64,
}

/// Reusable aggregation entry point holding validated parameters.
#[derive(Clone, Copy, Debug)]
pub struct SpatialAggregator {
    params: HistogramParams,
}

impl SpatialAggregator {
    pub fn new(params: HistogramParams) -> Result<Self, AggregateError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &HistogramParams {
        &self.params
    }

    pub fn aggregate(&self, points: &[WeightedPoint]) -> Result<Aggregation, AggregateError> {
        aggregate(points, &self.params)
    }
}

/// Trim per-axis outliers and bin the surviving points.
///
/// Bounds are computed unweighted over `points`; each retained point then
/// contributes its full weight to exactly one cell.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(points, params), fields(n = points.len(), bins = params.bins))
)]
pub fn aggregate(
    points: &[WeightedPoint],
    params: &HistogramParams,
) -> Result<Aggregation, AggregateError> {
    params.validate()?;
    for (index, p) in points.iter().enumerate() {
        if !p.x.is_finite() || !p.y.is_finite() {
            return Err(AggregateError::NonFiniteCoordinate { index });
        }
        if !p.weight.is_finite() || p.weight < 0.0 {
            return Err(AggregateError::InvalidWeight {
                index,
                weight: p.weight,
            });
        }
    }

    let input = points.len();
    let empty = AggregateError::EmptyDataset { input };
    let bounds = OutlierBounds::compute(points, params.outlier_percentile).ok_or(empty)?;
    debug!(
        "trim bounds at p={}: x [{}, {}], y [{}, {}]",
        params.outlier_percentile, bounds.x.lower, bounds.x.upper, bounds.y.lower, bounds.y.upper
    );

    let retained: Vec<&WeightedPoint> = points.iter().filter(|p| bounds.contains(p)).collect();
    let (x_lo, x_hi) = extent(retained.iter().map(|p| p.x)).ok_or(empty)?;
    let (y_lo, y_hi) = extent(retained.iter().map(|p| p.y)).ok_or(empty)?;

    let mut histogram = SpatialHistogram::empty(
        params.bins,
        bin_edges(x_lo, x_hi, params.bins),
        bin_edges(y_lo, y_hi, params.bins),
    );
    for p in &retained {
        histogram.accumulate(p.x, p.y, p.weight);
    }

    let input_weight: f64 = points.iter().map(|p| p.weight).sum();
    let retained_weight: f64 = retained.iter().map(|p| p.weight).sum();
    info!(
        "binned {} of {} points ({} of {} weight) into {}x{} cells",
        retained.len(),
        input,
        retained_weight,
        input_weight,
        params.bins,
        params.bins
    );

    Ok(Aggregation {
        histogram,
        bounds,
        input_points: input,
        retained_points: retained.len(),
        input_weight,
        retained_weight,
    })
}

fn extent(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// `bins + 1` evenly spaced edges from `lo` to exactly `hi`.
///
/// A zero-width range is widened to `[lo - 0.5, hi + 0.5]`.
fn bin_edges(lo: f64, hi: f64, bins: usize) -> Vec<f64> {
    let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
    let width = (hi - lo) / bins as f64;
    let mut edges: Vec<f64> = (0..bins).map(|i| lo + width * i as f64).collect();
    edges.push(hi);
    edges
}

fn bin_index(v: f64, edges: &[f64], bins: usize) -> usize {
    let lo = edges[0];
    let width = (edges[bins] - lo) / bins as f64;
    let idx = ((v - lo) / width).floor();
    if idx <= 0.0 {
        0
    } else {
        (idx as usize).min(bins - 1)
    }
}
