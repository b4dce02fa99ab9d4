//! Outlier-trimmed weighted occupancy histograms.
//!
//! Ground positions are first collapsed into weighted points with a
//! [`PositionCounter`], then [`aggregate`] trims each axis at a percentile
//! and bins what is left into a square [`SpatialHistogram`].
//!
//! ```
//! use groundtrack_heatmap::{aggregate, HistogramParams, PositionCounter};
//!
//! # fn main() -> Result<(), groundtrack_heatmap::AggregateError> {
//! let mut counter = PositionCounter::new(0.1)?;
//! for i in 0..100 {
//!     counter.add((i % 10) as f64, (i / 10) as f64)?;
//! }
//! counter.add(5.0, 5.0)?;
//!
//! let params = HistogramParams { bins: 10, outlier_percentile: 0.0 };
//! let agg = aggregate(&counter.into_weighted_points(), &params)?;
//! assert_eq!(agg.histogram.total_weight(), 101.0);
//! assert_eq!(agg.histogram.max_weight(), 2.0);
//! # Ok(())
//! # }
//! ```

mod error;
mod histogram;
mod percentile;
mod weighting;

pub use error::AggregateError;
pub use histogram::{
    aggregate, Aggregation, HistogramParams, SpatialAggregator, SpatialBin, SpatialHistogram,
    MAX_BINS,
};
pub use percentile::{percentile_sorted, AxisBounds, OutlierBounds};
pub use weighting::{PositionCounter, WeightedPoint};
