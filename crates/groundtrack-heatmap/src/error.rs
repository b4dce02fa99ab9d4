/// Errors from a single aggregation run. None of them poison later runs.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum AggregateError {
    #[error("nothing to aggregate: none of {input} points survived outlier trimming")]
    EmptyDataset { input: usize },
    #[error("bin count must be in 1..={max}, got {0}", max = crate::MAX_BINS)]
    InvalidBinCount(usize),
    #[error("outlier percentile must be in [0, 50), got {0}")]
    InvalidPercentile(f64),
    #[error("rounding precision must be finite and > 0, got {0}")]
    InvalidPrecision(f64),
    #[error("point {index} has a non-finite coordinate")]
    NonFiniteCoordinate { index: usize },
    #[error("point {index} coordinate {value} is too large to round at the configured precision")]
    CoordinateOutOfRange { index: usize, value: f64 },
    #[error("point {index} has invalid weight {weight} (must be finite and >= 0)")]
    InvalidWeight { index: usize, weight: f64 },
}
