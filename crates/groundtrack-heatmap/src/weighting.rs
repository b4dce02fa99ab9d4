//! Collapsing repeated positions into weighted points.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AggregateError;

/// A ground position carrying a weight, usually a repeat count.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedPoint {
    pub x: f64,
    pub y: f64,
    pub weight: f64,
}

impl WeightedPoint {
    pub fn new(x: f64, y: f64, weight: f64) -> Self {
        Self { x, y, weight }
    }

    pub fn unit(x: f64, y: f64) -> Self {
        Self::new(x, y, 1.0)
    }
}

/// Counts positions after snapping them to a square grid of side `precision`.
///
/// Keys are integer grid indices, so two positions that round to the same
/// cell always merge regardless of floating-point noise.
#[derive(Clone, Debug)]
pub struct PositionCounter {
    precision: f64,
    counts: BTreeMap<(i64, i64), u64>,
    total: u64,
}

impl PositionCounter {
    pub fn new(precision: f64) -> Result<Self, AggregateError> {
        if !precision.is_finite() || precision <= 0.0 {
            return Err(AggregateError::InvalidPrecision(precision));
        }
        Ok(Self {
            precision,
            counts: BTreeMap::new(),
            total: 0,
        })
    }

    #[inline]
    pub fn precision(&self) -> f64 {
        self.precision
    }

    fn key(&self, v: f64, index: usize) -> Result<i64, AggregateError> {
        if !v.is_finite() {
            return Err(AggregateError::NonFiniteCoordinate { index });
        }
        let q = (v / self.precision).round();
        if q.abs() >= i64::MAX as f64 {
            return Err(AggregateError::CoordinateOutOfRange { index, value: v });
        }
        Ok(q as i64)
    }

    /// Count one occurrence of `(x, y)`.
    pub fn add(&mut self, x: f64, y: f64) -> Result<(), AggregateError> {
        let index = self.total as usize;
        let key = (self.key(x, index)?, self.key(y, index)?);
        *self.counts.entry(key).or_insert(0) += 1;
        self.total += 1;
        Ok(())
    }

    /// Total number of positions added.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct rounded positions.
    #[inline]
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Distinct rounded positions with their counts, in key order.
    pub fn into_weighted_points(self) -> Vec<WeightedPoint> {
        let p = self.precision;
        self.counts
            .into_iter()
            .map(|((kx, ky), n)| WeightedPoint::new(kx as f64 * p, ky as f64 * p, n as f64))
            .collect()
    }
}
