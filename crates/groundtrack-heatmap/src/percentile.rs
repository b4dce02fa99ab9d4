//! Per-axis percentile bounds used for outlier trimming.

use serde::{Deserialize, Serialize};

use crate::weighting::WeightedPoint;

/// Linearly interpolated percentile of ascending `sorted` data.
///
/// `p` is in percent. The rank is `p / 100 * (n - 1)`; the value is
/// interpolated between the two closest ranks.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let lo = (rank.floor() as usize).min(last);
    let hi = (rank.ceil() as usize).min(last);
    let (a, b) = (sorted[lo], sorted[hi]);
    let frac = rank - lo as f64;
    Some((a + (b - a) * frac).clamp(a, b))
}

/// Inclusive range kept on one axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub lower: f64,
    pub upper: f64,
}

impl AxisBounds {
    /// `[p, 100 - p]` percentile range of `values`.
    pub fn from_values(mut values: Vec<f64>, percentile: f64) -> Option<Self> {
        values.sort_unstable_by(f64::total_cmp);
        Some(Self {
            lower: percentile_sorted(&values, percentile)?,
            upper: percentile_sorted(&values, 100.0 - percentile)?,
        })
    }

    #[inline]
    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }
}

/// Independent x and y trimming bounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub x: AxisBounds,
    pub y: AxisBounds,
    pub percentile: f64,
}

impl OutlierBounds {
    /// Bounds over the given points, unweighted: each distinct point counts once.
    ///
    /// Returns `None` for an empty slice.
    pub fn compute(points: &[WeightedPoint], percentile: f64) -> Option<Self> {
        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.y).collect();

        #[cfg(feature = "rayon")]
        let (x, y) = rayon::join(
            || AxisBounds::from_values(xs, percentile),
            || AxisBounds::from_values(ys, percentile),
        );
        #[cfg(not(feature = "rayon"))]
        let (x, y) = (
            AxisBounds::from_values(xs, percentile),
            AxisBounds::from_values(ys, percentile),
        );

        Some(Self {
            x: x?,
            y: y?,
            percentile,
        })
    }

    #[inline]
    pub fn contains(&self, p: &WeightedPoint) -> bool {
        self.x.contains(p.x) && self.y.contains(p.y)
    }
}
