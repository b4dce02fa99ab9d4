use groundtrack_heatmap::{
    aggregate, AggregateError, HistogramParams, PositionCounter, SpatialAggregator, WeightedPoint,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn compress(positions: &[(f64, f64)], precision: f64) -> Vec<WeightedPoint> {
    let mut counter = PositionCounter::new(precision).expect("precision");
    for &(x, y) in positions {
        counter.add(x, y).expect("finite");
    }
    assert_eq!(counter.total() as usize, positions.len());
    counter.into_weighted_points()
}

#[test]
fn injected_outliers_are_trimmed() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut positions: Vec<(f64, f64)> = (0..1000)
        .map(|_| (rng.gen_range(0.0..=100.0), rng.gen_range(0.0..=100.0)))
        .collect();
    positions.extend(std::iter::repeat((10_000.0, 10_000.0)).take(20));

    let points = compress(&positions, 0.1);
    let outlier = points
        .iter()
        .find(|p| p.x > 1000.0)
        .expect("outlier cell present");
    assert_eq!(outlier.weight, 20.0);

    let agg = aggregate(&points, &HistogramParams::default()).expect("aggregate");
    assert!(!agg.bounds.contains(outlier));
    assert!(agg.bounds.x.upper <= 100.0 + 1e-9);
    assert!(agg.bounds.y.upper <= 100.0 + 1e-9);

    let h = &agg.histogram;
    assert_eq!(h.bins(), 100);
    assert!(h.x_edges()[100] <= 100.0 + 1e-9);
    assert!(h.y_edges()[100] <= 100.0 + 1e-9);
    assert!(agg.retained_weight <= 1000.0);
    assert!(agg.retained_weight > 900.0);
    assert_eq!(agg.input_weight, 1020.0);
    assert!((h.total_weight() - agg.retained_weight).abs() < 1e-9);
}

#[test]
fn repeated_position_lands_in_one_bin() {
    let positions = vec![(5.0, 5.0); 50];
    let points = compress(&positions, 0.1);
    assert_eq!(points, vec![WeightedPoint::new(5.0, 5.0, 50.0)]);

    let agg = SpatialAggregator::new(HistogramParams::default())
        .expect("params")
        .aggregate(&points)
        .expect("aggregate");
    let occupied: Vec<_> = agg
        .histogram
        .iter_bins()
        .filter(|b| b.weight_sum > 0.0)
        .collect();
    assert_eq!(occupied.len(), 1);
    assert_eq!(occupied[0].weight_sum, 50.0);
    assert!(occupied[0].x_range[0] <= 5.0 && 5.0 <= occupied[0].x_range[1]);
    assert!(occupied[0].y_range[0] <= 5.0 && 5.0 <= occupied[0].y_range[1]);
    assert_eq!(agg.histogram.x_edges()[0], 4.5);
    assert_eq!(agg.histogram.x_edges()[100], 5.5);
}

#[test]
fn compression_changes_what_counts_as_an_outlier() {
    // Without compression the repeated outliers own the top percentile ranks.
    let mut raw: Vec<WeightedPoint> = (0..100)
        .map(|i| WeightedPoint::unit(i as f64, i as f64))
        .collect();
    raw.extend(std::iter::repeat(WeightedPoint::unit(500.0, 500.0)).take(5));
    let uncompressed = aggregate(&raw, &HistogramParams::default()).expect("aggregate");
    assert!(uncompressed.bounds.x.upper > 99.0);

    let positions: Vec<(f64, f64)> = raw.iter().map(|p| (p.x, p.y)).collect();
    let compressed = aggregate(&compress(&positions, 0.1), &HistogramParams::default())
        .expect("aggregate");
    assert!(compressed.bounds.x.upper < 500.0);
    assert!(compressed.retained_weight < 100.0);
}

#[test]
fn invalid_precision_is_rejected() {
    for p in [0.0, -0.1, f64::NAN] {
        assert!(matches!(
            PositionCounter::new(p),
            Err(AggregateError::InvalidPrecision(_))
        ));
    }
}
