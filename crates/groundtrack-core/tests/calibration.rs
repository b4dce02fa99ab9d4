use approx::assert_abs_diff_eq;
use groundtrack_core::{
    estimate_homography, CalibrationError, CalibrationSpec, CoordinateTransformer,
    CorrespondencePoint, EstimationMode, Homography, HomographyEstimator, Resolution,
    ResolutionScale, SolveError, WorldAxisConvention,
};
use nalgebra::Point2;

fn h0() -> Homography {
    Homography::from_array([
        [0.0125, 0.0031, -4.2],
        [-0.0008, 0.0410, -3.1],
        [0.000015, 0.00042, 1.0],
    ])
    .expect("valid H0")
}

fn quad() -> [[f64; 2]; 4] {
    [[140.0, 1010.0], [1830.0, 1050.0], [1410.0, 210.0], [420.0, 190.0]]
}

fn spec_for(h: &Homography, image: &[[f64; 2]]) -> CalibrationSpec {
    let correspondences = image
        .iter()
        .map(|&p| {
            let w = h.project(Point2::new(p[0], p[1])).expect("finite");
            CorrespondencePoint::new(p, [w.x, w.y])
        })
        .collect();
    CalibrationSpec::new(Resolution::new(1920, 1080).expect("res"), correspondences)
}

#[test]
fn exact_mode_reproduces_calibration_points() {
    let spec = spec_for(&h0(), &quad());
    let est = estimate_homography(&spec).expect("estimate");
    assert_eq!(est.mode, EstimationMode::Exact);
    assert!(est.inliers.is_none());
    for c in &spec.correspondences {
        let g = est.homography.project(c.image_point()).expect("finite");
        assert_abs_diff_eq!(g.x, c.world[0], epsilon = 1e-8);
        assert_abs_diff_eq!(g.y, c.world[1], epsilon = 1e-8);
    }
}

#[test]
fn exact_mode_recovers_known_matrix() {
    let est = HomographyEstimator::new(spec_for(&h0(), &quad()))
        .estimate()
        .expect("estimate");
    let got = est.homography.to_array();
    let want = h0().to_array();
    for r in 0..3 {
        for c in 0..3 {
            assert_abs_diff_eq!(got[r][c], want[r][c], epsilon = 1e-9);
        }
    }
}

#[test]
fn collinear_points_are_degenerate() {
    let correspondences = vec![
        CorrespondencePoint::new([0.0, 0.0], [0.0, 0.0]),
        CorrespondencePoint::new([100.0, 50.0], [1.0, 0.0]),
        CorrespondencePoint::new([200.0, 100.0], [2.0, 1.0]),
        CorrespondencePoint::new([300.0, 150.0], [0.0, 3.0]),
    ];
    let spec = CalibrationSpec::new(Resolution::new(640, 480).expect("res"), correspondences);
    match estimate_homography(&spec) {
        Err(CalibrationError::DegenerateConfiguration(SolveError::Collinear { .. })) => {}
        other => panic!("expected collinear degeneracy, got {other:?}"),
    }
}

#[test]
fn fewer_than_four_points_is_an_error() {
    let spec = spec_for(&h0(), &quad()[..3]);
    assert_eq!(
        estimate_homography(&spec),
        Err(CalibrationError::InsufficientPoints { needed: 4, got: 3 })
    );
}

#[test]
fn non_finite_survey_is_degenerate() {
    let mut spec = spec_for(&h0(), &quad());
    spec.correspondences[2].world[1] = f64::NAN;
    assert_eq!(
        estimate_homography(&spec),
        Err(CalibrationError::DegenerateConfiguration(
            SolveError::NonFinite
        ))
    );
}

#[test]
fn transform_is_scale_covariant() {
    let h = h0();
    let reference = Resolution::new(1920, 1080).expect("res");
    let native = CoordinateTransformer::new(h, ResolutionScale::IDENTITY);

    for (sx, sy) in [(2.0, 2.0), (4.0, 2.5), (1.5, 3.0)] {
        let working = Resolution::new(
            (reference.width as f64 / sx) as u32,
            (reference.height as f64 / sy) as u32,
        )
        .expect("res");
        let scale = ResolutionScale::between(working, reference);
        let downscaled = CoordinateTransformer::new(h, scale);

        for p in [[960.0, 540.0], [100.0, 1000.0], [1800.0, 300.0]] {
            let a = native.to_ground(Point2::new(p[0], p[1])).expect("finite");
            let b = downscaled
                .to_ground(Point2::new(p[0] / scale.x, p[1] / scale.y))
                .expect("finite");
            assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
            assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
        }
    }
}

#[test]
fn five_point_survey_uses_robust_estimate() {
    // Survey recorded from the bottom-right vertex of the site.
    let correspondences = vec![
        CorrespondencePoint::new([5499.0, 3342.0], [0.0, 0.0]),
        CorrespondencePoint::new([4259.0, 1953.0], [2.67, 10.72]),
        CorrespondencePoint::new([2415.0, 792.0], [0.65, 86.626]),
        CorrespondencePoint::new([1515.0, 1002.0], [-12.34, -54.30]),
        CorrespondencePoint::new([244.0, 1235.0], [-10.07, -44.52]),
    ];
    let spec = CalibrationSpec::new(Resolution::new(5996, 3372).expect("res"), correspondences)
        .with_world_axes(WorldAxisConvention::reflect_about_max());

    let est = estimate_homography(&spec).expect("estimate");
    assert_eq!(est.mode, EstimationMode::Robust);
    assert!(est.inlier_count() >= 4);
    assert_eq!(est.world_points[0], Point2::new(2.67, 86.626));
    assert!(est.residuals.iter().all(|r| r.is_finite()));
}

fn offset_rectangle(offset: f64, with_centre: bool) -> CalibrationSpec {
    let mut correspondences = vec![
        CorrespondencePoint::new([0.0, 0.0], [offset, offset]),
        CorrespondencePoint::new([1920.0, 0.0], [offset + 40.0, offset]),
        CorrespondencePoint::new([1920.0, 1080.0], [offset + 40.0, offset + 20.0]),
        CorrespondencePoint::new([0.0, 1080.0], [offset, offset + 20.0]),
    ];
    if with_centre {
        correspondences.push(CorrespondencePoint::new([960.0, 540.0], [offset + 20.0, offset + 10.0]));
    }
    CalibrationSpec::new(Resolution::new(1920, 1080).expect("res"), correspondences)
}

#[test]
fn large_world_offsets_are_estimated() {
    for offset in [1.0e3, 1.0e4, 1.0e5] {
        let exact = estimate_homography(&offset_rectangle(offset, false))
            .unwrap_or_else(|e| panic!("offset {offset}: {e}"));
        assert_eq!(exact.mode, EstimationMode::Exact);

        let robust = estimate_homography(&offset_rectangle(offset, true))
            .unwrap_or_else(|e| panic!("offset {offset}: {e}"));
        assert_eq!(robust.mode, EstimationMode::Robust);
        assert_eq!(robust.inlier_count(), 5);

        let centre = robust
            .homography
            .project(Point2::new(960.0, 540.0))
            .expect("finite");
        assert_abs_diff_eq!(centre.x, offset + 20.0, epsilon = 1e-6);
        assert_abs_diff_eq!(centre.y, offset + 10.0, epsilon = 1e-6);
    }
}

#[test]
fn every_failed_step_is_reported() {
    // Four image points on one line: no 4-subset is solvable and the
    // least-squares system has a two-dimensional null space.
    let correspondences = vec![
        CorrespondencePoint::new([0.0, 0.0], [0.0, 0.0]),
        CorrespondencePoint::new([100.0, 0.0], [1.0, 0.0]),
        CorrespondencePoint::new([200.0, 0.0], [2.0, 0.0]),
        CorrespondencePoint::new([300.0, 0.0], [3.0, 0.0]),
        CorrespondencePoint::new([100.0, 100.0], [1.0, 1.0]),
    ];
    let spec = CalibrationSpec::new(Resolution::new(640, 480).expect("res"), correspondences);
    match estimate_homography(&spec) {
        Err(CalibrationError::HomographyUnavailable { attempts }) => {
            let modes: Vec<_> = attempts.iter().map(|a| a.mode).collect();
            assert_eq!(
                modes,
                [
                    EstimationMode::Robust,
                    EstimationMode::RobustUnweighted,
                    EstimationMode::DegradedExact
                ]
            );
        }
        other => panic!("expected HomographyUnavailable, got {other:?}"),
    }
}
