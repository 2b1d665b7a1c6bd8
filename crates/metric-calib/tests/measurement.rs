use approx::assert_relative_eq;
use metric_calib::core::{Distortion, ImageSize, Intrinsics, PinholeCamera};
use metric_calib::measure::{
    measure_planar, measure_query, MeasureError, MeasurementQuery, PointSpace,
};
use metric_calib::store::CalibrationArtifact;
use nalgebra::Point2;

fn book_points() -> Vec<Point2<f64>> {
    vec![
        Point2::new(1404.0, 2364.0),
        Point2::new(1648.0, 2352.0),
        Point2::new(1410.0, 2682.0),
        Point2::new(1664.0, 2682.0),
    ]
}

#[test]
fn book_example() {
    let r = measure_planar(1000.0, 1000.0, 2.2, &book_points()).expect("valid");
    assert_relative_eq!(r.width_px, 59680f64.sqrt(), epsilon = 1e-9);
    assert_relative_eq!(r.height_px, 101160f64.sqrt(), epsilon = 1e-9);
    assert!((r.width_m - 0.537).abs() < 1e-3, "width {}", r.width_m);
    assert!((r.height_m - 0.700).abs() < 1e-3, "height {}", r.height_m);
}

#[test]
fn metric_size_is_linear_in_depth() {
    let pts = book_points();
    let near = measure_planar(1200.0, 1100.0, 1.0, &pts).expect("valid");
    let far = measure_planar(1200.0, 1100.0, 3.0, &pts).expect("valid");
    assert_relative_eq!(far.width_m, 3.0 * near.width_m, epsilon = 1e-12);
    assert_relative_eq!(far.height_m, 3.0 * near.height_m, epsilon = 1e-12);
    assert_eq!(far.width_px, near.width_px);
}

#[test]
fn non_positive_depth_is_rejected() {
    for z in [0.0, -2.2] {
        assert_eq!(
            measure_planar(1000.0, 1000.0, z, &book_points()),
            Err(MeasureError::InvalidDepth(z))
        );
    }
}

fn artifact(distortion: Distortion) -> CalibrationArtifact {
    CalibrationArtifact::new(
        PinholeCamera::new(Intrinsics::new(1000.0, 1000.0, 1500.0, 2000.0), distortion),
        0.2,
    )
}

#[test]
fn distortion_free_query_matches_plain_measurement() {
    let size = ImageSize::new(3000, 4000);
    let query = MeasurementQuery {
        depth_m: 2.2,
        points: book_points(),
        space: PointSpace::Distorted,
    };
    let report = measure_query(&artifact(Distortion::ZERO), size, 1.0, &query).expect("measured");
    let plain = measure_planar(1000.0, 1000.0, 2.2, &book_points()).expect("valid");

    // The new camera rescales pixels and focal length together (up to the
    // slightly different x and y scales).
    assert_relative_eq!(report.result.width_m, plain.width_m, max_relative = 1e-5);
    assert_relative_eq!(report.result.height_m, plain.height_m, max_relative = 1e-5);
}

#[test]
fn distorted_points_are_mapped_before_measuring() {
    let size = ImageSize::new(3000, 4000);
    let cam = artifact(Distortion {
        k1: -0.15,
        k2: 0.03,
        ..Distortion::ZERO
    });
    let distorted = MeasurementQuery {
        depth_m: 2.2,
        points: book_points(),
        space: PointSpace::Distorted,
    };
    let report = measure_query(&cam, size, 1.0, &distorted).expect("measured");

    // Feeding the mapped points back as undistorted gives the same answer.
    let undistorted = MeasurementQuery {
        points: report.points.clone(),
        space: PointSpace::Undistorted,
        ..distorted.clone()
    };
    let again = measure_query(&cam, size, 1.0, &undistorted).expect("measured");
    assert_eq!(again.result, report.result);
    assert_eq!(again.new_camera, report.new_camera);

    // Measuring the raw points directly would differ under barrel distortion.
    let raw = measure_query(
        &cam,
        size,
        1.0,
        &MeasurementQuery {
            space: PointSpace::Undistorted,
            ..distorted
        },
    )
    .expect("measured");
    assert!((raw.result.width_m - report.result.width_m).abs() > 1e-6);
}

#[test]
fn bad_alpha_is_an_input_error() {
    let query = MeasurementQuery {
        depth_m: 1.0,
        points: book_points(),
        space: PointSpace::Undistorted,
    };
    let size = ImageSize::new(3000, 4000);
    let err = measure_query(&artifact(Distortion::ZERO), size, 2.0, &query);
    assert!(matches!(err, Err(MeasureError::Undistort(_))));
}
