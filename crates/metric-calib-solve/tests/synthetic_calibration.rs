use std::sync::Arc;

use metric_calib_core::{
    CorrespondenceSet, Distortion, Extrinsics, GridGeometry, ImageSize, Intrinsics, PinholeCamera,
};
use metric_calib_solve::{
    calibrate_camera, calibrate_camera_with, optimal_new_camera_matrix, undistort_points,
    CalibrationError, CalibrationFlags, CalibrationOptions, NllsProblem, NllsSolver, SolveOptions,
    SolveReport, Termination,
};
use nalgebra::{DVector, Point2, Vector3};

const SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

fn ground_truth() -> PinholeCamera {
    PinholeCamera::new(
        Intrinsics::new(800.0, 790.0, 322.0, 236.0),
        Distortion {
            k1: -0.2,
            k2: 0.08,
            p1: 0.001,
            p2: -0.0005,
            k3: 0.0,
        },
    )
}

fn poses() -> Vec<Extrinsics> {
    let tilts = [
        (0.0, 0.0, 0.0),
        (0.3, 0.0, 0.05),
        (-0.3, 0.05, -0.05),
        (0.0, 0.3, 0.1),
        (0.05, -0.3, 0.0),
        (0.25, 0.25, -0.1),
        (-0.2, 0.2, 0.15),
        (0.2, -0.25, -0.15),
    ];
    tilts
        .iter()
        .enumerate()
        .map(|(k, &(rx, ry, rz))| {
            let z = 14.0 + (k % 3) as f64;
            Extrinsics::new(Vector3::new(rx, ry, rz), Vector3::new(-4.0, -2.5, z))
        })
        .collect()
}

/// Deterministic sub-pixel jitter in `[-amp, amp]`.
fn jitter(k: usize, amp: f64) -> f64 {
    let s = ((k as f64 + 1.0) * 12.9898).sin() * 43758.5453;
    (s - s.floor() - 0.5) * 2.0 * amp
}

fn render_views(
    camera: &PinholeCamera,
    poses: &[Extrinsics],
    noise: f64,
) -> Vec<CorrespondenceSet> {
    let grid = Arc::new(GridGeometry::new(9, 6).expect("grid"));
    let mut n = 0;
    poses
        .iter()
        .map(|pose| {
            let pts: Vec<Point2<f64>> = grid
                .points()
                .iter()
                .map(|p| {
                    let q = camera.project(&pose.transform_point(p));
                    n += 2;
                    Point2::new(q.x + jitter(n, noise), q.y + jitter(n + 1, noise))
                })
                .collect();
            CorrespondenceSet::new(grid.clone(), pts).expect("set")
        })
        .collect()
}

#[test]
fn recovers_camera_from_eight_views() {
    let truth = ground_truth();
    let views = render_views(&truth, &poses(), 0.05);

    let opts = CalibrationOptions::default();
    let result = calibrate_camera(&views, SIZE, &opts).expect("calibrated");
    let k = result.camera.intrinsics;

    assert!(result.report.converged(), "{:?}", result.report);
    assert!(result.rms < 1.0, "rms {}", result.rms);
    assert!((k.fx - 800.0).abs() / 800.0 < 0.02, "fx {}", k.fx);
    assert!((k.fy - 790.0).abs() / 790.0 < 0.02, "fy {}", k.fy);
    assert!((k.cx - 322.0).abs() < 5.0, "cx {}", k.cx);
    assert!((k.cy - 236.0).abs() < 5.0, "cy {}", k.cy);
    assert!((result.camera.distortion.k1 + 0.2).abs() < 0.05);
    assert_eq!(result.extrinsics.len(), 8);
    assert_eq!(result.per_view_rms.len(), 8);
}

#[test]
fn noiseless_views_reproject_exactly() {
    let truth = ground_truth();
    let views = render_views(&truth, &poses(), 0.0);
    let opts = CalibrationOptions::default();
    let result = calibrate_camera(&views, SIZE, &opts).expect("calibrated");
    assert!(result.rms < 1e-3, "rms {}", result.rms);

    // Undistorting with the recovered camera straightens board rows.
    let new = optimal_new_camera_matrix(&result.camera, SIZE, 1.0).expect("new K");
    let row: Vec<Point2<f64>> = views[1].image_points()[..9].to_vec();
    let straight = undistort_points(&result.camera, &new.intrinsics, &row);
    let (a, b) = (straight[0], straight[8]);
    let dir = (b - a).normalize();
    for p in &straight {
        let off = (p - a).perp(&dir).abs();
        assert!(off < 0.01, "row point {off} px off the line");
    }
}

#[test]
fn two_views_with_fixed_principal_point() {
    let truth = PinholeCamera::new(
        Intrinsics::new(800.0, 800.0, 319.5, 239.5),
        Distortion {
            k1: -0.1,
            ..Distortion::ZERO
        },
    );
    let views = render_views(&truth, &poses()[1..3], 0.0);
    let opts = CalibrationOptions {
        flags: CalibrationFlags {
            fix_principal_point: true,
            zero_tangent_dist: true,
            fix_k3: true,
        },
        ..CalibrationOptions::default()
    };

    let result = calibrate_camera(&views, SIZE, &opts).expect("calibrated");
    assert_eq!(result.camera.intrinsics.cx, 319.5);
    assert_eq!(result.camera.intrinsics.cy, 239.5);
    assert_eq!(result.camera.distortion.p1, 0.0);
    assert_eq!(result.camera.distortion.k3, 0.0);
    assert!(result.rms < 1e-3, "rms {}", result.rms);
    assert!((result.camera.intrinsics.fx - 800.0).abs() < 1.0);
}

#[test]
fn no_views_is_an_error() {
    assert_eq!(
        calibrate_camera(&[], SIZE, &CalibrationOptions::default()),
        Err(CalibrationError::InsufficientCorrespondences)
    );
}

/// Backend that gives up immediately.
struct GiveUp;

impl NllsSolver for GiveUp {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<f64>,
        _opts: &SolveOptions,
    ) -> (DVector<f64>, SolveReport) {
        let cost = problem.residuals(&x0).norm_squared();
        let report = SolveReport {
            iterations: 0,
            initial_cost: cost,
            final_cost: cost,
            termination: Termination::MaxIterations,
        };
        (x0, report)
    }
}

#[test]
fn unconverged_solver_is_reported_as_divergence() {
    let views = render_views(&ground_truth(), &poses(), 0.0);
    let err = calibrate_camera_with(&GiveUp, &views, SIZE, &CalibrationOptions::default())
        .expect_err("must not converge");
    assert!(matches!(err, CalibrationError::SolverDivergence { rms } if rms > 0.0));
}
