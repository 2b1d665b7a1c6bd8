use crate::linear::{
    intrinsics_from_homographies, intrinsics_with_centered_principal_point, pose_from_homography,
};
use crate::lm::{LevenbergMarquardt, NllsProblem, NllsSolver, SolveOptions, SolveReport};
use crate::problem::PlanarCalibrationProblem;
use crate::reprojection::{reprojection_error, ReprojectionError};
use log::{debug, info, warn};
use metric_calib_core::{
    estimate_homography, CorrespondenceSet, Distortion, Extrinsics, ImageSize, Intrinsics,
    PinholeCamera,
};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fewer views than this still calibrate, but the estimate is poorly
/// constrained.
const RECOMMENDED_VIEWS: usize = 5;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("no views to calibrate from")]
    InsufficientCorrespondences,
    #[error("views do not share one board geometry")]
    MixedGeometry,
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("could not initialize the pose of view {view}")]
    PoseInitialization { view: usize },
    #[error("refinement did not converge (rms {rms:.4} px)")]
    SolverDivergence { rms: f64 },
    #[error(transparent)]
    Reprojection(#[from] ReprojectionError),
}

/// Parameters held at their initial value during refinement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationFlags {
    /// Keep the principal point at the image centre.
    pub fix_principal_point: bool,
    /// Force `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    /// Force `k3 = 0`.
    pub fix_k3: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    pub flags: CalibrationFlags,
    pub solve: SolveOptions,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera: PinholeCamera,
    /// One pose per input view, board frame to camera frame.
    pub extrinsics: Vec<Extrinsics>,
    /// Overall RMS reprojection error in pixels.
    pub rms: f64,
    pub per_view_rms: Vec<f64>,
    pub report: SolveReport,
}

fn plausible(k: &Intrinsics, size: ImageSize) -> bool {
    let (w, h) = (size.width as f64, size.height as f64);
    let ratio = k.fx / k.fy;
    k.is_valid()
        && (0.0..=w).contains(&k.cx)
        && (0.0..=h).contains(&k.cy)
        && (0.5..=2.0).contains(&ratio)
}

/// Closed-form starting point: camera without distortion plus one pose per
/// view.
///
/// Uses the full closed form when at least three views are available and the
/// principal point is free; otherwise (or if that result is implausible) pins
/// the principal point at the image centre.
pub fn initial_guess(
    views: &[CorrespondenceSet],
    size: ImageSize,
    flags: &CalibrationFlags,
) -> Result<(PinholeCamera, Vec<Extrinsics>), CalibrationError> {
    let homographies = views
        .iter()
        .enumerate()
        .map(|(view, set)| {
            let (world, image) = set.planar_pairs();
            estimate_homography(&world, &image)
                .map(|h| h.h)
                .ok_or(CalibrationError::PoseInitialization { view })
        })
        .collect::<Result<Vec<Matrix3<f64>>, _>>()?;

    let closed_form = if homographies.len() >= 3 && !flags.fix_principal_point {
        intrinsics_from_homographies(&homographies)
            .map(|k| Intrinsics { skew: 0.0, ..k })
            .filter(|k| plausible(k, size))
    } else {
        None
    };
    let intrinsics = match closed_form {
        Some(k) => k,
        None => {
            debug!("using centred principal point initialization");
            intrinsics_with_centered_principal_point(&homographies, size)
        }
    };
    debug!(
        "initial intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
    );

    let extrinsics = homographies
        .iter()
        .enumerate()
        .map(|(view, h)| {
            pose_from_homography(&intrinsics, h)
                .ok_or(CalibrationError::PoseInitialization { view })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((PinholeCamera::new(intrinsics, Distortion::ZERO), extrinsics))
}

/// Calibrate one camera from several views of the same board with the
/// default Levenberg–Marquardt backend.
pub fn calibrate_camera(
    views: &[CorrespondenceSet],
    size: ImageSize,
    opts: &CalibrationOptions,
) -> Result<CalibrationResult, CalibrationError> {
    calibrate_camera_with(&LevenbergMarquardt::new(), views, size, opts)
}

#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(solver, views, opts),
        fields(num_views = views.len(), width = size.width, height = size.height)
    )
)]
pub fn calibrate_camera_with<S: NllsSolver>(
    solver: &S,
    views: &[CorrespondenceSet],
    size: ImageSize,
    opts: &CalibrationOptions,
) -> Result<CalibrationResult, CalibrationError> {
    let Some(first) = views.first() else {
        return Err(CalibrationError::InsufficientCorrespondences);
    };
    if size.width == 0 || size.height == 0 {
        return Err(CalibrationError::InvalidImageSize {
            width: size.width,
            height: size.height,
        });
    }
    let grid = first.grid();
    if views
        .iter()
        .any(|v| !Arc::ptr_eq(v.grid(), grid) && v.grid().as_ref() != grid.as_ref())
    {
        return Err(CalibrationError::MixedGeometry);
    }
    if views.len() < RECOMMENDED_VIEWS {
        warn!(
            "calibrating from {} views; at least {} are recommended",
            views.len(),
            RECOMMENDED_VIEWS
        );
    }

    let (camera0, extrinsics0) = initial_guess(views, size, &opts.flags)?;
    let problem = PlanarCalibrationProblem::new(views, &camera0, &extrinsics0, &opts.flags);
    debug!(
        "refining {} parameters against {} residuals",
        problem.num_params(),
        problem.num_residuals()
    );

    let (x, report) = solver.solve(&problem, problem.initial_params(), &opts.solve);
    let (camera, extrinsics) = problem.unpack(&x);
    let stats = reprojection_error(&camera, &extrinsics, views)?;

    debug!(
        "solver stopped after {} iterations ({:?}), cost {:.6e} -> {:.6e}",
        report.iterations, report.termination, report.initial_cost, report.final_cost
    );
    if !report.converged() || !camera.intrinsics.is_valid() || !stats.rms.is_finite() {
        return Err(CalibrationError::SolverDivergence { rms: stats.rms });
    }

    info!(
        "calibrated from {} views: rms {:.4} px, fx={:.2} fy={:.2}",
        views.len(),
        stats.rms,
        camera.intrinsics.fx,
        camera.intrinsics.fy
    );

    Ok(CalibrationResult {
        camera,
        extrinsics,
        rms: stats.rms,
        per_view_rms: stats.per_view_rms,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use metric_calib_core::GridGeometry;
    use nalgebra::{Point2, Vector3};

    const SIZE: ImageSize = ImageSize {
        width: 640,
        height: 480,
    };

    fn view(
        grid: &Arc<GridGeometry>,
        camera: &PinholeCamera,
        pose: &Extrinsics,
    ) -> CorrespondenceSet {
        let pts: Vec<Point2<f64>> = grid
            .points()
            .iter()
            .map(|p| camera.project(&pose.transform_point(p)))
            .collect();
        CorrespondenceSet::new(grid.clone(), pts).expect("set")
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = calibrate_camera(&[], SIZE, &CalibrationOptions::default());
        assert_eq!(err, Err(CalibrationError::InsufficientCorrespondences));
    }

    #[test]
    fn mixed_boards_are_rejected() {
        let k = Intrinsics::new(500.0, 500.0, 320.0, 240.0);
        let camera = PinholeCamera::new(k, Distortion::ZERO);
        let pose = Extrinsics::new(Vector3::new(0.1, 0.1, 0.0), Vector3::new(-2.0, -2.0, 10.0));
        let a = Arc::new(GridGeometry::new(5, 4).expect("grid"));
        let b = Arc::new(GridGeometry::new(6, 4).expect("grid"));
        let views = [view(&a, &camera, &pose), view(&b, &camera, &pose)];
        let err = calibrate_camera(&views, SIZE, &CalibrationOptions::default());
        assert_eq!(err, Err(CalibrationError::MixedGeometry));
    }

    #[test]
    fn single_view_initial_guess_centres_principal_point() {
        let k = Intrinsics::new(600.0, 600.0, 319.5, 239.5);
        let camera = PinholeCamera::new(k, Distortion::ZERO);
        let pose = Extrinsics::new(Vector3::new(0.3, -0.2, 0.1), Vector3::new(-3.0, -2.0, 12.0));
        let grid = Arc::new(GridGeometry::new(7, 5).expect("grid"));
        let views = [view(&grid, &camera, &pose)];

        let (cam, poses) = initial_guess(&views, SIZE, &CalibrationFlags::default()).expect("init");
        assert_eq!(cam.intrinsics.cx, 319.5);
        assert_eq!(cam.intrinsics.cy, 239.5);
        let fx = cam.intrinsics.fx;
        assert!((fx - 600.0).abs() < 1.0, "fx = {fx}");
        assert_eq!(poses.len(), 1);
        assert!(poses[0].translation.z > 0.0);
    }
}
