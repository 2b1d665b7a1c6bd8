//! Planar camera calibration.
//!
//! Given several views of a checkerboard ([`metric_calib_core::CorrespondenceSet`]),
//! [`calibrate_camera`] estimates one pinhole camera with 5-parameter
//! Brown–Conrady distortion and one pose per view:
//!
//! 1. per-view homographies (normalized DLT),
//! 2. closed-form intrinsics ([`linear::zhang`]) or a centred-principal-point
//!    fallback ([`linear::focal`]),
//! 3. per-view poses from homography decomposition ([`linear::planar_pose`]),
//! 4. joint Levenberg–Marquardt refinement of all parameters ([`lm`]).
//!
//! The optimizer is pluggable through [`NllsSolver`]. The crate also hosts
//! the reprojection error evaluator and the undistortion helpers.

mod calibrate;
pub mod linear;
pub mod lm;
mod problem;
mod reprojection;
mod undistort;

pub use calibrate::{
    calibrate_camera, calibrate_camera_with, initial_guess, CalibrationError, CalibrationFlags,
    CalibrationOptions, CalibrationResult,
};
pub use lm::{LevenbergMarquardt, NllsProblem, NllsSolver, SolveOptions, SolveReport, Termination};
pub use problem::PlanarCalibrationProblem;
pub use reprojection::{reprojection_error, ReprojectionError, ReprojectionStats};
pub use undistort::{
    optimal_new_camera_matrix, undistort_image, undistort_point, undistort_points,
    NewCameraMatrix, PixelRect, UndistortError,
};
