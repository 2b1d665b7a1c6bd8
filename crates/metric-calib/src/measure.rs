//! Pixel-to-metric conversion for a plane facing the camera.
//!
//! With the object plane parallel to the image plane at depth `Z`, a pixel
//! distance `d` along x spans `Z / fx * d` metres (and `Z / fy * d` along y).
//! The focal lengths must belong to the same image the points were picked
//! in; [`measure_query`] takes care of that for a calibrated camera.

use metric_calib_core::{ImageSize, Intrinsics};
use metric_calib_solve::{
    optimal_new_camera_matrix, undistort_points, NewCameraMatrix, UndistortError,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::store::CalibrationArtifact;

/// Points per query: top-left, top-right, bottom-left, bottom-right.
pub const QUERY_POINTS: usize = 4;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MeasureError {
    #[error("depth must be finite and positive, got {0}")]
    InvalidDepth(f64),
    #[error("focal lengths must be finite and positive, got fx={fx}, fy={fy}")]
    InvalidFocalLength { fx: f64, fy: f64 },
    #[error("expected {QUERY_POINTS} points, got {0}")]
    PointCount(usize),
    #[error("measurement points must be finite")]
    NonFinitePoint,
    #[error(transparent)]
    Undistort(#[from] UndistortError),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub width_px: f64,
    pub height_px: f64,
    pub width_m: f64,
    pub height_m: f64,
}

/// Image the query points were picked in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSpace {
    /// The original camera image; points are undistorted before measuring.
    #[default]
    Distorted,
    /// The image already undistorted with the optimal new camera matrix.
    Undistorted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementQuery {
    /// Camera-to-plane distance in metres.
    pub depth_m: f64,
    /// Four object corners in pixels, see [`QUERY_POINTS`].
    pub points: Vec<Point2<f64>>,
    #[serde(default)]
    pub space: PointSpace,
}

/// Measurement together with the camera model it was taken with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub new_camera: NewCameraMatrix,
    /// Query points in the undistorted image.
    pub points: Vec<Point2<f64>>,
    pub result: MeasurementResult,
}

/// Width from `points[0] -> points[1]`, height from `points[0] -> points[2]`.
///
/// Coincident points give a zero dimension, not an error.
pub fn measure_planar(
    fx: f64,
    fy: f64,
    depth_m: f64,
    points: &[Point2<f64>],
) -> Result<MeasurementResult, MeasureError> {
    if !(depth_m.is_finite() && depth_m > 0.0) {
        return Err(MeasureError::InvalidDepth(depth_m));
    }
    if !(fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0) {
        return Err(MeasureError::InvalidFocalLength { fx, fy });
    }
    let [p0, p1, p2, _] = points else {
        return Err(MeasureError::PointCount(points.len()));
    };
    if points.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(MeasureError::NonFinitePoint);
    }

    let width_px = (p1 - p0).norm();
    let height_px = (p2 - p0).norm();
    Ok(MeasurementResult {
        width_px,
        height_px,
        width_m: depth_m / fx * width_px,
        height_m: depth_m / fy * height_px,
    })
}

/// Measure with a stored calibration on an image of `size`.
///
/// The measuring camera is the optimal new camera matrix for `alpha`.
/// Points taken in the original image are first mapped into that camera.
pub fn measure_query(
    artifact: &CalibrationArtifact,
    size: ImageSize,
    alpha: f64,
    query: &MeasurementQuery,
) -> Result<MeasurementReport, MeasureError> {
    let new_camera = optimal_new_camera_matrix(&artifact.camera, size, alpha)?;
    let points = match query.space {
        PointSpace::Distorted => {
            undistort_points(&artifact.camera, &new_camera.intrinsics, &query.points)
        }
        PointSpace::Undistorted => query.points.clone(),
    };
    let Intrinsics { fx, fy, .. } = new_camera.intrinsics;
    let result = measure_planar(fx, fy, query.depth_m, &points)?;
    log::debug!(
        "measured with fx={:.2} fy={:.2} at Z={} m: {:.4} x {:.4} m",
        fx,
        fy,
        query.depth_m,
        result.width_m,
        result.height_m
    );

    Ok(MeasurementReport {
        new_camera,
        points,
        result,
    })
}
