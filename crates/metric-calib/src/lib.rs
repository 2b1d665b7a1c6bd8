//! Checkerboard camera calibration and planar metric measurement.
//!
//! This crate provides:
//! - re-exports of the underlying `metric-calib-*` crates,
//! - the calibration artifact store and planar measurement,
//! - (feature `image`) a ChESS corner adapter (`chess-corners`) and the batch
//!   pipeline that turns a folder of board images into a calibration,
//! - (feature `cli`) the `metric-calib` binary.
//!
//! ## Quickstart
//!
//! ```no_run
//! use metric_calib::config::CalibrateConfig;
//! use metric_calib::pipeline::run_calibration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = CalibrateConfig::default();
//! let report = run_calibration(&cfg)?;
//! println!("rms: {:.4} px", report.result.rms);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `metric_calib::core`: camera model, grid geometry, correspondences, images.
//! - `metric_calib::chessboard`: board assembly from X-corners + sub-pixel refinement.
//! - `metric_calib::solve`: calibration, reprojection error, undistortion.
//! - `metric_calib::store`: `{K, dist, reprojection_error}` JSON artifact.
//! - `metric_calib::measure`: pixel-to-metric conversion on a fronto-parallel plane.
//! - `metric_calib::config`: run configurations.
//! - `metric_calib::detect`, `metric_calib::pipeline` (feature `image`).

pub use metric_calib_chessboard as chessboard;
pub use metric_calib_core as core;
pub use metric_calib_solve as solve;

pub mod config;
pub mod measure;
pub mod store;

#[cfg(feature = "image")]
pub mod detect;
#[cfg(feature = "image")]
pub mod pipeline;

pub use measure::{
    measure_planar, measure_query, MeasureError, MeasurementQuery, MeasurementResult, PointSpace,
};
pub use metric_calib_chessboard::ChessboardParams;
pub use metric_calib_core::{GridGeometry, ImageSize, PinholeCamera};
pub use metric_calib_solve::{calibrate_camera, CalibrationOptions, CalibrationResult};
pub use store::{load_calibration, save_calibration, CalibrationArtifact, StoreError};
