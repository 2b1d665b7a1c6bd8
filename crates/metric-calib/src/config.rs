//! Run configurations, loadable from JSON.
//!
//! Every field has a default, so a config file only needs the values that
//! differ from a stock run.

use std::fs;
use std::path::{Path, PathBuf};

use metric_calib_chessboard::ChessboardParams;
use metric_calib_core::{GridGeometry, GridGeometryError};
use metric_calib_solve::CalibrationOptions;
use nalgebra::Point2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::measure::{MeasurementQuery, PointSpace};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode JSON: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Inner-corner count of the calibration board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub cols: usize,
    pub rows: usize,
}

impl Default for BoardConfig {
    /// A board of 13x10 squares.
    fn default() -> Self {
        Self { cols: 12, rows: 9 }
    }
}

impl BoardConfig {
    pub fn geometry(&self) -> Result<GridGeometry, GridGeometryError> {
        GridGeometry::new(self.cols, self.rows)
    }
}

/// ChESS corner detector settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerDetectorConfig {
    /// Response threshold relative to the strongest response in the image.
    pub threshold_rel: f32,
    pub nms_radius: u32,
}

impl Default for CornerDetectorConfig {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrateConfig {
    /// Directory holding the board images.
    pub image_dir: PathBuf,
    /// Only files whose name starts with this prefix are used.
    pub file_prefix: String,
    /// Accepted file extensions, compared case-insensitively.
    pub extensions: Vec<String>,
    pub board: BoardConfig,
    pub corners: CornerDetectorConfig,
    pub chessboard: ChessboardParams,
    pub calibration: CalibrationOptions,
    /// Where the calibration artifact is written.
    pub output: PathBuf,
}

impl Default for CalibrateConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("calibration_img"),
            file_prefix: "image".to_string(),
            extensions: vec!["jpeg".to_string(), "jpg".to_string(), "png".to_string()],
            board: BoardConfig::default(),
            corners: CornerDetectorConfig::default(),
            chessboard: ChessboardParams::default(),
            calibration: CalibrationOptions::default(),
            output: PathBuf::from("calibration_data.json"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Calibration artifact written by a calibration run.
    pub calibration: PathBuf,
    /// Image the points were picked in; only its size is needed.
    pub image: PathBuf,
    /// Free scaling of the new camera matrix: 0 crops to valid pixels,
    /// 1 keeps every source pixel.
    pub alpha: f64,
    pub query: MeasurementQuery,
}

impl Default for MeasureConfig {
    /// A book photographed from 2.2 m.
    fn default() -> Self {
        Self {
            calibration: PathBuf::from("calibration_data.json"),
            image: PathBuf::from("detection_img/book.jpg"),
            alpha: 1.0,
            query: MeasurementQuery {
                depth_m: 2.2,
                points: vec![
                    Point2::new(1404.0, 2364.0),
                    Point2::new(1648.0, 2352.0),
                    Point2::new(1410.0, 2682.0),
                    Point2::new(1664.0, 2682.0),
                ],
                space: PointSpace::Distorted,
            },
        }
    }
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value).map_err(ConfigError::Encode)?;
    fs::write(path, json).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
