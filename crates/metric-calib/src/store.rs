//! Persisted calibration artifact.
//!
//! On disk the artifact is a JSON object:
//!
//! ```json
//! {
//!   "K": [[fx, 0, cx], [0, fy, cy], [0, 0, 1]],
//!   "dist": [k1, k2, p1, p2, k3],
//!   "reprojection_error": 0.21
//! }
//! ```
//!
//! Floats are written in shortest round-trip form, so loading reproduces the
//! saved values bit for bit.

use std::fs;
use std::path::{Path, PathBuf};

use metric_calib_core::{Distortion, Intrinsics, PinholeCamera};
use metric_calib_solve::CalibrationResult;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Everything the measurement step needs from a calibration run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationArtifact {
    pub camera: PinholeCamera,
    /// RMS reprojection error of the calibration, in pixels.
    pub reprojection_error: f64,
}

impl CalibrationArtifact {
    pub fn new(camera: PinholeCamera, reprojection_error: f64) -> Self {
        Self {
            camera,
            reprojection_error,
        }
    }
}

impl From<&CalibrationResult> for CalibrationArtifact {
    fn from(result: &CalibrationResult) -> Self {
        Self::new(result.camera, result.rms)
    }
}

/// Failure to write or load an artifact. Every load variant means the file
/// cannot be used as a calibration.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
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
    #[error("malformed calibration artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode calibration artifact: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("expected 5 distortion coefficients, found {0}")]
    DistortionLength(usize),
    #[error("calibration artifact holds non-finite values")]
    NonFinite,
    #[error("camera matrix has non-positive focal length")]
    InvalidIntrinsics,
}

#[derive(Serialize, Deserialize)]
struct ArtifactFile {
    #[serde(rename = "K")]
    k: [[f64; 3]; 3],
    dist: Vec<f64>,
    reprojection_error: f64,
}

impl From<&CalibrationArtifact> for ArtifactFile {
    fn from(a: &CalibrationArtifact) -> Self {
        let k = a.camera.intrinsics.k_matrix();
        Self {
            k: std::array::from_fn(|r| std::array::from_fn(|c| k[(r, c)])),
            dist: a.camera.distortion.to_array().to_vec(),
            reprojection_error: a.reprojection_error,
        }
    }
}

impl TryFrom<ArtifactFile> for CalibrationArtifact {
    type Error = StoreError;

    fn try_from(file: ArtifactFile) -> Result<Self, StoreError> {
        let finite = file.k.iter().flatten().all(|v| v.is_finite())
            && file.dist.iter().all(|v| v.is_finite())
            && file.reprojection_error.is_finite();
        if !finite {
            return Err(StoreError::NonFinite);
        }

        let distortion = Distortion::from_slice(&file.dist)
            .ok_or(StoreError::DistortionLength(file.dist.len()))?;
        let k = Matrix3::from_fn(|r, c| file.k[r][c]);
        let intrinsics = Intrinsics::from_k_matrix(&k);
        if !intrinsics.is_valid() {
            return Err(StoreError::InvalidIntrinsics);
        }

        Ok(Self::new(
            PinholeCamera::new(intrinsics, distortion),
            file.reprojection_error,
        ))
    }
}

/// Serialize an artifact to pretty JSON.
pub fn artifact_to_json(artifact: &CalibrationArtifact) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ArtifactFile::from(artifact))
}

pub fn save_calibration(
    path: impl AsRef<Path>,
    artifact: &CalibrationArtifact,
) -> Result<(), StoreError> {
    let path = path.as_ref();
    let json = artifact_to_json(artifact).map_err(StoreError::Encode)?;
    fs::write(path, json).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("calibration saved to {}", path.display());
    Ok(())
}

pub fn load_calibration(path: impl AsRef<Path>) -> Result<CalibrationArtifact, StoreError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ArtifactFile = serde_json::from_str(&data).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    CalibrationArtifact::try_from(file)
}
