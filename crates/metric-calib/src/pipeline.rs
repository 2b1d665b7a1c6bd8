//! File-level runs: a folder of board images to a calibration artifact, and
//! a stored calibration plus an image to a measurement.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::image::{GrayImage, ImageError, ImageReader, Luma};
use log::{info, warn};
use metric_calib_core::{CorrespondenceError, CorrespondenceSet, GridGeometryError, ImageSize};
use metric_calib_solve::{
    calibrate_camera, optimal_new_camera_matrix, undistort_image, CalibrationError,
    CalibrationResult, NewCameraMatrix, UndistortError,
};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{CalibrateConfig, MeasureConfig};
use crate::detect::{chess_config, extract_correspondences, gray_view};
use crate::measure::{measure_query, MeasureError, MeasurementReport};
use crate::store::{load_calibration, save_calibration, CalibrationArtifact, StoreError};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("failed to list {path}: {source}")]
    ListDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no images matching {prefix}*.{{{extensions}}} in {dir}")]
    NoImages {
        dir: PathBuf,
        prefix: String,
        extensions: String,
    },
    #[error("failed to load image {path}: {source}")]
    Image { path: PathBuf, source: ImageError },
    #[error(
        "{path} is {found_w}x{found_h} but earlier images are {expected_w}x{expected_h}",
        found_w = .found.width,
        found_h = .found.height,
        expected_w = .expected.width,
        expected_h = .expected.height
    )]
    HeterogeneousImageSizes {
        path: PathBuf,
        expected: ImageSize,
        found: ImageSize,
    },
    #[error("inconsistent board detection in {path}: {source}")]
    Correspondence {
        path: PathBuf,
        source: CorrespondenceError,
    },
    #[error(transparent)]
    Board(#[from] GridGeometryError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Measure(#[from] MeasureError),
    #[error(transparent)]
    Undistort(#[from] UndistortError),
}

/// What happened to one calibration image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOutcome {
    Used,
    PatternNotFound,
}

#[derive(Clone, Debug, Serialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub outcome: ImageOutcome,
}

#[derive(Clone, Debug, Serialize)]
pub struct CalibrationReport {
    /// Every discovered image, in processing order.
    pub images: Vec<ImageRecord>,
    pub image_size: ImageSize,
    pub result: CalibrationResult,
}

impl CalibrationReport {
    pub fn num_used(&self) -> usize {
        self.images
            .iter()
            .filter(|r| r.outcome == ImageOutcome::Used)
            .count()
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Files in `dir` named `<prefix>*.<ext>`, sorted by path.
pub fn discover_images(
    dir: &Path,
    prefix: &str,
    extensions: &[String],
) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir).map_err(|source| PipelineError::ListDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::ListDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let prefixed = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix));
        if prefixed && path.is_file() && has_extension(&path, extensions) {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        return Err(PipelineError::NoImages {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            extensions: extensions.join(","),
        });
    }
    Ok(paths)
}

/// Decode an image file as 8-bit grayscale.
pub fn load_gray(path: &Path) -> Result<GrayImage, PipelineError> {
    let image_err = |source| PipelineError::Image {
        path: path.to_path_buf(),
        source,
    };
    let img = ImageReader::open(path)
        .map_err(|e| image_err(ImageError::IoError(e)))?
        .decode()
        .map_err(image_err)?;
    Ok(img.to_luma8())
}

fn image_size(img: &GrayImage) -> ImageSize {
    ImageSize::new(img.width(), img.height())
}

/// Extract correspondences from every image in parallel, then calibrate on
/// the images where the board was found.
///
/// An image that cannot be decoded aborts the run; an image without the
/// board is recorded and skipped.
pub fn calibrate_images(
    paths: &[PathBuf],
    cfg: &CalibrateConfig,
) -> Result<CalibrationReport, PipelineError> {
    let grid = Arc::new(cfg.board.geometry()?);
    let chess_cfg = chess_config(&cfg.corners);

    let extracted = paths
        .par_iter()
        .map(|path| {
            let img = load_gray(path)?;
            let found = extract_correspondences(&img, &chess_cfg, &grid, cfg.chessboard.clone())
                .map_err(|source| PipelineError::Correspondence {
                    path: path.clone(),
                    source,
                })?;
            Ok((image_size(&img), found))
        })
        .collect::<Result<Vec<(ImageSize, Option<CorrespondenceSet>)>, PipelineError>>()?;

    let mut size: Option<ImageSize> = None;
    let mut views = Vec::new();
    let mut images = Vec::with_capacity(paths.len());
    for (path, (img_size, found)) in paths.iter().zip(extracted) {
        let outcome = match found {
            Some(view) => {
                match size {
                    Some(expected) if expected != img_size => {
                        return Err(PipelineError::HeterogeneousImageSizes {
                            path: path.clone(),
                            expected,
                            found: img_size,
                        });
                    }
                    _ => size = Some(img_size),
                }
                views.push(view);
                info!("{}: board found", path.display());
                ImageOutcome::Used
            }
            None => {
                warn!("{}: board not found, skipping", path.display());
                ImageOutcome::PatternNotFound
            }
        };
        images.push(ImageRecord {
            path: path.clone(),
            outcome,
        });
    }

    let Some(image_size) = size else {
        return Err(CalibrationError::InsufficientCorrespondences.into());
    };
    info!(
        "calibrating from {} of {} images ({}x{})",
        views.len(),
        paths.len(),
        image_size.width,
        image_size.height
    );
    let result = calibrate_camera(&views, image_size, &cfg.calibration)?;

    Ok(CalibrationReport {
        images,
        image_size,
        result,
    })
}

/// Discover, calibrate and save the artifact to `cfg.output`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(cfg), fields(dir = %cfg.image_dir.display()))
)]
pub fn run_calibration(cfg: &CalibrateConfig) -> Result<CalibrationReport, PipelineError> {
    let paths = discover_images(&cfg.image_dir, &cfg.file_prefix, &cfg.extensions)?;
    info!("found {} candidate images", paths.len());
    let report = calibrate_images(&paths, cfg)?;
    save_calibration(&cfg.output, &CalibrationArtifact::from(&report.result))?;
    Ok(report)
}

/// Load the artifact and measure the configured query on the configured
/// image.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip(cfg)))]
pub fn run_measurement(cfg: &MeasureConfig) -> Result<MeasurementReport, PipelineError> {
    let artifact = load_calibration(&cfg.calibration)?;
    let (width, height) =
        ::image::image_dimensions(&cfg.image).map_err(|source| PipelineError::Image {
            path: cfg.image.clone(),
            source,
        })?;
    Ok(measure_query(
        &artifact,
        ImageSize::new(width, height),
        cfg.alpha,
        &cfg.query,
    )?)
}

/// Write the undistorted grayscale version of `input` to `output`.
pub fn undistort_file(
    artifact: &CalibrationArtifact,
    input: &Path,
    output: &Path,
    alpha: f64,
) -> Result<NewCameraMatrix, PipelineError> {
    let img = load_gray(input)?;
    let new_camera = optimal_new_camera_matrix(&artifact.camera, image_size(&img), alpha)?;
    let out = undistort_image(&gray_view(&img), &artifact.camera, &new_camera.intrinsics);
    let encoded = GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([out.get(x as usize, y as usize)])
    });
    encoded.save(output).map_err(|source| PipelineError::Image {
        path: output.to_path_buf(),
        source,
    })?;
    info!("undistorted image written to {}", output.display());
    Ok(new_camera)
}
