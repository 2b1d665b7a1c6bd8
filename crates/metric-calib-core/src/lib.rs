//! Core types and utilities for planar camera calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete corner detector, image decoder or optimizer.
//!
//! ## API map
//! - [`GridGeometry`]: canonical world points of a checkerboard's inner corners.
//! - [`CorrespondenceSet`]: one view's (world point, image point) pairs.
//! - [`Intrinsics`], [`Distortion`], [`PinholeCamera`], [`Extrinsics`]: the
//!   pinhole + Brown–Conrady camera model.
//! - [`Homography`]: normalized DLT plane-to-image homographies.
//! - [`GrayImage`], [`GrayImageView`]: minimal 8-bit grayscale buffers.

mod camera;
mod corner;
mod correspondence;
mod grid;
mod homography;
mod image;
mod logger;

pub use camera::{Distortion, Extrinsics, ImageSize, Intrinsics, PinholeCamera};
pub use corner::Corner;
pub use correspondence::{CorrespondenceError, CorrespondenceSet};
pub use grid::{GridGeometry, GridGeometryError};
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
