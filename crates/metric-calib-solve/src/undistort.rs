//! Optimal new camera matrix and undistortion.
//!
//! The new matrix describes a distortion-free camera. `alpha = 0` zooms in
//! until every pixel of the undistorted image is valid; `alpha = 1` zooms out
//! until every source pixel is kept (with black borders).

use metric_calib_core::{
    sample_bilinear_u8, GrayImage, GrayImageView, ImageSize, Intrinsics, PinholeCamera,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UndistortError {
    #[error("image size {width}x{height} is too small")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("alpha must lie in [0, 1], got {0}")]
    InvalidAlpha(f64),
    #[error("undistorted image footprint is degenerate")]
    Degenerate,
}

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewCameraMatrix {
    pub intrinsics: Intrinsics,
    /// Region of the undistorted image where every pixel has a source.
    pub valid_roi: PixelRect,
}

/// Samples per side of the grid used to trace the image border.
const GRID: usize = 9;

#[derive(Clone, Copy, Debug)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Inscribed and bounding rectangles of the undistorted image footprint,
/// mapped through `map`.
fn footprint(size: ImageSize, map: impl Fn(Point2<f64>) -> Point2<f64>) -> (Rect, Rect) {
    let (w, h) = (size.width as f64, size.height as f64);
    let (mut ix0, mut ix1, mut iy0, mut iy1) = (f64::MIN, f64::MAX, f64::MIN, f64::MAX);
    let (mut ox0, mut ox1, mut oy0, mut oy1) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);

    for gy in 0..GRID {
        for gx in 0..GRID {
            let src = Point2::new(
                gx as f64 * w / (GRID - 1) as f64,
                gy as f64 * h / (GRID - 1) as f64,
            );
            let p = map(src);
            ox0 = ox0.min(p.x);
            ox1 = ox1.max(p.x);
            oy0 = oy0.min(p.y);
            oy1 = oy1.max(p.y);
            if gx == 0 {
                ix0 = ix0.max(p.x);
            }
            if gx == GRID - 1 {
                ix1 = ix1.min(p.x);
            }
            if gy == 0 {
                iy0 = iy0.max(p.y);
            }
            if gy == GRID - 1 {
                iy1 = iy1.min(p.y);
            }
        }
    }

    let inner = Rect {
        x: ix0,
        y: iy0,
        width: ix1 - ix0,
        height: iy1 - iy0,
    };
    let outer = Rect {
        x: ox0,
        y: oy0,
        width: ox1 - ox0,
        height: oy1 - oy0,
    };
    (inner, outer)
}

/// Compute the distortion-free camera matrix for an image of `size`.
pub fn optimal_new_camera_matrix(
    camera: &PinholeCamera,
    size: ImageSize,
    alpha: f64,
) -> Result<NewCameraMatrix, UndistortError> {
    if size.width < 2 || size.height < 2 {
        return Err(UndistortError::InvalidImageSize {
            width: size.width,
            height: size.height,
        });
    }
    if !(0.0..=1.0).contains(&alpha) {
        return Err(UndistortError::InvalidAlpha(alpha));
    }

    // Footprint in normalized coordinates.
    let to_normalized = |p: Point2<f64>| Point2::from(camera.undistort_pixel(&p));
    let (inner, outer) = footprint(size, to_normalized);
    if !(inner.width > 0.0 && inner.height > 0.0 && outer.width > 0.0 && outer.height > 0.0) {
        return Err(UndistortError::Degenerate);
    }

    let (w1, h1) = (size.width as f64 - 1.0, size.height as f64 - 1.0);

    // Inner rectangle fills the viewport.
    let fx0 = w1 / inner.width;
    let fy0 = h1 / inner.height;
    let cx0 = -fx0 * inner.x;
    let cy0 = -fy0 * inner.y;

    // Outer rectangle fills the viewport.
    let fx1 = w1 / outer.width;
    let fy1 = h1 / outer.height;
    let cx1 = -fx1 * outer.x;
    let cy1 = -fy1 * outer.y;

    let intrinsics = Intrinsics::new(
        fx0 * (1.0 - alpha) + fx1 * alpha,
        fy0 * (1.0 - alpha) + fy1 * alpha,
        cx0 * (1.0 - alpha) + cx1 * alpha,
        cy0 * (1.0 - alpha) + cy1 * alpha,
    );
    if !intrinsics.is_valid() {
        return Err(UndistortError::Degenerate);
    }

    // Valid region: the inscribed rectangle in the new pixel frame.
    let (roi_inner, _) = footprint(size, |p| {
        intrinsics.normalized_to_pixel(&camera.undistort_pixel(&p))
    });
    let x0 = roi_inner.x.ceil().max(0.0);
    let y0 = roi_inner.y.ceil().max(0.0);
    let x1 = (roi_inner.x + roi_inner.width).floor().min(size.width as f64);
    let y1 = (roi_inner.y + roi_inner.height).floor().min(size.height as f64);
    let valid_roi = PixelRect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0).max(0.0) as u32,
        height: (y1 - y0).max(0.0) as u32,
    };

    Ok(NewCameraMatrix {
        intrinsics,
        valid_roi,
    })
}

/// Map a pixel of the original (distorted) image into the undistorted image
/// described by `new_k`.
#[inline]
pub fn undistort_point(camera: &PinholeCamera, new_k: &Intrinsics, p: Point2<f64>) -> Point2<f64> {
    new_k.normalized_to_pixel(&camera.undistort_pixel(&p))
}

pub fn undistort_points(
    camera: &PinholeCamera,
    new_k: &Intrinsics,
    points: &[Point2<f64>],
) -> Vec<Point2<f64>> {
    points
        .iter()
        .map(|&p| undistort_point(camera, new_k, p))
        .collect()
}

/// Resample `src` into the undistorted image of the same size described by
/// `new_k`. Pixels with no source are black.
pub fn undistort_image(
    src: &GrayImageView<'_>,
    camera: &PinholeCamera,
    new_k: &Intrinsics,
) -> GrayImage {
    let mut out = GrayImage::new(src.width, src.height);
    for y in 0..src.height {
        for x in 0..src.width {
            let n = new_k.pixel_to_normalized(&Point2::new(x as f64, y as f64));
            let d = camera.distortion.distort(&n);
            let s = camera.intrinsics.normalized_to_pixel(&d);
            if let Some(v) = sample_bilinear_u8(src, s.x, s.y) {
                out.set(x, y, v);
            }
        }
    }
    out
}
