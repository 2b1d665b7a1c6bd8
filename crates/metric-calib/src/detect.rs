use crate::config::CornerDetectorConfig;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use metric_calib_chessboard::{ChessboardDetection, ChessboardDetector, ChessboardParams};
use metric_calib_core::{
    Corner, CorrespondenceError, CorrespondenceSet, GrayImageView, GridGeometry,
};
use nalgebra::Point2;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// `chess-corners` settings for a given detector config.
pub fn chess_config(cfg: &CornerDetectorConfig) -> ChessConfig {
    let mut chess = ChessConfig::single_scale();
    chess.params.threshold_rel = cfg.threshold_rel as _;
    chess.params.nms_radius = cfg.nms_radius as _;
    chess
}

/// Settings that work for well-lit, in-focus board photos.
pub fn default_chess_config() -> ChessConfig {
    chess_config(&CornerDetectorConfig::default())
}

/// Borrow an `image::GrayImage` as a core image view.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Detect ChESS corners and adapt them into [`metric_calib_core::Corner`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, cfg), fields(width = img.width(), height = img.height()))
)]
pub fn detect_corners(img: &::image::GrayImage, cfg: &ChessConfig) -> Vec<Corner> {
    find_chess_corners_image(img, cfg)
        .iter()
        .map(adapt_chess_corner)
        .collect()
}

/// Run the extractor end-to-end: ChESS corners, board assembly, sub-pixel
/// refinement. `None` means the board was not found.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(img, chess_cfg, grid, params),
        fields(width = img.width(), height = img.height())
    )
)]
pub fn detect_chessboard(
    img: &::image::GrayImage,
    chess_cfg: &ChessConfig,
    grid: &GridGeometry,
    params: ChessboardParams,
) -> Option<ChessboardDetection> {
    let corners = detect_corners(img, chess_cfg);
    let detector = ChessboardDetector::new(grid, params);
    detector.detect_from_corners(&gray_view(img), &corners)
}

/// Ordered correspondences for one image, `Ok(None)` when the board is not
/// found.
///
/// An error means the assembled board does not match `grid`, which is a
/// detector defect rather than a missing board.
pub fn extract_correspondences(
    img: &::image::GrayImage,
    chess_cfg: &ChessConfig,
    grid: &Arc<GridGeometry>,
    params: ChessboardParams,
) -> Result<Option<CorrespondenceSet>, CorrespondenceError> {
    board_correspondences(detect_chessboard(img, chess_cfg, grid, params), grid)
}

fn board_correspondences(
    detection: Option<ChessboardDetection>,
    grid: &Arc<GridGeometry>,
) -> Result<Option<CorrespondenceSet>, CorrespondenceError> {
    detection
        .map(|d| d.into_correspondences(grid.clone()))
        .transpose()
}

fn adapt_chess_corner(c: &CornerDescriptor) -> Corner {
    Corner::new(c.x, c.y, c.response)
}
