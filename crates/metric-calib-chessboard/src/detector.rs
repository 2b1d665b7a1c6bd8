use std::sync::Arc;

use crate::grid_growth::{canonicalize_orientation, find_board_window, GridGrower};
use crate::params::ChessboardParams;
use crate::subpix::refine_corners;
use log::{debug, info};
use metric_calib_core::{
    Corner, CorrespondenceError, CorrespondenceSet, GrayImageView, GridGeometry,
};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Ordered inner corners of one checkerboard view.
#[derive(Clone, Debug)]
pub struct ChessboardDetection {
    pub cols: usize,
    pub rows: usize,
    /// `cols * rows` points, row-major with `i` fastest.
    pub points: Vec<Point2<f64>>,
    /// The board's `cols` side runs closer to the image vertical.
    pub transposed: bool,
}

impl ChessboardDetection {
    pub fn into_correspondences(
        self,
        grid: Arc<GridGeometry>,
    ) -> Result<CorrespondenceSet, CorrespondenceError> {
        CorrespondenceSet::new(grid, self.points)
    }
}

/// Extracts the inner corners of a `cols x rows` checkerboard from a cloud of
/// ChESS corners.
#[derive(Clone, Debug)]
pub struct ChessboardDetector {
    cols: usize,
    rows: usize,
    params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(grid: &GridGeometry, params: ChessboardParams) -> Self {
        Self {
            cols: grid.cols(),
            rows: grid.rows(),
            params,
        }
    }

    pub fn params(&self) -> &ChessboardParams {
        &self.params
    }

    /// Assemble the board from raw corners without touching pixels.
    ///
    /// Returns pixel positions in board order, or `None` when the board
    /// cannot be found unambiguously.
    pub fn assemble(&self, corners: &[Corner]) -> Option<(Vec<Point2<f32>>, bool)> {
        let strong: Vec<Point2<f32>> = corners
            .iter()
            .filter(|c| c.strength >= self.params.min_corner_strength)
            .filter(|c| c.position.x.is_finite() && c.position.y.is_finite())
            .map(|c| c.position)
            .collect();

        debug!(
            "{} of {} corners pass the strength filter",
            strong.len(),
            corners.len()
        );
        if strong.len() < self.cols * self.rows {
            return None;
        }

        let grower = GridGrower::new(&strong, &self.params.growth);
        for seed in grower.seeds() {
            let Some(labels) = grower.grow_from(seed) else {
                continue;
            };
            let Some(window) = find_board_window(&labels, self.cols, self.rows) else {
                continue;
            };

            let mut points: Vec<Point2<f32>> = (0..self.rows)
                .flat_map(|b| (0..self.cols).map(move |a| (a, b)))
                .map(|(a, b)| strong[labels[&window.cell(a, b)]])
                .collect();
            let transposed = canonicalize_orientation(&mut points, self.cols, self.rows);
            debug!(
                "board assembled from seed {} ({} labelled, transposed: {})",
                seed,
                labels.len(),
                transposed
            );
            return Some((points, transposed));
        }
        None
    }

    /// Find the board and refine its corners on `image`.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip(self, image, corners),
            fields(num_corners = corners.len(), cols = self.cols, rows = self.rows)
        )
    )]
    pub fn detect_from_corners(
        &self,
        image: &GrayImageView<'_>,
        corners: &[Corner],
    ) -> Option<ChessboardDetection> {
        let Some((raw, transposed)) = self.assemble(corners) else {
            info!(
                "no {}x{} chessboard among {} corners",
                self.cols,
                self.rows,
                corners.len()
            );
            return None;
        };

        let mut points: Vec<Point2<f64>> = raw
            .iter()
            .map(|p| Point2::new(p.x as f64, p.y as f64))
            .collect();
        if let Some(subpix) = &self.params.subpix {
            refine_corners(image, &mut points, subpix);
        }

        Some(ChessboardDetection {
            cols: self.cols,
            rows: self.rows,
            points,
            transposed,
        })
    }
}
