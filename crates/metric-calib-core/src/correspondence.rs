use std::sync::Arc;

use nalgebra::{Point2, Point3};
use thiserror::Error;

use crate::grid::GridGeometry;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrespondenceError {
    #[error("expected {expected} image points for the board, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// One view's ordered (world point, image point) pairs.
///
/// The grid is shared across views; image point `k` corresponds to
/// `grid.points()[k]`.
#[derive(Clone, Debug)]
pub struct CorrespondenceSet {
    grid: Arc<GridGeometry>,
    image_points: Vec<Point2<f64>>,
}

impl CorrespondenceSet {
    pub fn new(
        grid: Arc<GridGeometry>,
        image_points: Vec<Point2<f64>>,
    ) -> Result<Self, CorrespondenceError> {
        if image_points.len() != grid.len() {
            return Err(CorrespondenceError::CountMismatch {
                expected: grid.len(),
                actual: image_points.len(),
            });
        }
        Ok(Self { grid, image_points })
    }

    pub fn grid(&self) -> &Arc<GridGeometry> {
        &self.grid
    }

    pub fn world_points(&self) -> &[Point3<f64>] {
        self.grid.points()
    }

    pub fn image_points(&self) -> &[Point2<f64>] {
        &self.image_points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Point3<f64>, &Point2<f64>)> {
        self.grid.points().iter().zip(self.image_points.iter())
    }

    /// Board-plane coordinates `(X, Y)` paired with image points, as the
    /// homography estimator wants them.
    pub fn planar_pairs(&self) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
        let world = self
            .grid
            .points()
            .iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect();
        (world, self.image_points.clone())
    }
}
