use nalgebra::Point3;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridGeometryError {
    #[error("checkerboard needs at least 2x2 inner corners, got {cols}x{rows}")]
    TooSmall { cols: usize, rows: usize },
}

/// World coordinates of a checkerboard's inner corners.
///
/// Corner `(i, j)` sits at `(i, j, 0)` in square units. Points are ordered
/// row-major with `i` varying fastest, so index `k` maps to
/// `(k % cols, k / cols)`. The correspondence extractor emits image points in
/// exactly this order.
#[derive(Clone, Debug, PartialEq)]
pub struct GridGeometry {
    cols: usize,
    rows: usize,
    points: Vec<Point3<f64>>,
}

impl GridGeometry {
    pub fn new(cols: usize, rows: usize) -> Result<Self, GridGeometryError> {
        if cols < 2 || rows < 2 {
            return Err(GridGeometryError::TooSmall { cols, rows });
        }
        let points = (0..rows)
            .flat_map(|j| (0..cols).map(move |i| Point3::new(i as f64, j as f64, 0.0)))
            .collect();
        Ok(Self { cols, rows, points })
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Linear index of corner `(i, j)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.cols + i
    }

    pub fn point(&self, i: usize, j: usize) -> Option<&Point3<f64>> {
        if i >= self.cols || j >= self.rows {
            return None;
        }
        self.points.get(self.index(i, j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_by_nine_board() {
        let g = GridGeometry::new(12, 9).expect("valid");
        assert_eq!(g.len(), 108);

        let xs: Vec<f64> = g.points().iter().map(|p| p.x).collect();
        let ys: Vec<f64> = g.points().iter().map(|p| p.y).collect();
        assert_eq!(xs.iter().cloned().fold(f64::MIN, f64::max), 11.0);
        assert_eq!(ys.iter().cloned().fold(f64::MIN, f64::max), 8.0);
        assert!(g.points().iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn ordering_is_row_major_i_fastest() {
        let g = GridGeometry::new(4, 3).expect("valid");
        assert_eq!(g.points()[1], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(g.points()[4], Point3::new(0.0, 1.0, 0.0));
        assert_eq!(g.index(3, 2), 11);
        assert_eq!(g.point(3, 2), Some(&Point3::new(3.0, 2.0, 0.0)));
        assert_eq!(g.point(4, 0), None);
    }

    #[test]
    fn rejects_degenerate_dimensions() {
        assert_eq!(
            GridGeometry::new(1, 9),
            Err(GridGeometryError::TooSmall { cols: 1, rows: 9 })
        );
        assert!(GridGeometry::new(5, 0).is_err());
    }
}
