use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Raw X-corner candidate fed to the chessboard extractor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Corner {
    /// Pixel position, pixel centres at integer coordinates.
    pub position: Point2<f32>,
    /// Detector response; larger is more corner-like.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            strength,
        }
    }
}
