//! Checkerboard correspondence extraction built on top of `metric-calib-core`.
//!
//! Algorithm:
//! 1. Filter raw ChESS corners by strength.
//! 2. Put the survivors in a kd-tree and pick seeds near the corner centroid.
//! 3. From a seed, estimate two local grid steps from its nearest neighbors.
//! 4. Grow a labelled lattice breadth-first: each labelled corner predicts its
//!    four neighbors from local steps, and the nearest free corner within a
//!    relative radius takes the label.
//! 5. Accept the lattice if it holds exactly one fully populated
//!    `cols x rows` window (or `rows x cols`, which is transposed back).
//! 6. Orient the window so the `i` axis runs along +x and `j` along +y.
//! 7. Refine every corner to sub-pixel accuracy on the image.
//!
//! The output is ordered row-major with `i` fastest, matching
//! [`metric_calib_core::GridGeometry`].

mod detector;
mod grid_growth;
mod params;
mod subpix;

pub use detector::{ChessboardDetection, ChessboardDetector};
pub use grid_growth::{find_board_window, BoardWindow, GridGrower, GridLabels};
pub use params::{ChessboardParams, GridGrowthParams, SubPixParams};
pub use subpix::{refine_corner, refine_corners};
