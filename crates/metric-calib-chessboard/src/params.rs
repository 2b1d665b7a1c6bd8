use serde::{Deserialize, Serialize};

/// Lattice growth settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGrowthParams {
    /// Search radius around a predicted corner, relative to the local grid step.
    pub search_radius_rel: f32,
    /// Neighbors inspected when estimating a seed's grid steps.
    pub k_neighbors: usize,
    /// Seeds tried (closest to the corner centroid first) before giving up.
    pub max_seeds: usize,
    /// Maximal `|cos|` between the two seed steps.
    pub max_axis_cos: f32,
    /// Maximal length ratio between the two seed steps.
    pub max_step_ratio: f32,
}

impl Default for GridGrowthParams {
    fn default() -> Self {
        Self {
            search_radius_rel: 0.3,
            k_neighbors: 8,
            max_seeds: 10,
            max_axis_cos: 0.5,
            max_step_ratio: 2.0,
        }
    }
}

/// Sub-pixel corner refinement, mirroring the classic `cornerSubPix` contract.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Half size of the search window; 5 gives an 11x11 window.
    pub half_window: usize,
    /// Half size of the central dead zone ignored in the sums; negative disables it.
    pub zero_zone: i32,
    pub max_iters: usize,
    /// Stop once a refinement step moves the corner by less than this (pixels).
    pub epsilon: f64,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            zero_zone: -1,
            max_iters: 30,
            epsilon: 0.001,
        }
    }
}

/// Parameters specific to the chessboard extractor.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Minimal ChESS response to consider a corner.
    pub min_corner_strength: f32,
    pub growth: GridGrowthParams,
    /// `None` skips sub-pixel refinement.
    pub subpix: Option<SubPixParams>,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            min_corner_strength: 0.0,
            growth: GridGrowthParams::default(),
            subpix: Some(SubPixParams::default()),
        }
    }
}
