use metric_calib_core::{CorrespondenceSet, Extrinsics, PinholeCamera};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReprojectionError {
    #[error("{views} correspondence sets but {extrinsics} poses")]
    CountMismatch { views: usize, extrinsics: usize },
}

/// Reprojection residual summary, in pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    /// `sqrt(sum of squared distances / total point count)` over all views.
    pub rms: f64,
    pub per_view_rms: Vec<f64>,
    /// Largest single-point distance.
    pub max_error: f64,
    pub num_points: usize,
}

/// Project every view's board points through its pose and the shared camera
/// and compare with the observations.
pub fn reprojection_error(
    camera: &PinholeCamera,
    extrinsics: &[Extrinsics],
    views: &[CorrespondenceSet],
) -> Result<ReprojectionStats, ReprojectionError> {
    if views.len() != extrinsics.len() {
        return Err(ReprojectionError::CountMismatch {
            views: views.len(),
            extrinsics: extrinsics.len(),
        });
    }

    let mut total_sq = 0.0;
    let mut num_points = 0;
    let mut max_error: f64 = 0.0;
    let mut per_view_rms = Vec::with_capacity(views.len());

    for (view, pose) in views.iter().zip(extrinsics) {
        let mut view_sq = 0.0;
        for (world, observed) in view.iter() {
            let projected = camera.project(&pose.transform_point(world));
            let d2 = (projected - observed).norm_squared();
            view_sq += d2;
            max_error = max_error.max(d2.sqrt());
        }
        per_view_rms.push(if view.is_empty() {
            0.0
        } else {
            (view_sq / view.len() as f64).sqrt()
        });
        total_sq += view_sq;
        num_points += view.len();
    }

    let rms = if num_points == 0 {
        0.0
    } else {
        (total_sq / num_points as f64).sqrt()
    };

    Ok(ReprojectionStats {
        rms,
        per_view_rms,
        max_error,
        num_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use metric_calib_core::{Distortion, GridGeometry, Intrinsics};
    use nalgebra::{Point2, Vector2, Vector3};
    use std::sync::Arc;

    fn camera() -> PinholeCamera {
        let k = Intrinsics::new(600.0, 600.0, 320.0, 240.0);
        PinholeCamera::new(k, Distortion::ZERO)
    }

    fn pose() -> Extrinsics {
        Extrinsics::new(Vector3::new(0.05, 0.1, 0.0), Vector3::new(-2.0, -1.0, 10.0))
    }

    fn view(offset: Vector2<f64>) -> CorrespondenceSet {
        let grid = Arc::new(GridGeometry::new(5, 4).expect("grid"));
        let cam = camera();
        let p = pose();
        let pts: Vec<Point2<f64>> = grid
            .points()
            .iter()
            .map(|w| cam.project(&p.transform_point(w)) + offset)
            .collect();
        CorrespondenceSet::new(grid, pts).expect("set")
    }

    #[test]
    fn perfect_fit_has_zero_error() {
        let views = [view(Vector2::zeros())];
        let stats = reprojection_error(&camera(), &[pose()], &views).expect("stats");
        assert!(stats.rms < 1e-12);
        assert_eq!(stats.num_points, 20);
    }

    #[test]
    fn constant_offset_gives_its_length() {
        let views = [view(Vector2::zeros()), view(Vector2::new(3.0, 4.0))];
        let stats = reprojection_error(&camera(), &[pose(), pose()], &views).expect("stats");
        assert_relative_eq!(stats.per_view_rms[1], 5.0, epsilon = 1e-9);
        assert!(stats.per_view_rms[0] < 1e-12);
        // Half the points are off by 5 px.
        assert_relative_eq!(stats.rms, (12.5f64).sqrt(), epsilon = 1e-9);
        assert_relative_eq!(stats.max_error, 5.0, epsilon = 1e-9);
        assert!(stats.rms >= 0.0);
    }

    #[test]
    fn mismatched_pose_count_is_rejected() {
        assert_eq!(
            reprojection_error(&camera(), &[], &[view(Vector2::zeros())]),
            Err(ReprojectionError::CountMismatch {
                views: 1,
                extrinsics: 0
            })
        );
    }
}
