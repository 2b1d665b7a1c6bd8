//! Zhang's closed-form intrinsics from three or more plane homographies.

use metric_calib_core::Intrinsics;
use nalgebra::{DMatrix, Matrix3, SVector};

/// The 6-vector `v_ij(H)` with `h_i^T B h_j = v_ij^T b`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate `K` (skew included) from plane-to-image homographies.
///
/// Returns `None` with fewer than three homographies or when the image of
/// the absolute conic is not positive definite (near-degenerate views).
pub fn intrinsics_from_homographies(homographies: &[Matrix3<f64>]) -> Option<Intrinsics> {
    let m = homographies.len();
    if m < 3 {
        return None;
    }

    let mut v = DMatrix::<f64>::zeros(2 * m, 6);
    for (k, h) in homographies.iter().enumerate() {
        let h = h / h.norm();
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);

        v.row_mut(2 * k).copy_from(&v12.transpose());
        v.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    // b spans the null space of V.
    let svd = v.svd(false, true);
    let v_t = svd.v_t?;
    let min_idx = svd.singular_values.imin();
    let b = v_t.row(min_idx);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-12 {
        return None;
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda / b11 <= 0.0 || lambda * b11 / denom <= 0.0 {
        return None;
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let k = Intrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    };
    k.is_valid().then_some(k)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    /// `H = K [r1 r2 t]` for the board plane `Z = 0`.
    pub(crate) fn synthetic_homography(
        k: &Matrix3<f64>,
        rot: Rotation3<f64>,
        t: Vector3<f64>,
    ) -> Matrix3<f64> {
        let r = rot.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));
        h
    }

    #[test]
    fn recovers_k_from_three_views() {
        let gt = Intrinsics::new(900.0, 880.0, 640.0, 360.0);
        let k = gt.k_matrix();
        let hs = [
            synthetic_homography(
                &k,
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(0.1, -0.05, 1.0),
            ),
            synthetic_homography(
                &k,
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-0.05, 0.1, 1.2),
            ),
            synthetic_homography(
                &k,
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 0.9),
            ),
        ];

        let est = intrinsics_from_homographies(&hs).expect("well-posed");
        assert!((est.fx - gt.fx).abs() < 1e-3, "fx {}", est.fx);
        assert!((est.fy - gt.fy).abs() < 1e-3, "fy {}", est.fy);
        assert!((est.cx - gt.cx).abs() < 1e-3, "cx {}", est.cx);
        assert!((est.cy - gt.cy).abs() < 1e-3, "cy {}", est.cy);
        assert!(est.skew.abs() < 1e-6);
    }

    #[test]
    fn needs_three_views() {
        let k = Intrinsics::new(500.0, 500.0, 320.0, 240.0).k_matrix();
        let h = synthetic_homography(&k, Rotation3::identity(), Vector3::new(0.0, 0.0, 1.0));
        assert!(intrinsics_from_homographies(&[h, h]).is_none());
    }
}
