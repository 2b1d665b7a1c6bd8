use metric_calib_core::{Extrinsics, Intrinsics};
use nalgebra::{Matrix3, Rotation3, Vector3};

/// Decompose a plane-to-image homography into the board pose, assuming the
/// board lies on `Z = 0` and ignoring lens distortion.
///
/// The sign of `H` is chosen so that the board sits in front of the camera.
/// Returns `None` if `K` is singular or `H` has a degenerate first column pair.
pub fn pose_from_homography(k: &Intrinsics, h: &Matrix3<f64>) -> Option<Extrinsics> {
    let k_inv = k.k_matrix().try_inverse()?;

    let a1 = k_inv * h.column(0);
    let a2 = k_inv * h.column(1);
    let a3 = k_inv * h.column(2);

    // Average the two column norms for the scale.
    let mean_norm = 0.5 * (a1.norm() + a2.norm());
    if mean_norm <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / mean_norm;
    if a3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    // Nearest rotation (polar decomposition).
    let svd = r.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let rotation = Rotation3::from_matrix_unchecked(r_orth);
    let translation: Vector3<f64> = a3 * lambda;
    Some(Extrinsics::new(rotation.scaled_axis(), translation))
}
