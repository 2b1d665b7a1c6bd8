//! Focal length initialisation with the principal point pinned at the image
//! centre. Works from a single view, unlike the full closed form.

use metric_calib_core::{ImageSize, Intrinsics};
use nalgebra::{Matrix2, Matrix3, Vector2};

/// Principal point at `((w - 1) / 2, (h - 1) / 2)`; `fx`, `fy` from the
/// orthogonality and equal-norm constraints on `K^-1 H`, solved in least
/// squares over all views. Falls back to `max(w, h)` for both focal lengths
/// when the constraints are degenerate (e.g. only fronto-parallel views).
pub fn intrinsics_with_centered_principal_point(
    homographies: &[Matrix3<f64>],
    size: ImageSize,
) -> Intrinsics {
    let cx = (size.width as f64 - 1.0) * 0.5;
    let cy = (size.height as f64 - 1.0) * 0.5;
    let fallback = size.width.max(size.height) as f64;

    let shift = Matrix3::new(
        1.0, 0.0, -cx, //
        0.0, 1.0, -cy, //
        0.0, 0.0, 1.0,
    );

    // Unknowns a = 1/fx^2, b = 1/fy^2.
    let mut ata = Matrix2::<f64>::zeros();
    let mut atb = Vector2::<f64>::zeros();
    for h in homographies {
        let hc = shift * h;
        let hc = hc / hc.norm();
        let (h1, h2) = (hc.column(0), hc.column(1));

        let rows = [
            (
                Vector2::new(h1[0] * h2[0], h1[1] * h2[1]),
                -h1[2] * h2[2],
            ),
            (
                Vector2::new(h1[0] * h1[0] - h2[0] * h2[0], h1[1] * h1[1] - h2[1] * h2[1]),
                -(h1[2] * h1[2] - h2[2] * h2[2]),
            ),
        ];
        for (row, rhs) in rows {
            ata += row * row.transpose();
            atb += row * rhs;
        }
    }

    let focal = ata
        .try_inverse()
        .map(|inv| inv * atb)
        .filter(|ab| ab[0] > 0.0 && ab[1] > 0.0 && ab.iter().all(|v| v.is_finite()))
        .map(|ab| (1.0 / ab[0].sqrt(), 1.0 / ab[1].sqrt()));

    let (fx, fy) = match focal {
        Some((fx, fy)) if fx.is_finite() && fy.is_finite() => (fx, fy),
        _ => (fallback, fallback),
    };
    Intrinsics::new(fx, fy, cx, cy)
}
