//! Gradient-based sub-pixel corner refinement.
//!
//! For a saddle point `q`, every image gradient `g(p)` sampled in a small
//! window around it is orthogonal to `p - q`. Minimizing
//! `sum w(p) * (g(p)^T (p - q))^2` over `q` gives the 2x2 normal equations
//! solved at each iteration; `w` is a Gaussian window with an optional dead
//! zone in the middle.

use crate::params::SubPixParams;
use metric_calib_core::{sample_bilinear, GrayImageView};
use nalgebra::Point2;

fn gaussian_mask(params: &SubPixParams) -> Vec<f64> {
    let win = params.half_window as i32;
    let side = (2 * win + 1) as usize;
    let coeff = 1.0 / (win as f64 * win as f64).max(1.0);
    let profile: Vec<f64> = (-win..=win).map(|x| (-(x * x) as f64 * coeff).exp()).collect();

    let mut mask = vec![0.0; side * side];
    for (r, wy) in profile.iter().enumerate() {
        for (c, wx) in profile.iter().enumerate() {
            mask[r * side + c] = wy * wx;
        }
    }
    if params.zero_zone >= 0 {
        let zz = params.zero_zone.min(win);
        for y in -zz..=zz {
            for x in -zz..=zz {
                mask[((y + win) as usize) * side + (x + win) as usize] = 0.0;
            }
        }
    }
    mask
}

/// Refine one corner estimate. The start point is returned unchanged when
/// the system is singular or the estimate wanders off by more than the window.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    params: &SubPixParams,
) -> Point2<f64> {
    let mask = gaussian_mask(params);
    refine_with_mask(img, start, params, &mask)
}

fn refine_with_mask(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    params: &SubPixParams,
    mask: &[f64],
) -> Point2<f64> {
    let win = params.half_window as i32;
    let side = (2 * win + 1) as usize;
    let eps2 = params.epsilon.max(0.0).powi(2);

    let mut cur = start;
    for _ in 0..params.max_iters {
        // Patch with a one-pixel border for central differences.
        let ext = side + 2;
        let mut patch = vec![0.0; ext * ext];
        for r in 0..ext {
            for c in 0..ext {
                let x = cur.x + (c as i32 - win - 1) as f64;
                let y = cur.y + (r as i32 - win - 1) as f64;
                patch[r * ext + c] = sample_bilinear(img, x, y);
            }
        }

        let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for r in 0..side {
            let py = (r as i32 - win) as f64;
            for col in 0..side {
                let px = (col as i32 - win) as f64;
                let m = mask[r * side + col];
                let center = (r + 1) * ext + col + 1;
                let gx = patch[center + 1] - patch[center - 1];
                let gy = patch[center + ext] - patch[center - ext];

                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * (a * c).abs().max(1.0) {
            break;
        }
        let next = Point2::new(
            cur.x + (c * bb1 - b * bb2) / det,
            cur.y + (a * bb2 - b * bb1) / det,
        );
        let moved = (next - cur).norm_squared();
        cur = next;
        if !img.contains(cur.x, cur.y) || moved <= eps2 {
            break;
        }
    }

    let limit = win as f64;
    if !cur.x.is_finite()
        || !cur.y.is_finite()
        || (cur.x - start.x).abs() > limit
        || (cur.y - start.y).abs() > limit
    {
        return start;
    }
    cur
}

/// Refine a batch of corners in place.
pub fn refine_corners(img: &GrayImageView<'_>, corners: &mut [Point2<f64>], params: &SubPixParams) {
    let mask = gaussian_mask(params);
    for corner in corners.iter_mut() {
        *corner = refine_with_mask(img, *corner, params, &mask);
    }
}
