use crate::calibrate::CalibrationFlags;
use crate::lm::NllsProblem;
use metric_calib_core::{CorrespondenceSet, Distortion, Extrinsics, Intrinsics, PinholeCamera};
use nalgebra::{DMatrix, DVector, Rotation3, Vector3};

/// `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`
pub(crate) const INTRINSIC_PARAMS: usize = 9;
/// `[rx, ry, rz, tx, ty, tz]` per view.
pub(crate) const POSE_PARAMS: usize = 6;

const CX: usize = 2;
const CY: usize = 3;
const P1: usize = 6;
const P2: usize = 7;
const K3: usize = 8;

/// Joint refinement of shared intrinsics and per-view poses.
///
/// The full parameter vector is
/// `[fx, fy, cx, cy, k1, k2, p1, p2, k3, (rvec, tvec) x N]`; fixed entries
/// are kept out of the optimization vector and read from the initial guess.
/// Residuals are `projected - observed` in pixels, two rows per corner.
pub struct PlanarCalibrationProblem<'a> {
    views: &'a [CorrespondenceSet],
    base: DVector<f64>,
    free: Vec<usize>,
    num_residuals: usize,
    view_offsets: Vec<usize>,
}

impl<'a> PlanarCalibrationProblem<'a> {
    pub fn new(
        views: &'a [CorrespondenceSet],
        camera: &PinholeCamera,
        extrinsics: &[Extrinsics],
        flags: &CalibrationFlags,
    ) -> Self {
        let base = pack(camera, extrinsics);

        let fixed = |idx: usize| match idx {
            CX | CY => flags.fix_principal_point,
            P1 | P2 => flags.zero_tangent_dist,
            K3 => flags.fix_k3,
            _ => false,
        };
        let free = (0..base.len()).filter(|&idx| !fixed(idx)).collect();

        let mut view_offsets = Vec::with_capacity(views.len());
        let mut num_residuals = 0;
        for view in views {
            view_offsets.push(num_residuals);
            num_residuals += 2 * view.len();
        }

        Self {
            views,
            base,
            free,
            num_residuals,
            view_offsets,
        }
    }

    /// Optimization vector for the initial guess.
    pub fn initial_params(&self) -> DVector<f64> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&idx| self.base[idx]))
    }

    /// Camera and poses encoded by an optimization vector.
    pub fn unpack(&self, x: &DVector<f64>) -> (PinholeCamera, Vec<Extrinsics>) {
        unpack(&self.full(x), self.views.len())
    }

    fn full(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut full = self.base.clone();
        for (k, &idx) in self.free.iter().enumerate() {
            full[idx] = x[k];
        }
        full
    }

    fn view_residuals(&self, full: &DVector<f64>, view: usize, out: &mut [f64]) {
        let camera = camera_from(full);
        let offset = INTRINSIC_PARAMS + POSE_PARAMS * view;
        let rotation = Rotation3::new(Vector3::new(
            full[offset],
            full[offset + 1],
            full[offset + 2],
        ));
        let translation = Vector3::new(full[offset + 3], full[offset + 4], full[offset + 5]);

        for (k, (world, observed)) in self.views[view].iter().enumerate() {
            let p_cam = rotation * world + translation;
            let projected = camera.project(&p_cam);
            out[2 * k] = projected.x - observed.x;
            out[2 * k + 1] = projected.y - observed.y;
        }
    }

    fn residuals_full(&self, full: &DVector<f64>) -> DVector<f64> {
        let mut r = DVector::zeros(self.num_residuals);
        for view in 0..self.views.len() {
            let start = self.view_offsets[view];
            let len = 2 * self.views[view].len();
            self.view_residuals(full, view, &mut r.as_mut_slice()[start..start + len]);
        }
        r
    }
}

impl NllsProblem for PlanarCalibrationProblem<'_> {
    fn num_params(&self) -> usize {
        self.free.len()
    }

    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        self.residuals_full(&self.full(x))
    }

    /// Central differences. A pose parameter only touches its own view's
    /// rows, so those columns are evaluated on that view alone.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let full = self.full(x);
        let mut jac = DMatrix::zeros(self.num_residuals, self.free.len());

        for (col, &idx) in self.free.iter().enumerate() {
            let h = 1e-6 * full[idx].abs().max(1e-2);
            let mut plus = full.clone();
            let mut minus = full.clone();
            plus[idx] += h;
            minus[idx] -= h;
            let inv = 1.0 / (plus[idx] - minus[idx]);

            if idx < INTRINSIC_PARAMS {
                let rp = self.residuals_full(&plus);
                let rm = self.residuals_full(&minus);
                for row in 0..self.num_residuals {
                    jac[(row, col)] = (rp[row] - rm[row]) * inv;
                }
            } else {
                let view = (idx - INTRINSIC_PARAMS) / POSE_PARAMS;
                let len = 2 * self.views[view].len();
                let mut rp = vec![0.0; len];
                let mut rm = vec![0.0; len];
                self.view_residuals(&plus, view, &mut rp);
                self.view_residuals(&minus, view, &mut rm);
                let start = self.view_offsets[view];
                for k in 0..len {
                    jac[(start + k, col)] = (rp[k] - rm[k]) * inv;
                }
            }
        }
        jac
    }
}

fn pack(camera: &PinholeCamera, extrinsics: &[Extrinsics]) -> DVector<f64> {
    let k = &camera.intrinsics;
    let mut params = Vec::with_capacity(INTRINSIC_PARAMS + POSE_PARAMS * extrinsics.len());
    params.extend_from_slice(&[k.fx, k.fy, k.cx, k.cy]);
    params.extend_from_slice(&camera.distortion.to_array());
    for ext in extrinsics {
        params.extend(ext.rotation.iter().copied());
        params.extend(ext.translation.iter().copied());
    }
    DVector::from_vec(params)
}

fn camera_from(full: &DVector<f64>) -> PinholeCamera {
    PinholeCamera::new(
        Intrinsics::new(full[0], full[1], full[2], full[3]),
        Distortion::from_array([full[4], full[5], full[6], full[7], full[8]]),
    )
}

fn unpack(full: &DVector<f64>, num_views: usize) -> (PinholeCamera, Vec<Extrinsics>) {
    let extrinsics = (0..num_views)
        .map(|view| {
            let o = INTRINSIC_PARAMS + POSE_PARAMS * view;
            Extrinsics::new(
                Vector3::new(full[o], full[o + 1], full[o + 2]),
                Vector3::new(full[o + 3], full[o + 4], full[o + 5]),
            )
        })
        .collect();
    (camera_from(full), extrinsics)
}
