//! Bundle adjustment boundary.
//!
//! [`BundleAdjuster`] is the seam behind which a full bundle adjustment
//! solver lives. [`PointRefiner`] is the built-in implementation: it keeps the
//! cameras fixed and refines every 3D point with Levenberg-Marquardt on its
//! pixel reprojection error.

use glam::{DMat3, DVec3};

use crate::{CameraArray, PointEstimates, VolumeError};

/// Refines a camera array and its point estimates jointly.
pub trait BundleAdjuster {
    /// Return refined copies of the camera array and point estimates.
    fn adjust(
        &self,
        camera_array: &CameraArray,
        point_estimates: &PointEstimates,
    ) -> Result<(CameraArray, PointEstimates), VolumeError>;
}

/// Structure-only refinement of 3D points with cameras held fixed.
///
/// A step is accepted only when it lowers the point's cost, so the overall
/// reprojection error never increases.
#[derive(Debug, Clone)]
pub struct PointRefiner {
    /// Maximum number of LM iterations per point.
    pub max_iterations: usize,
    /// Convergence threshold on the step length.
    pub step_tolerance: f64,
    /// Initial damping factor (lambda).
    pub initial_lambda: f64,
}

impl Default for PointRefiner {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            step_tolerance: 1e-12,
            initial_lambda: 1e-3,
        }
    }
}

impl PointRefiner {
    /// Create default refinement parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the step tolerance.
    pub fn with_step_tolerance(mut self, step_tolerance: f64) -> Self {
        self.step_tolerance = step_tolerance;
        self
    }

    fn refine_point(
        &self,
        camera_array: &CameraArray,
        views: &[(u32, [f64; 2])],
        x0: DVec3,
    ) -> DVec3 {
        let mut x = x0;
        let mut cost = reprojection_cost(camera_array, views, x);
        if !cost.is_finite() {
            return x;
        }
        let mut lambda = self.initial_lambda;

        for _ in 0..self.max_iterations {
            let (jtj, jtr) = normal_equations(camera_array, views, x);
            let diagonal = DVec3::new(jtj.x_axis.x, jtj.y_axis.y, jtj.z_axis.z);
            let damped = jtj + DMat3::from_diagonal(diagonal * lambda);
            if damped.determinant().abs() < 1e-18 {
                break;
            }
            let step = -(damped.inverse() * jtr);
            let candidate = x + step;
            let candidate_cost = reprojection_cost(camera_array, views, candidate);

            if candidate_cost < cost {
                x = candidate;
                cost = candidate_cost;
                lambda = (lambda * 0.1).max(1e-12);
                if step.length() < self.step_tolerance {
                    break;
                }
            } else {
                lambda *= 10.0;
                if lambda > 1e12 {
                    break;
                }
            }
        }

        x
    }
}

impl BundleAdjuster for PointRefiner {
    fn adjust(
        &self,
        camera_array: &CameraArray,
        point_estimates: &PointEstimates,
    ) -> Result<(CameraArray, PointEstimates), VolumeError> {
        point_estimates.validate_against(camera_array)?;

        let mut views: Vec<Vec<(u32, [f64; 2])>> = vec![Vec::new(); point_estimates.n_points()];
        for o in point_estimates.observations() {
            views[o.obj_index].push((o.port, o.img));
        }

        let obj = point_estimates
            .obj()
            .iter()
            .zip(views.iter())
            .map(|(xyz, views)| {
                self.refine_point(camera_array, views, DVec3::from_array(*xyz))
                    .to_array()
            })
            .collect::<Vec<_>>();

        let mut refined = point_estimates.clone();
        refined.set_obj(obj)?;

        Ok((camera_array.clone(), refined))
    }
}

/// Sum of squared pixel residuals of one point; infinite if it falls behind a camera.
fn reprojection_cost(camera_array: &CameraArray, views: &[(u32, [f64; 2])], x: DVec3) -> f64 {
    views
        .iter()
        .map(
            |(port, img)| match camera_array.get(*port).and_then(|c| c.project(x)) {
                Some(p) => (p[0] - img[0]).powi(2) + (p[1] - img[1]).powi(2),
                None => f64::INFINITY,
            },
        )
        .sum()
}

/// Gauss-Newton normal equations with a central difference Jacobian.
fn normal_equations(
    camera_array: &CameraArray,
    views: &[(u32, [f64; 2])],
    x: DVec3,
) -> (DMat3, DVec3) {
    let h = 1e-6 * x.length().max(1.0);
    let mut jtj = DMat3::ZERO;
    let mut jtr = DVec3::ZERO;

    for (port, img) in views {
        let Some(camera) = camera_array.get(*port) else {
            continue;
        };
        let Some(p) = camera.project(x) else {
            continue;
        };

        let mut ju = DVec3::ZERO;
        let mut jv = DVec3::ZERO;
        for k in 0..3 {
            let mut dx = DVec3::ZERO;
            dx[k] = h;
            let (Some(pp), Some(pm)) = (camera.project(x + dx), camera.project(x - dx)) else {
                continue;
            };
            ju[k] = (pp[0] - pm[0]) / (2.0 * h);
            jv[k] = (pp[1] - pm[1]) / (2.0 * h);
        }

        let ru = p[0] - img[0];
        let rv = p[1] - img[1];
        jtj += outer(ju, ju) + outer(jv, jv);
        jtr += ju * ru + jv * rv;
    }

    (jtj, jtr)
}

fn outer(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}
