use glam::{DMat3, DMat4, DVec3, DVec4};

use crate::VolumeError;

/// Determinant magnitude below which a transform is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// Tolerance on `R^T R - I` for a rotation block to count as orthonormal.
const ORTHONORMAL_TOL: f64 = 1e-6;

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation, normalized internally.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The rotation matrix, or `None` for a zero axis.
///
/// Example:
///
/// ```
/// use glam::DVec3;
/// use mocap_volume::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = DVec3::X;
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(axis, angle).unwrap();
/// assert!((rotation.col(1).z - 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(axis: DVec3, angle: f64) -> Option<DMat3> {
    let magnitude = axis.length();
    if magnitude < 1e-10 {
        return None;
    }
    let DVec3 { x, y, z } = axis / magnitude;

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    let m00 = c + x * x * t;
    let m11 = c + y * y * t;
    let m22 = c + z * z * t;

    let tmp1 = x * y * t;
    let tmp2 = z * s;
    let m10 = tmp1 + tmp2;
    let m01 = tmp1 - tmp2;

    let tmp3 = x * z * t;
    let tmp4 = y * s;
    let m20 = tmp3 - tmp4;
    let m02 = tmp3 + tmp4;

    let tmp5 = y * z * t;
    let tmp6 = x * s;
    let m12 = tmp5 - tmp6;
    let m21 = tmp5 + tmp6;

    Some(DMat3::from_cols(
        DVec3::new(m00, m10, m20),
        DVec3::new(m01, m11, m21),
        DVec3::new(m02, m12, m22),
    ))
}

/// Convert a Rodrigues rotation vector into a rotation matrix.
///
/// The norm of `rvec` is the angle, its direction the axis.
pub fn rotation_from_rvec(rvec: DVec3) -> DMat3 {
    axis_angle_to_rotation_matrix(rvec, rvec.length()).unwrap_or(DMat3::IDENTITY)
}

/// Assemble a homogeneous transform from a rotation and a translation.
pub fn rigid_from_parts(rotation: DMat3, translation: DVec3) -> DMat4 {
    DMat4::from_cols(
        rotation.x_axis.extend(0.0),
        rotation.y_axis.extend(0.0),
        rotation.z_axis.extend(0.0),
        translation.extend(1.0),
    )
}

/// Assemble a homogeneous transform from a rotation vector and a translation.
pub fn rigid_from_rvec_tvec(rvec: [f64; 3], tvec: [f64; 3]) -> DMat4 {
    rigid_from_parts(
        rotation_from_rvec(DVec3::from_array(rvec)),
        DVec3::from_array(tvec),
    )
}

/// Check that `transform` is an invertible rigid motion.
///
/// Fails with [`VolumeError::SingularTransform`] when it cannot be inverted and
/// with [`VolumeError::NonRigidTransform`] when it is invertible but the
/// bottom row is not `[0, 0, 0, 1]` or the rotation block is not a proper
/// rotation.
pub fn check_rigid(transform: &DMat4) -> Result<(), VolumeError> {
    let det = transform.determinant();
    if !det.is_finite() || det.abs() < SINGULAR_EPS {
        return Err(VolumeError::SingularTransform(det));
    }

    let bottom = transform.row(3);
    if !bottom.abs_diff_eq(DVec4::W, ORTHONORMAL_TOL) {
        return Err(VolumeError::NonRigidTransform(format!(
            "bottom row is {bottom:?}"
        )));
    }

    let rotation = DMat3::from_mat4(*transform);
    let gram = rotation.transpose() * rotation;
    if !gram.abs_diff_eq(DMat3::IDENTITY, ORTHONORMAL_TOL) {
        return Err(VolumeError::NonRigidTransform(
            "rotation block is not orthonormal".to_string(),
        ));
    }
    if rotation.determinant() < 0.0 {
        return Err(VolumeError::NonRigidTransform(
            "rotation block is a reflection".to_string(),
        ));
    }

    Ok(())
}

/// Fit the rigid transform that maps `src` onto `dst` in the least squares sense.
///
/// Umeyama/Kabsch without scale: the cross covariance of the centered point
/// sets is decomposed with an SVD and the rotation is corrected so it is never
/// a reflection.
///
/// # Returns
///
/// `T` such that `dst ≈ T * src`.
pub fn fit_rigid_transform(src: &[DVec3], dst: &[DVec3]) -> Result<DMat4, VolumeError> {
    if src.len() != dst.len() {
        return Err(VolumeError::ShapeMismatch(format!(
            "source has {} points, destination has {}",
            src.len(),
            dst.len()
        )));
    }
    if src.len() < 3 {
        return Err(VolumeError::InsufficientCorrespondences {
            required: 3,
            actual: src.len(),
        });
    }

    let n = src.len() as f64;
    let mu_s = src.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n;
    let mu_d = dst.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n;

    // H = sum (dst - mu_d) * (src - mu_s)^T
    let mut h = faer::Mat::<f64>::zeros(3, 3);
    for (s, d) in src.iter().zip(dst.iter()) {
        let sc = (*s - mu_s).to_array();
        let dc = (*d - mu_d).to_array();
        for (r, dr) in dc.iter().enumerate() {
            for (c, sc_c) in sc.iter().enumerate() {
                h.write(r, c, h.read(r, c) + dr * sc_c);
            }
        }
    }

    let svd = h.svd();
    let u = faer_to_dmat3(svd.u());
    let v = faer_to_dmat3(svd.v());

    let rotation = if (u * v.transpose()).determinant() < 0.0 {
        u * DMat3::from_diagonal(DVec3::new(1.0, 1.0, -1.0)) * v.transpose()
    } else {
        u * v.transpose()
    };
    let translation = mu_d - rotation * mu_s;

    Ok(rigid_from_parts(rotation, translation))
}

fn faer_to_dmat3(m: faer::MatRef<'_, f64>) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(m.read(0, 0), m.read(1, 0), m.read(2, 0)),
        DVec3::new(m.read(0, 1), m.read(1, 1), m.read(2, 1)),
        DVec3::new(m.read(0, 2), m.read(1, 2), m.read(2, 2)),
    )
}
