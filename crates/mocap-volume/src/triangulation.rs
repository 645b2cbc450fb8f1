use crate::CameraArray;

/// A normalized 3x4 projection matrix `[R | t]`.
pub type Projection = [[f64; 4]; 3];

/// Minimum number of views needed to triangulate a point.
pub const MIN_VIEWS: usize = 2;

/// Errors returned by the triangulation routines.
#[derive(thiserror::Error, Debug)]
pub enum TriangulationError {
    /// Fewer views than required observed the point.
    #[error("Need at least {required} views to triangulate, got {actual}")]
    InsufficientViews {
        /// Minimum number of views.
        required: usize,
        /// Number of views provided.
        actual: usize,
    },

    /// Projections and image points have different lengths.
    #[error("Mismatched array lengths: projections ({0}) != points ({1})")]
    MismatchedLengths(usize, usize),

    /// The observation refers to a port that is not in the camera array.
    #[error("Camera {0} is not part of the camera array")]
    UnknownCamera(u32),

    /// The homogeneous solution has a vanishing last coordinate.
    #[error("Triangulated point is at infinity")]
    PointAtInfinity,
}

/// Linear triangulation of one point from two or more views (DLT).
///
/// # Arguments
///
/// * `projections` - Normalized projection matrices, one per view.
/// * `points` - Undistorted normalized image coordinates, one per view.
///
/// # Returns
///
/// The point in the frame the projections map from.
pub fn triangulate_point(
    projections: &[Projection],
    points: &[[f64; 2]],
) -> Result<[f64; 3], TriangulationError> {
    if projections.len() != points.len() {
        return Err(TriangulationError::MismatchedLengths(
            projections.len(),
            points.len(),
        ));
    }
    if projections.len() < MIN_VIEWS {
        return Err(TriangulationError::InsufficientViews {
            required: MIN_VIEWS,
            actual: projections.len(),
        });
    }

    let mut a = faer::Mat::<f64>::zeros(2 * projections.len(), 4);
    for (i, (p, x)) in projections.iter().zip(points.iter()).enumerate() {
        write_dlt_row(&mut a, 2 * i, x[0], &p[2], &p[0]);
        write_dlt_row(&mut a, 2 * i + 1, x[1], &p[2], &p[1]);
    }

    // the solution is the right singular vector of the smallest singular value
    let svd = a.svd();
    let xh = svd.v().col(3);
    let w = xh.read(3);
    if w.abs() < 1e-12 {
        return Err(TriangulationError::PointAtInfinity);
    }

    Ok([xh.read(0) / w, xh.read(1) / w, xh.read(2) / w])
}

/// Triangulate a point from pixel observations of a camera array.
///
/// Each observation is a `(port, pixel)` pair; pixels are undistorted with the
/// camera's own intrinsics before the linear solve.
pub fn triangulate_observations(
    camera_array: &CameraArray,
    observations: &[(u32, [f64; 2])],
) -> Result<[f64; 3], TriangulationError> {
    let mut projections = Vec::with_capacity(observations.len());
    let mut points = Vec::with_capacity(observations.len());
    for (port, pixel) in observations {
        let camera = camera_array
            .get(*port)
            .ok_or(TriangulationError::UnknownCamera(*port))?;
        projections.push(camera.projection());
        points.push(camera.undistort(*pixel));
    }

    triangulate_point(&projections, &points)
}

fn write_dlt_row(a: &mut faer::Mat<f64>, row: usize, x: f64, p3: &[f64; 4], p1: &[f64; 4]) {
    for j in 0..4 {
        a.write(row, j, x * p3[j] - p1[j]);
    }
}
