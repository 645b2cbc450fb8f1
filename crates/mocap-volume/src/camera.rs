use std::{collections::BTreeMap, fs, path::Path};

use bincode::{Decode, Encode};
use glam::{DMat3, DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::{transforms::check_rigid, triangulation::Projection, VolumeError};

/// Number of fixed point iterations used to invert the distortion model.
const UNDISTORT_ITERATIONS: usize = 20;

/// A calibrated camera: intrinsics, distortion and pose.
///
/// The pose is stored as the row-major 4x4 extrinsic `[R | t]` that maps
/// world coordinates into the camera frame, `x_cam = T * x_world`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct CameraData {
    /// Camera port (identifier).
    pub port: u32,
    /// Image size in pixels (width, height).
    pub size: [u32; 2],
    /// Row-major 3x3 intrinsic matrix.
    pub matrix: [[f64; 3]; 3],
    /// Distortion coefficients in OpenCV order (k1, k2, p1, p2, k3).
    pub distortions: [f64; 5],
    /// Row-major 4x4 world to camera transform.
    pub transformation: [[f64; 4]; 4],
}

impl CameraData {
    /// Creates a camera from its intrinsics and a world to camera pose.
    pub fn new(
        port: u32,
        size: [u32; 2],
        matrix: [[f64; 3]; 3],
        distortions: [f64; 5],
        pose: DMat4,
    ) -> Self {
        let mut camera = Self {
            port,
            size,
            matrix,
            distortions,
            transformation: [[0.0; 4]; 4],
        };
        camera.set_pose(pose);
        camera
    }

    /// The world to camera transform as a matrix.
    pub fn pose(&self) -> DMat4 {
        DMat4::from_cols_array_2d(&self.transformation).transpose()
    }

    /// Replace the world to camera transform.
    pub fn set_pose(&mut self, pose: DMat4) {
        self.transformation = pose.transpose().to_cols_array_2d();
    }

    /// The rotation block of the pose.
    pub fn rotation(&self) -> DMat3 {
        DMat3::from_mat4(self.pose())
    }

    /// The translation column of the pose.
    pub fn translation(&self) -> DVec3 {
        self.pose().w_axis.truncate()
    }

    /// The camera center expressed in world coordinates.
    pub fn position(&self) -> DVec3 {
        self.pose().inverse().w_axis.truncate()
    }

    /// The normalized projection matrix `[R | t]`, to be used with undistorted points.
    pub fn projection(&self) -> Projection {
        [
            self.transformation[0],
            self.transformation[1],
            self.transformation[2],
        ]
    }

    /// Apply the distortion model to normalized image coordinates.
    pub fn distort(&self, xn: [f64; 2]) -> [f64; 2] {
        let [k1, k2, p1, p2, k3] = self.distortions;
        let [x, y] = xn;
        let r2 = x * x + y * y;
        let kr = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
        let xd = x * kr + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * kr + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        [xd, yd]
    }

    /// Map a pixel to undistorted normalized image coordinates.
    pub fn undistort(&self, pixel: [f64; 2]) -> [f64; 2] {
        let [[fx, skew, cx], [_, fy, cy], _] = self.matrix;
        let [k1, k2, p1, p2, k3] = self.distortions;

        let y0 = (pixel[1] - cy) / fy;
        let x0 = (pixel[0] - cx - skew * y0) / fx;

        // invert the distortion by fixed point iteration
        let (mut x, mut y) = (x0, y0);
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let icdist = 1.0 / (1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2);
            let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
            let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
            x = (x0 - dx) * icdist;
            y = (y0 - dy) * icdist;
        }

        [x, y]
    }

    /// Project a world point to pixel coordinates.
    ///
    /// Returns `None` when the point lies behind the camera.
    pub fn project(&self, xyz: DVec3) -> Option<[f64; 2]> {
        let xc = self.pose().transform_point3(xyz);
        if xc.z <= f64::EPSILON {
            return None;
        }
        let [xd, yd] = self.distort([xc.x / xc.z, xc.y / xc.z]);
        let [[fx, skew, cx], [_, fy, cy], _] = self.matrix;
        Some([fx * xd + skew * yd + cx, fy * yd + cy])
    }
}

/// A set of calibrated cameras keyed by port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct CameraArray {
    /// The cameras, ordered by port.
    pub cameras: BTreeMap<u32, CameraData>,
}

impl CameraArray {
    /// Build a camera array, keying each camera by its port.
    pub fn new(cameras: impl IntoIterator<Item = CameraData>) -> Self {
        Self {
            cameras: cameras.into_iter().map(|c| (c.port, c)).collect(),
        }
    }

    /// Number of cameras in the array.
    #[inline]
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// Check if the array holds no camera.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// The ports of the array in ascending order.
    pub fn ports(&self) -> Vec<u32> {
        self.cameras.keys().copied().collect()
    }

    /// Look up a camera by port.
    pub fn get(&self, port: u32) -> Option<&CameraData> {
        self.cameras.get(&port)
    }

    /// Look up a camera by port, failing if it is absent.
    pub fn camera(&self, port: u32) -> Result<&CameraData, VolumeError> {
        self.cameras.get(&port).ok_or(VolumeError::UnknownCamera(port))
    }

    /// Iterate over the cameras in port order.
    pub fn iter(&self) -> impl Iterator<Item = &CameraData> {
        self.cameras.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut CameraData> {
        self.cameras.values_mut()
    }

    /// Check that every camera pose is a rigid transform.
    pub fn validate(&self) -> Result<(), VolumeError> {
        for (port, camera) in &self.cameras {
            if *port != camera.port {
                return Err(VolumeError::ShapeMismatch(format!(
                    "camera keyed as port {} reports port {}",
                    port, camera.port
                )));
            }
            check_rigid(&camera.pose())?;
        }
        Ok(())
    }

    /// Read a camera array from a JSON file and validate it.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, VolumeError> {
        let contents = fs::read_to_string(path)?;
        let camera_array: CameraArray = serde_json::from_str(&contents)?;
        camera_array.validate()?;
        Ok(camera_array)
    }

    /// Write the camera array as pretty printed JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), VolumeError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
