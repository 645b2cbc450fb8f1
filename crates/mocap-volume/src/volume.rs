use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use bincode::{Decode, Encode};
use glam::{DMat4, DVec3};

use crate::{
    optimize::BundleAdjuster,
    transforms::{check_rigid, fit_rigid_transform},
    CameraArray, PointEstimates, VolumeError,
};

/// Version of the snapshot layout written by [`CaptureVolume::save`].
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Encode, Decode)]
struct Snapshot {
    version: u32,
    stage: u32,
    camera_array: CameraArray,
    point_estimates: PointEstimates,
}

/// Reprojection error of a capture volume in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprojectionError {
    /// Root-mean-square error over all observations.
    pub overall: f64,
    /// Root-mean-square error per camera port.
    pub per_camera: BTreeMap<u32, f64>,
    /// Number of observations that projected in front of their camera.
    pub num_observations: usize,
}

/// Outcome of [`CaptureVolume::optimize`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationSummary {
    /// RMSE before the adjustment.
    pub rmse_before: f64,
    /// RMSE after the adjustment.
    pub rmse_after: f64,
    /// Stage of the volume after the adjustment.
    pub stage: u32,
}

/// Calibrated cameras together with the 3D points they observe.
///
/// Cameras and points always live in the same world frame: every operation
/// that moves one moves the other.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureVolume {
    camera_array: CameraArray,
    point_estimates: PointEstimates,
    stage: u32,
}

impl CaptureVolume {
    /// Compose a capture volume, checking cameras and points agree.
    pub fn new(
        camera_array: CameraArray,
        point_estimates: PointEstimates,
    ) -> Result<Self, VolumeError> {
        camera_array.validate()?;
        point_estimates.validate_against(&camera_array)?;
        Ok(Self {
            camera_array,
            point_estimates,
            stage: 0,
        })
    }

    /// The camera array.
    pub fn camera_array(&self) -> &CameraArray {
        &self.camera_array
    }

    /// The point estimates.
    pub fn point_estimates(&self) -> &PointEstimates {
        &self.point_estimates
    }

    /// Number of successful optimizations applied so far.
    pub fn stage(&self) -> u32 {
        self.stage
    }

    /// Split the volume into its camera array and point estimates.
    pub fn into_parts(self) -> (CameraArray, PointEstimates) {
        (self.camera_array, self.point_estimates)
    }

    /// Re-express cameras and points in a new world frame.
    ///
    /// Every camera transform `T_cam` becomes `T_cam * T_new` and every point
    /// `p` becomes `T_new^-1 * p`, so `T_cam * p` and therefore every
    /// reprojection is unchanged. Applying `T1` then `T2` is the same as
    /// applying `T1 * T2`.
    ///
    /// # Errors
    ///
    /// [`VolumeError::SingularTransform`] or [`VolumeError::NonRigidTransform`]
    /// for a bad `new_origin`, [`VolumeError::ShapeMismatch`] when the point
    /// estimates do not fit the camera array. Nothing is modified on error.
    pub fn set_origin(&mut self, new_origin: &DMat4) -> Result<(), VolumeError> {
        check_rigid(new_origin)?;
        self.point_estimates.validate_against(&self.camera_array)?;

        let origin_inv = new_origin.inverse();
        let obj = self
            .point_estimates
            .obj()
            .iter()
            .map(|p| {
                let ph = origin_inv * DVec3::from_array(*p).extend(1.0);
                ph.truncate().to_array()
            })
            .collect::<Vec<_>>();

        self.point_estimates.set_obj(obj)?;
        for camera in self.camera_array.iter_mut() {
            camera.set_pose(camera.pose() * *new_origin);
        }

        log::debug!(
            "Moved origin of {} cameras and {} points",
            self.camera_array.len(),
            self.point_estimates.n_points()
        );

        Ok(())
    }

    /// The origin transform that makes a calibration board the world frame.
    ///
    /// The points estimated at `sync_index` are deduplicated by id and paired
    /// with `board_points` (corner coordinates in the board frame) of the same
    /// id. The returned transform maps board coordinates into the current world
    /// frame, so passing it to [`CaptureVolume::set_origin`] puts every board
    /// corner at its board coordinates.
    pub fn board_origin(
        &self,
        sync_index: i64,
        board_points: &BTreeMap<u32, [f64; 3]>,
    ) -> Result<DMat4, VolumeError> {
        let (board, world): (Vec<DVec3>, Vec<DVec3>) = self
            .point_estimates
            .points_at(sync_index)
            .into_iter()
            .filter_map(|(id, xyz)| {
                board_points
                    .get(&id)
                    .map(|b| (DVec3::from_array(*b), DVec3::from_array(xyz)))
            })
            .unzip();

        fit_rigid_transform(&board, &world)
    }

    /// Reprojection error of all observations against the current geometry.
    pub fn reprojection_error(&self) -> ReprojectionError {
        let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        for o in self.point_estimates.observations() {
            let xyz = DVec3::from_array(self.point_estimates.obj()[o.obj_index]);
            let Some(pixel) = self.camera_array.get(o.port).and_then(|c| c.project(xyz)) else {
                continue;
            };
            let sq = (pixel[0] - o.img[0]).powi(2) + (pixel[1] - o.img[1]).powi(2);
            let entry = sums.entry(o.port).or_insert((0.0, 0));
            entry.0 += sq;
            entry.1 += 1;
        }

        let (total, count) = sums
            .values()
            .fold((0.0, 0), |(s, n), (si, ni)| (s + si, n + ni));

        // each observation carries two residuals, x and y
        let rmse = |s: f64, n: usize| if n == 0 { 0.0 } else { (s / (2 * n) as f64).sqrt() };

        ReprojectionError {
            overall: rmse(total, count),
            per_camera: sums
                .into_iter()
                .map(|(port, (s, n))| (port, rmse(s, n)))
                .collect(),
            num_observations: count,
        }
    }

    /// Refine cameras and points with a bundle adjuster.
    ///
    /// The volume is replaced by the adjusted result and its stage is bumped.
    pub fn optimize<A: BundleAdjuster>(
        &mut self,
        adjuster: &A,
    ) -> Result<OptimizationSummary, VolumeError> {
        let rmse_before = self.reprojection_error().overall;
        log::info!(
            "Optimizing capture volume at stage {} (rmse {:.4} px)",
            self.stage,
            rmse_before
        );

        let (camera_array, point_estimates) =
            adjuster.adjust(&self.camera_array, &self.point_estimates)?;
        camera_array.validate()?;
        point_estimates.validate_against(&camera_array)?;

        self.camera_array = camera_array;
        self.point_estimates = point_estimates;
        self.stage += 1;

        let rmse_after = self.reprojection_error().overall;
        log::info!(
            "Capture volume optimized to stage {} (rmse {:.4} px)",
            self.stage,
            rmse_after
        );

        Ok(OptimizationSummary {
            rmse_before,
            rmse_after,
            stage: self.stage,
        })
    }

    /// Path of the snapshot with the given tag inside `directory`.
    pub fn snapshot_path(directory: impl AsRef<Path>, tag: &str) -> PathBuf {
        directory.as_ref().join(format!("capture_volume_{tag}.bin"))
    }

    /// Write a self-contained snapshot of the volume.
    ///
    /// The file is written next to its final location and renamed into place,
    /// so a reader never sees a half written snapshot.
    pub fn save(&self, directory: impl AsRef<Path>, tag: &str) -> Result<PathBuf, VolumeError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            stage: self.stage,
            camera_array: self.camera_array.clone(),
            point_estimates: self.point_estimates.clone(),
        };
        let bytes = bincode::encode_to_vec(&snapshot, bincode::config::standard())?;

        fs::create_dir_all(directory.as_ref())?;
        let path = Self::snapshot_path(directory, tag);
        let tmp_path = path.with_extension("bin.tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &path)?;

        log::info!("Saved capture volume snapshot {}", path.display());
        Ok(path)
    }

    /// Read a snapshot written by [`CaptureVolume::save`].
    pub fn load(directory: impl AsRef<Path>, tag: &str) -> Result<Self, VolumeError> {
        let path = Self::snapshot_path(directory, tag);
        let bytes = fs::read(&path)?;
        let (snapshot, _): (Snapshot, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard())?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(VolumeError::SnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let mut volume = Self::new(snapshot.camera_array, snapshot.point_estimates)?;
        volume.stage = snapshot.stage;
        Ok(volume)
    }
}
