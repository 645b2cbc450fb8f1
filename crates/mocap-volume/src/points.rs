use std::collections::{BTreeMap, BTreeSet};

use bincode::{Decode, Encode};

use crate::{
    io::PointObservation,
    triangulation::{triangulate_observations, TriangulationError},
    CameraArray, VolumeError,
};

/// A single 2D observation tied to its 3D estimate.
#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct Observation {
    /// Synchronization index of the capture instant.
    pub sync_index: i64,
    /// Port of the observing camera.
    pub port: u32,
    /// Identity of the observed point.
    pub point_id: u32,
    /// Observed pixel coordinates.
    pub img: [f64; 2],
    /// Row of the 3D estimate in [`PointEstimates::obj`].
    pub obj_index: usize,
}

/// Sparse table of 2D observations and the 3D points they constrain.
///
/// Observations map into `obj` through `obj_index`. For one sync index the
/// same point id may own several 3D rows until the table is deduplicated, so
/// consumers should go through [`PointEstimates::points_at`].
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct PointEstimates {
    observations: Vec<Observation>,
    obj: Vec<[f64; 3]>,
}

impl PointEstimates {
    /// Create point estimates, checking every `obj_index` is in range.
    pub fn new(observations: Vec<Observation>, obj: Vec<[f64; 3]>) -> Result<Self, VolumeError> {
        if let Some(bad) = observations.iter().find(|o| o.obj_index >= obj.len()) {
            return Err(VolumeError::ShapeMismatch(format!(
                "observation refers to 3D point {} but only {} exist",
                bad.obj_index,
                obj.len()
            )));
        }
        Ok(Self { observations, obj })
    }

    /// Triangulate initial 3D estimates from 2D calibration observations.
    ///
    /// One 3D point is produced per `(sync_index, point_id)` seen by at least
    /// two distinct cameras. Points with fewer views are dropped.
    pub fn triangulate(
        camera_array: &CameraArray,
        observations: &[PointObservation],
    ) -> Result<Self, VolumeError> {
        let mut groups: BTreeMap<(i64, u32), BTreeMap<u32, [f64; 2]>> = BTreeMap::new();
        for o in observations {
            groups
                .entry((o.sync_index, o.point_id))
                .or_default()
                .insert(o.port, [o.img_x, o.img_y]);
        }

        let mut estimates = Self::default();
        let mut dropped = 0usize;
        for ((sync_index, point_id), views) in groups {
            let views = views.into_iter().collect::<Vec<_>>();
            let xyz = match triangulate_observations(camera_array, &views) {
                Ok(xyz) => xyz,
                Err(TriangulationError::InsufficientViews { .. })
                | Err(TriangulationError::PointAtInfinity) => {
                    dropped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let obj_index = estimates.obj.len();
            estimates.obj.push(xyz);
            estimates
                .observations
                .extend(views.into_iter().map(|(port, img)| Observation {
                    sync_index,
                    port,
                    point_id,
                    img,
                    obj_index,
                }));
        }

        log::debug!(
            "Triangulated {} points, dropped {} with too few views",
            estimates.obj.len(),
            dropped
        );

        Ok(estimates)
    }

    /// Number of 2D observations.
    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Check if there are no observations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Number of 3D points.
    #[inline]
    pub fn n_points(&self) -> usize {
        self.obj.len()
    }

    /// The 2D observations.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// The 3D point estimates.
    pub fn obj(&self) -> &[[f64; 3]] {
        &self.obj
    }

    /// Replace all 3D coordinates at once.
    pub fn set_obj(&mut self, obj: Vec<[f64; 3]>) -> Result<(), VolumeError> {
        if obj.len() != self.obj.len() {
            return Err(VolumeError::ShapeMismatch(format!(
                "expected {} 3D points, got {}",
                self.obj.len(),
                obj.len()
            )));
        }
        self.obj = obj;
        Ok(())
    }

    /// The distinct sync indices, ascending.
    pub fn sync_indices(&self) -> Vec<i64> {
        self.observations
            .iter()
            .map(|o| o.sync_index)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The 3D points of one sync index, deduplicated by id and sorted by id.
    ///
    /// When an id owns several 3D rows the first observed one is kept.
    pub fn points_at(&self, sync_index: i64) -> Vec<(u32, [f64; 3])> {
        let mut points = BTreeMap::new();
        for o in self.observations.iter().filter(|o| o.sync_index == sync_index) {
            points.entry(o.point_id).or_insert(self.obj[o.obj_index]);
        }
        points.into_iter().collect()
    }

    /// Check the estimates are consistent with a camera array.
    pub fn validate_against(&self, camera_array: &CameraArray) -> Result<(), VolumeError> {
        for o in &self.observations {
            if camera_array.get(o.port).is_none() {
                return Err(VolumeError::ShapeMismatch(format!(
                    "observation at sync index {} refers to camera {} which is not in the array",
                    o.sync_index, o.port
                )));
            }
            if o.obj_index >= self.obj.len() {
                return Err(VolumeError::ShapeMismatch(format!(
                    "observation refers to 3D point {} but only {} exist",
                    o.obj_index,
                    self.obj.len()
                )));
            }
        }
        Ok(())
    }
}
