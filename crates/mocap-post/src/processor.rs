use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use mocap_volume::{
    triangulation::{triangulate_observations, TriangulationError},
    CameraArray,
};

use crate::{
    artifacts::{self, XyRecord, XyzRecord},
    filter::Butterworth,
    frames,
    gap_fill::fill_gaps,
    trc::TrcTable,
    PostError, TrackerKind,
};

/// Frame rate assumed when it cannot be derived from the frame times.
pub const DEFAULT_FPS: f64 = 30.0;

/// Largest accepted ratio between the trial timeline length and the number
/// of distinct sync indices that carry keypoints.
pub const MAX_SYNC_SPAN_RATIO: usize = 64;

/// Parameters of [`PostProcessor::create_xyz`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingParams {
    /// Longest run of missing 2D samples that is interpolated.
    pub xy_gap_fill: usize,
    /// Longest run of missing 3D samples that is interpolated.
    pub xyz_gap_fill: usize,
    /// Low-pass cutoff frequency in Hz.
    pub cutoff_freq: f64,
    /// Whether to also export a TRC file.
    pub include_trc: bool,
}

impl Default for ProcessingParams {
    fn default() -> Self {
        Self {
            xy_gap_fill: 3,
            xyz_gap_fill: 3,
            cutoff_freq: 6.0,
            include_trc: true,
        }
    }
}

/// Outcome of [`PostProcessor::create_xy`].
#[derive(Debug, Clone, PartialEq)]
pub struct XySummary {
    /// Ports that contributed raw data.
    pub ports: Vec<u32>,
    /// Number of frames read over all ports.
    pub frames: usize,
    /// Number of tracked keypoints written.
    pub keypoints: usize,
    /// Location of the 2D artifact.
    pub path: PathBuf,
}

/// Outcome of [`PostProcessor::create_xyz`].
#[derive(Debug, Clone, PartialEq)]
pub struct XyzSummary {
    /// Number of sync indices in the trial timeline.
    pub sync_indices: usize,
    /// Number of distinct point ids.
    pub points: usize,
    /// Number of 3D samples written.
    pub samples: usize,
    /// Number of 2D samples filled by interpolation.
    pub xy_filled: usize,
    /// Number of 3D samples filled by interpolation.
    pub xyz_filled: usize,
    /// Frame rate used for filtering and the TRC export.
    pub fps: f64,
    /// Whether the low-pass filter was applied.
    pub filtered: bool,
    /// The tracker output directory.
    pub output_dir: PathBuf,
}

/// Turns the raw recordings of one trial into 2D and 3D artifacts.
///
/// Output is written into a staging directory and only moved to the tracker
/// directory once [`PostProcessor::create_xyz`] succeeds, so an existing
/// tracker directory always holds a complete result.
pub struct PostProcessor<'a> {
    camera_array: &'a CameraArray,
    recording_path: PathBuf,
    tracker: TrackerKind,
}

impl<'a> PostProcessor<'a> {
    /// Create a post processor for one trial directory.
    pub fn new(
        camera_array: &'a CameraArray,
        recording_path: impl Into<PathBuf>,
        tracker: TrackerKind,
    ) -> Self {
        Self {
            camera_array,
            recording_path: recording_path.into(),
            tracker,
        }
    }

    /// The trial directory.
    pub fn recording_path(&self) -> &Path {
        &self.recording_path
    }

    /// Final output directory, `<trial>/<TRACKER>`.
    pub fn tracker_dir(&self) -> PathBuf {
        self.recording_path.join(self.tracker.name())
    }

    /// Staging directory, `<trial>/.<TRACKER>.partial`.
    pub fn staging_dir(&self) -> PathBuf {
        self.recording_path
            .join(format!(".{}.partial", self.tracker.name()))
    }

    /// Whether the trial already has complete output for this tracker.
    pub fn is_processed(&self) -> bool {
        self.tracker_dir().is_dir()
    }

    /// Remove a leftover staging directory.
    ///
    /// # Returns
    ///
    /// `true` if a staging directory was removed.
    pub fn discard_partial(&self) -> Result<bool, PostError> {
        let staging = self.staging_dir();
        if !staging.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&staging)?;
        log::debug!("Removed partial output {}", staging.display());
        Ok(true)
    }

    /// Track 2D keypoints in the raw frames of every camera.
    pub fn create_xy(&self) -> Result<XySummary, PostError> {
        if !self.recording_path.is_dir() {
            return Err(PostError::MissingRecording(self.recording_path.clone()));
        }

        let tracker = self.tracker.build();

        let mut ports = Vec::new();
        let mut num_frames = 0;
        let mut records = Vec::new();
        for port in self.camera_array.ports() {
            let path = frames::raw_data_path(&self.recording_path, port);
            if !path.is_file() {
                log::warn!("No raw data for camera {port} at {}", path.display());
                continue;
            }

            let camera_frames = frames::read_frames(&path, port)?;
            num_frames += camera_frames.len();
            for frame in &camera_frames {
                records.extend(tracker.extract(frame).into_iter().map(|kp| XyRecord {
                    sync_index: frame.sync_index,
                    port,
                    frame_time: frame.frame_time,
                    point_id: kp.point_id,
                    img_x: kp.img[0],
                    img_y: kp.img[1],
                }));
            }
            ports.push(port);
        }

        if ports.is_empty() {
            return Err(PostError::NoRawData(self.recording_path.clone()));
        }

        records.sort_by_key(|r| (r.sync_index, r.port, r.point_id));

        let staging = self.staging_dir();
        fs::create_dir_all(&staging)?;
        let path = staging.join(artifacts::xy_file_name(self.tracker));
        artifacts::write_records(&path, &records)?;

        log::info!(
            "Tracked {} keypoints in {} frames from {} cameras with {}",
            records.len(),
            num_frames,
            ports.len(),
            self.tracker
        );

        Ok(XySummary {
            ports,
            frames: num_frames,
            keypoints: records.len(),
            path,
        })
    }

    /// Triangulate, gap fill and smooth the 2D keypoints of [`Self::create_xy`].
    ///
    /// On success the staging directory becomes the tracker directory.
    pub fn create_xyz(&self, params: &ProcessingParams) -> Result<XyzSummary, PostError> {
        let staging = self.staging_dir();
        let xy_path = staging.join(artifacts::xy_file_name(self.tracker));
        if !xy_path.is_file() {
            return Err(PostError::MissingXy(xy_path));
        }

        let records: Vec<XyRecord> = artifacts::read_records(&xy_path)?;
        let (Some(first), Some(last)) = (
            records.iter().map(|r| r.sync_index).min(),
            records.iter().map(|r| r.sync_index).max(),
        ) else {
            return Err(PostError::NoTriangulatedPoints(self.recording_path.clone()));
        };
        let n = timeline_len(&records, first, last).ok_or_else(|| PostError::SyncSpan {
            path: xy_path.clone(),
            first,
            last,
        })?;
        let slot = |sync_index: i64| (sync_index - first) as usize;

        let times = frame_times(&records, first, n);
        let fps = estimate_fps(&times);

        // 2D series per (port, point id) over the full timeline
        let mut xy: BTreeMap<(u32, u32), Vec<Option<[f64; 2]>>> = BTreeMap::new();
        for r in &records {
            xy.entry((r.port, r.point_id)).or_insert_with(|| vec![None; n])[slot(r.sync_index)] =
                Some([r.img_x, r.img_y]);
        }
        let xy_filled = xy
            .values_mut()
            .map(|series| fill_gaps(series, params.xy_gap_fill))
            .sum::<usize>();

        let point_ids: BTreeSet<u32> = xy.keys().map(|&(_, point_id)| point_id).collect();

        let mut xyz: BTreeMap<u32, Vec<Option<[f64; 3]>>> = BTreeMap::new();
        for &point_id in &point_ids {
            let views: Vec<(u32, &Vec<Option<[f64; 2]>>)> = xy
                .iter()
                .filter(|((_, id), _)| *id == point_id)
                .map(|(&(port, _), series)| (port, series))
                .collect();

            let mut series = Vec::with_capacity(n);
            for s in 0..n {
                let observed: Vec<(u32, [f64; 2])> = views
                    .iter()
                    .filter_map(|(port, samples)| samples[s].map(|px| (*port, px)))
                    .collect();
                let sample = match triangulate_observations(self.camera_array, &observed) {
                    Ok(p) => Some(p),
                    Err(TriangulationError::InsufficientViews { .. })
                    | Err(TriangulationError::PointAtInfinity) => None,
                    Err(e) => return Err(e.into()),
                };
                series.push(sample);
            }

            if series.iter().any(Option::is_some) {
                xyz.insert(point_id, series);
            }
        }

        if xyz.is_empty() {
            return Err(PostError::NoTriangulatedPoints(self.recording_path.clone()));
        }

        let xyz_filled = xyz
            .values_mut()
            .map(|series| fill_gaps(series, params.xyz_gap_fill))
            .sum::<usize>();

        let filtered = match Butterworth::lowpass(params.cutoff_freq, fps) {
            Some(filter) => {
                let segments = xyz
                    .values_mut()
                    .map(|series| filter.filter_segments(series))
                    .sum::<usize>();
                log::debug!("Filtered {segments} segments at {} Hz", params.cutoff_freq);
                true
            }
            None => {
                log::warn!(
                    "Cutoff {} Hz is not below Nyquist at {fps:.2} fps, skipping filter",
                    params.cutoff_freq
                );
                false
            }
        };

        let mut xyz_records = Vec::new();
        for s in 0..n {
            for (&point_id, series) in &xyz {
                if let Some([x, y, z]) = series[s] {
                    xyz_records.push(XyzRecord {
                        sync_index: first + s as i64,
                        frame_time: times[s],
                        point_id,
                        x,
                        y,
                        z,
                    });
                }
            }
        }
        artifacts::write_records(
            staging.join(artifacts::xyz_file_name(self.tracker)),
            &xyz_records,
        )?;

        if params.include_trc {
            let tracker = self.tracker.build();
            let table = TrcTable {
                data_rate: fps,
                marker_names: xyz.keys().map(|&id| tracker.point_name(id)).collect(),
                times,
                rows: (0..n)
                    .map(|s| xyz.values().map(|series| series[s]).collect())
                    .collect(),
            };
            table.write(staging.join(artifacts::trc_file_name(self.tracker)))?;
        }

        let output_dir = self.tracker_dir();
        if output_dir.exists() {
            fs::remove_dir_all(&output_dir)?;
        }
        fs::rename(&staging, &output_dir)?;

        log::info!(
            "Wrote {} 3D samples of {} points over {} frames to {}",
            xyz_records.len(),
            xyz.len(),
            n,
            output_dir.display()
        );

        Ok(XyzSummary {
            sync_indices: n,
            points: xyz.len(),
            samples: xyz_records.len(),
            xy_filled,
            xyz_filled,
            fps,
            filtered,
            output_dir,
        })
    }
}

/// Length of the dense timeline from `first` to `last`.
///
/// `None` when the span does not fit in memory or is far longer than the
/// number of distinct sync indices in `records`.
fn timeline_len(records: &[XyRecord], first: i64, last: i64) -> Option<usize> {
    let span = last.checked_sub(first)?.checked_add(1)?;
    let n = usize::try_from(span).ok()?;
    let distinct = records
        .iter()
        .map(|r| r.sync_index)
        .collect::<BTreeSet<_>>()
        .len();
    (n <= distinct.checked_mul(MAX_SYNC_SPAN_RATIO)?).then_some(n)
}

/// Mean frame time of every sync index from `first` on.
///
/// Each camera counts once per sync index. Sync indices without any frame
/// time are linearly interpolated.
fn frame_times(records: &[XyRecord], first: i64, n: usize) -> Vec<f64> {
    let per_camera: BTreeMap<(i64, u32), f64> = records
        .iter()
        .map(|r| ((r.sync_index, r.port), r.frame_time))
        .collect();

    let mut sums = vec![(0.0, 0usize); n];
    for (&(sync_index, _), &t) in &per_camera {
        let entry = &mut sums[(sync_index - first) as usize];
        entry.0 += t;
        entry.1 += 1;
    }

    let mut times: Vec<Option<[f64; 1]>> = sums
        .into_iter()
        .map(|(sum, count)| (count > 0).then(|| [sum / count as f64]))
        .collect();
    fill_gaps(&mut times, n);

    times.into_iter().map(|t| t.map_or(0.0, |[t]| t)).collect()
}

/// Frame rate from the first and last frame time.
///
/// Falls back to [`DEFAULT_FPS`] when the times do not increase.
pub fn estimate_fps(times: &[f64]) -> f64 {
    if let (Some(&t0), Some(&t1)) = (times.first(), times.last()) {
        let elapsed = t1 - t0;
        if times.len() > 1 && elapsed.is_finite() && elapsed > 0.0 {
            return (times.len() - 1) as f64 / elapsed;
        }
    }
    log::warn!("Cannot derive frame rate from frame times, assuming {DEFAULT_FPS} fps");
    DEFAULT_FPS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_fps() {
        let times: Vec<f64> = (0..31).map(|i| i as f64 / 30.0).collect();
        approx::assert_relative_eq!(estimate_fps(&times), 30.0, epsilon = 1e-9);
        assert_eq!(estimate_fps(&[1.0]), DEFAULT_FPS);
        assert_eq!(estimate_fps(&[1.0, 1.0, 1.0]), DEFAULT_FPS);
        assert_eq!(estimate_fps(&[]), DEFAULT_FPS);
    }

    #[test]
    fn test_frame_times_interpolates_missing_sync() {
        let record = |sync_index, port, frame_time| XyRecord {
            sync_index,
            port,
            frame_time,
            point_id: 0,
            img_x: 0.0,
            img_y: 0.0,
        };
        let records = vec![
            record(5, 0, 1.0),
            record(5, 1, 1.2),
            record(7, 0, 1.5),
            record(7, 0, 1.5),
        ];
        let times = frame_times(&records, 5, 3);
        approx::assert_relative_eq!(times[0], 1.1, epsilon = 1e-12);
        approx::assert_relative_eq!(times[1], 1.3, epsilon = 1e-12);
        approx::assert_relative_eq!(times[2], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_timeline_len() {
        let record = |sync_index| XyRecord {
            sync_index,
            port: 0,
            frame_time: 0.0,
            point_id: 0,
            img_x: 0.0,
            img_y: 0.0,
        };
        let dense = vec![record(3), record(4), record(6)];
        assert_eq!(timeline_len(&dense, 3, 6), Some(4));

        let outlier = vec![record(0), record(1 << 60)];
        assert_eq!(timeline_len(&outlier, 0, 1 << 60), None);

        let extreme = vec![record(i64::MIN), record(i64::MAX)];
        assert_eq!(timeline_len(&extreme, i64::MIN, i64::MAX), None);
    }

    #[test]
    fn test_default_params() {
        let params = ProcessingParams::default();
        assert_eq!(params.xy_gap_fill, 3);
        assert_eq!(params.xyz_gap_fill, 3);
        assert_eq!(params.cutoff_freq, 6.0);
        assert!(params.include_trc);
    }

    #[test]
    fn test_discard_partial() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let cameras = CameraArray::default();
        let processor = PostProcessor::new(&cameras, dir.path(), TrackerKind::Raw);
        assert!(!processor.discard_partial()?);
        fs::create_dir_all(processor.staging_dir())?;
        assert!(processor.discard_partial()?);
        assert!(!processor.staging_dir().exists());
        assert!(!processor.is_processed());
        Ok(())
    }
}
