use std::path::Path;

use glam::{DMat4, DVec3};
use mocap_batch::{
    BatchContext, BatchError, BatchRunner, TrialStatus, CAMERA_ARRAY_FILE, RECORDINGS_DIR,
};
use mocap_post::{
    artifacts::{xy_file_name, xyz_file_name},
    frames::{raw_data_path, write_raw_detections, RawDetection},
    ProcessingParams, TrackerKind,
};
use mocap_volume::{CameraArray, CameraData};

fn camera_ring(n: u32) -> CameraArray {
    let k = [[850.0, 0.0, 640.0], [0.0, 850.0, 360.0], [0.0, 0.0, 1.0]];
    CameraArray::new((0..n).map(|port| {
        let yaw = port as f64 * std::f64::consts::TAU / n as f64;
        let pose = DMat4::from_translation(DVec3::Z * 3.0) * DMat4::from_rotation_y(yaw);
        CameraData::new(port, [1280, 720], k, [0.0; 5], pose)
    }))
}

/// Write 40 frames of two moving points for the given ports.
fn write_trial(
    trial: &Path,
    cameras: &CameraArray,
    ports: &[u32],
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(trial)?;
    for &port in ports {
        let camera = cameras.camera(port)?;
        let mut rows = Vec::new();
        for sync_index in 0..40i64 {
            for point_id in 0..2u32 {
                let xyz = DVec3::new(0.1 * point_id as f64, 0.0, 0.0)
                    + DVec3::X * 0.003 * sync_index as f64;
                let pixel = camera.project(xyz);
                rows.push(RawDetection {
                    sync_index,
                    frame_time: sync_index as f64 / 25.0,
                    point_id,
                    img_x: pixel.map(|p| p[0]),
                    img_y: pixel.map(|p| p[1]),
                    score: 1.0,
                });
            }
        }
        write_raw_detections(raw_data_path(trial, port), &rows)?;
    }
    Ok(())
}

/// A workspace with three trials; the second only has data from one camera.
fn workspace(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let cameras = camera_ring(3);
    cameras.save_json(root.join(CAMERA_ARRAY_FILE))?;

    let recordings = root.join(RECORDINGS_DIR);
    write_trial(&recordings.join("trial_1"), &cameras, &[0, 1, 2])?;
    write_trial(&recordings.join("trial_2"), &cameras, &[0])?;
    write_trial(&recordings.join("trial_3"), &cameras, &[0, 1, 2])?;
    std::fs::write(recordings.join("notes.txt"), "not a trial")?;
    Ok(())
}

fn runner(root: &Path, workers: usize) -> Result<BatchRunner, BatchError> {
    let ctx = BatchContext::load(root, TrackerKind::Raw, ProcessingParams::default())?;
    Ok(BatchRunner::new(ctx.with_workers(workers)))
}

#[test]
fn test_partial_failure_isolation() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    workspace(dir.path())?;
    let recordings = dir.path().join(RECORDINGS_DIR);

    let report = runner(dir.path(), 1)?.run()?;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(
        report.succeeded(),
        vec![recordings.join("trial_1"), recordings.join("trial_3")]
    );
    assert_eq!(report.failed(), vec![recordings.join("trial_2")]);
    assert!(matches!(report.outcomes[1].status, TrialStatus::Failed(_)));
    assert!((report.success_ratio() - 2.0 / 3.0).abs() < 1e-12);

    assert!(recordings.join("trial_1/RAW").is_dir());
    assert!(recordings.join("trial_3/RAW").is_dir());
    assert!(!recordings.join("trial_2/RAW").exists());
    assert!(!recordings.join("trial_2/.RAW.partial").exists());
    Ok(())
}

#[test]
fn test_wide_sync_span_fails_only_its_trial() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let cameras = camera_ring(3);
    cameras.save_json(dir.path().join(CAMERA_ARRAY_FILE))?;
    let recordings = dir.path().join(RECORDINGS_DIR);

    // one stray row far away from the rest of the trial
    let outlier = recordings.join("trial_1");
    std::fs::create_dir_all(&outlier)?;
    for camera in cameras.iter() {
        let rows = [0i64, 1 << 60]
            .into_iter()
            .map(|sync_index| {
                let pixel = camera.project(DVec3::ZERO);
                RawDetection {
                    sync_index,
                    frame_time: sync_index as f64 / 25.0,
                    point_id: 0,
                    img_x: pixel.map(|p| p[0]),
                    img_y: pixel.map(|p| p[1]),
                    score: 1.0,
                }
            })
            .collect::<Vec<_>>();
        write_raw_detections(raw_data_path(&outlier, camera.port), &rows)?;
    }
    write_trial(&recordings.join("trial_2"), &cameras, &[0, 1, 2])?;

    let report = runner(dir.path(), 1)?.run()?;

    assert_eq!(report.outcomes.len(), 2);
    assert!(matches!(
        &report.outcomes[0].status,
        TrialStatus::Failed(reason) if reason.contains("timeline")
    ));
    assert_eq!(report.outcomes[1].status, TrialStatus::Succeeded);
    assert!(!outlier.join("RAW").exists());
    assert!(!outlier.join(".RAW.partial").exists());
    assert!(recordings.join("trial_2/RAW").is_dir());
    Ok(())
}

#[test]
fn test_idempotent_resume() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    workspace(dir.path())?;
    let output = dir.path().join(RECORDINGS_DIR).join("trial_1").join("RAW");

    let first = runner(dir.path(), 1)?.run()?;
    assert_eq!(first.succeeded().len(), 2);
    let xy = std::fs::read(output.join(xy_file_name(TrackerKind::Raw)))?;
    let xyz = std::fs::read(output.join(xyz_file_name(TrackerKind::Raw)))?;

    let second = runner(dir.path(), 1)?.run()?;
    assert_eq!(second.skipped().len(), 2);
    assert!(second.succeeded().is_empty());
    // the trial without output is retried and fails again
    assert_eq!(second.failed().len(), 1);

    assert_eq!(std::fs::read(output.join(xy_file_name(TrackerKind::Raw)))?, xy);
    assert_eq!(std::fs::read(output.join(xyz_file_name(TrackerKind::Raw)))?, xyz);
    Ok(())
}

#[test]
fn test_stale_staging_is_removed() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    workspace(dir.path())?;
    let trial = dir.path().join(RECORDINGS_DIR).join("trial_1");
    let staging = trial.join(".RAW.partial");
    std::fs::create_dir_all(&staging)?;
    std::fs::write(staging.join("leftover.csv"), "junk")?;

    let report = runner(dir.path(), 1)?.run()?;
    assert_eq!(report.outcomes[0].status, TrialStatus::Succeeded);
    assert!(!staging.exists());
    assert!(!trial.join("RAW").join("leftover.csv").exists());
    Ok(())
}

#[test]
fn test_parallel_report_keeps_order() -> Result<(), Box<dyn std::error::Error>> {
    let sequential_dir = tempfile::tempdir()?;
    workspace(sequential_dir.path())?;
    let parallel_dir = tempfile::tempdir()?;
    workspace(parallel_dir.path())?;

    let sequential = runner(sequential_dir.path(), 1)?.run()?;
    let parallel = runner(parallel_dir.path(), 3)?.run()?;

    let names = |report: &mocap_batch::BatchReport| {
        report
            .outcomes
            .iter()
            .map(|o| (o.trial.file_name().map(|n| n.to_owned()), o.status.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&sequential), names(&parallel));
    Ok(())
}

#[test]
fn test_setup_errors() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    let missing = BatchContext::load(
        dir.path().join("nope"),
        TrackerKind::Raw,
        ProcessingParams::default(),
    );
    assert!(matches!(missing, Err(BatchError::MissingWorkspace(_))));

    let no_recordings =
        BatchContext::load(dir.path(), TrackerKind::Raw, ProcessingParams::default());
    assert!(matches!(no_recordings, Err(BatchError::MissingRecordings(_))));

    std::fs::create_dir_all(dir.path().join(RECORDINGS_DIR))?;
    let no_cameras = BatchContext::load(dir.path(), TrackerKind::Raw, ProcessingParams::default());
    assert!(matches!(no_cameras, Err(BatchError::CameraArray(_))));

    camera_ring(2).save_json(dir.path().join(CAMERA_ARRAY_FILE))?;
    let zero_workers = runner(dir.path(), 0)?.run();
    assert!(matches!(zero_workers, Err(BatchError::InvalidWorkerCount(0))));
    Ok(())
}
