use std::collections::BTreeMap;

use glam::{DMat4, DVec3};
use mocap_volume::{
    io::{BoardDefinition, PointObservation},
    optimize::PointRefiner,
    transforms::{rigid_from_rvec_tvec, rotation_from_rvec},
    CameraArray, CameraData, CaptureVolume, PointEstimates, VolumeError,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn camera_ring(n: u32) -> CameraArray {
    let k = [[850.0, 0.0, 640.0], [0.0, 850.0, 360.0], [0.0, 0.0, 1.0]];
    CameraArray::new((0..n).map(|port| {
        let yaw = port as f64 * std::f64::consts::TAU / n as f64;
        // cameras on a circle of radius 3 looking at the origin
        let pose = DMat4::from_translation(DVec3::Z * 3.0) * DMat4::from_rotation_y(yaw);
        CameraData::new(port, [1280, 720], k, [-0.05, 0.01, 0.0, 0.0, 0.0], pose)
    }))
}

fn random_rigid(rng: &mut StdRng) -> DMat4 {
    rigid_from_rvec_tvec(
        [
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
        ],
        [
            rng.random_range(-2.0..2.0),
            rng.random_range(-2.0..2.0),
            rng.random_range(-2.0..2.0),
        ],
    )
}

/// Board corners at a few sync indices, observed by every camera that sees them.
fn board_volume(board: &BoardDefinition, board_pose: DMat4) -> Result<CaptureVolume, VolumeError> {
    let cams = camera_ring(4);
    let mut observations = Vec::new();
    for sync_index in 0..3i64 {
        let motion = DMat4::from_translation(DVec3::new(0.05 * sync_index as f64, 0.0, 0.0));
        for (&point_id, corner) in &board.corners {
            let xyz = (motion * board_pose).transform_point3(DVec3::from_array(*corner));
            for cam in cams.iter() {
                if let Some([img_x, img_y]) = cam.project(xyz) {
                    observations.push(PointObservation {
                        sync_index,
                        port: cam.port,
                        point_id,
                        img_x,
                        img_y,
                    });
                }
            }
        }
    }
    let points = PointEstimates::triangulate(&cams, &observations)?;
    CaptureVolume::new(cams, points)
}

fn assert_same_state(a: &CaptureVolume, b: &CaptureVolume, tol: f64) {
    for (ca, cb) in a.camera_array().iter().zip(b.camera_array().iter()) {
        assert!(
            ca.pose().abs_diff_eq(cb.pose(), tol),
            "camera {} differs",
            ca.port
        );
    }
    for (pa, pb) in a
        .point_estimates()
        .obj()
        .iter()
        .zip(b.point_estimates().obj().iter())
    {
        for i in 0..3 {
            assert!((pa[i] - pb[i]).abs() < tol, "{pa:?} != {pb:?}");
        }
    }
}

#[test]
fn test_set_origin_preserves_reprojection() -> Result<(), VolumeError> {
    let board = BoardDefinition::chessboard(4, 3, 0.1);
    let mut volume = board_volume(&board, rigid_from_rvec_tvec([0.1, 0.2, 0.0], [-0.1, 0.0, 0.1]))?;
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..10 {
        let before = volume.clone();
        volume.set_origin(&random_rigid(&mut rng))?;

        for (obs_idx, o) in before.point_estimates().observations().iter().enumerate() {
            let old_xyz = DVec3::from_array(before.point_estimates().obj()[o.obj_index]);
            let new_xyz = DVec3::from_array(volume.point_estimates().obj()[o.obj_index]);
            let old_px = before.camera_array().camera(o.port)?.project(old_xyz).unwrap();
            let new_px = volume.camera_array().camera(o.port)?.project(new_xyz).unwrap();
            assert!(
                (old_px[0] - new_px[0]).abs() < 1e-6 && (old_px[1] - new_px[1]).abs() < 1e-6,
                "observation {obs_idx} moved from {old_px:?} to {new_px:?}"
            );
        }
        assert!(volume.camera_array().validate().is_ok());
    }
    Ok(())
}

#[test]
fn test_set_origin_composition() -> Result<(), VolumeError> {
    let board = BoardDefinition::chessboard(3, 3, 0.1);
    let base = board_volume(&board, DMat4::IDENTITY)?;
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..5 {
        let t1 = random_rigid(&mut rng);
        let t2 = random_rigid(&mut rng);

        let mut sequential = base.clone();
        sequential.set_origin(&t1)?;
        sequential.set_origin(&t2)?;

        let mut combined = base.clone();
        combined.set_origin(&(t1 * t2))?;

        assert_same_state(&sequential, &combined, 1e-9);
    }
    Ok(())
}

#[test]
fn test_set_origin_moves_points_by_inverse() -> Result<(), VolumeError> {
    let board = BoardDefinition::chessboard(3, 2, 0.1);
    let mut volume = board_volume(&board, DMat4::IDENTITY)?;
    let before = volume.point_estimates().obj().to_vec();

    // half turn about x and a unit shift along y
    let new_origin = rigid_from_rvec_tvec([std::f64::consts::PI, 0.0, 0.0], [0.0, 1.0, 0.0]);
    volume.set_origin(&new_origin)?;

    let inv = new_origin.inverse();
    for (old, new) in before.iter().zip(volume.point_estimates().obj()) {
        let expected = inv.transform_point3(DVec3::from_array(*old));
        assert!(expected.abs_diff_eq(DVec3::from_array(*new), 1e-12));
    }
    Ok(())
}

#[test]
fn test_set_origin_rejects_non_rigid() -> Result<(), VolumeError> {
    let board = BoardDefinition::chessboard(3, 2, 0.1);
    let mut volume = board_volume(&board, DMat4::IDENTITY)?;
    let before = volume.clone();

    let scaled = DMat4::from_scale(DVec3::splat(2.0));
    assert!(matches!(
        volume.set_origin(&scaled),
        Err(VolumeError::NonRigidTransform(_))
    ));
    assert_eq!(volume, before);
    Ok(())
}

#[test]
fn test_board_origin_places_board_at_origin() -> Result<(), VolumeError> {
    let board = BoardDefinition::chessboard(5, 4, 0.05);
    let board_pose = DMat4::from_translation(DVec3::new(0.2, -0.1, 0.3))
        * DMat4::from_mat3(rotation_from_rvec(DVec3::new(0.3, -0.2, 0.5)));
    let mut volume = board_volume(&board, board_pose)?;

    let new_origin = volume.board_origin(0, &board.corners)?;
    volume.set_origin(&new_origin)?;

    let points: BTreeMap<u32, [f64; 3]> =
        volume.point_estimates().points_at(0).into_iter().collect();
    assert_eq!(points.len(), board.corners.len());
    for (id, corner) in &board.corners {
        let xyz = points[id];
        for i in 0..3 {
            assert!((xyz[i] - corner[i]).abs() < 1e-6, "corner {id}: {xyz:?} vs {corner:?}");
        }
    }
    Ok(())
}

#[test]
fn test_board_origin_needs_three_corners() -> Result<(), VolumeError> {
    let board = BoardDefinition::chessboard(3, 2, 0.1);
    let volume = board_volume(&board, DMat4::IDENTITY)?;
    let partial: BTreeMap<u32, [f64; 3]> = board.corners.into_iter().take(2).collect();
    assert!(matches!(
        volume.board_origin(0, &partial),
        Err(VolumeError::InsufficientCorrespondences { required: 3, actual: 2 })
    ));
    Ok(())
}

#[test]
fn test_snapshot_roundtrip_is_bit_exact() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let board = BoardDefinition::chessboard(4, 3, 0.1);
    let mut volume = board_volume(&board, rigid_from_rvec_tvec([0.3, 0.0, 0.1], [0.0, 0.1, 0.0]))?;
    volume.set_origin(&rigid_from_rvec_tvec([0.1, 0.2, 0.3], [0.4, 0.5, 0.6]))?;

    let path = volume.save(dir.path(), "new_origin")?;
    assert!(path.ends_with("capture_volume_new_origin.bin"));
    let loaded = CaptureVolume::load(dir.path(), "new_origin")?;

    assert_eq!(loaded, volume);
    for (a, b) in loaded
        .point_estimates()
        .obj()
        .iter()
        .zip(volume.point_estimates().obj())
    {
        for i in 0..3 {
            assert_eq!(a[i].to_bits(), b[i].to_bits());
        }
    }
    for (a, b) in loaded.camera_array().iter().zip(volume.camera_array().iter()) {
        for (ra, rb) in a.transformation.iter().zip(b.transformation.iter()) {
            for (x, y) in ra.iter().zip(rb.iter()) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
        }
    }
    Ok(())
}

#[test]
fn test_optimize_converges() -> Result<(), VolumeError> {
    let board = BoardDefinition::chessboard(4, 3, 0.1);
    let volume = board_volume(&board, DMat4::IDENTITY)?;

    // add pixel noise so there is something to refine
    let (cams, points) = volume.into_parts();
    let mut rng = StdRng::seed_from_u64(3);
    let noisy = points
        .observations()
        .iter()
        .map(|o| {
            let mut o = *o;
            o.img[0] += rng.random_range(-0.5..0.5);
            o.img[1] += rng.random_range(-0.5..0.5);
            o
        })
        .collect();
    let perturbed = points
        .obj()
        .iter()
        .map(|p| [p[0] + 0.01, p[1] - 0.01, p[2] + 0.005])
        .collect();
    let mut volume = CaptureVolume::new(cams, PointEstimates::new(noisy, perturbed)?)?;

    let refiner = PointRefiner::default();
    let first = volume.optimize(&refiner)?;
    assert!(first.rmse_after <= first.rmse_before);
    assert_eq!(first.stage, 1);

    let second = volume.optimize(&refiner)?;
    assert!(second.rmse_after <= second.rmse_before + 1e-12);
    assert!((second.rmse_after - first.rmse_after).abs() < 1e-3);
    assert_eq!(volume.stage(), 2);
    Ok(())
}
