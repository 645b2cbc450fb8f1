use std::path::{Path, PathBuf};

use argh::FromArgs;

use mocap_batch::{BatchContext, BatchRunner, CAMERA_ARRAY_FILE};
use mocap_post::{ProcessingParams, TrackerKind};
use mocap_volume::{
    io::{read_point_data, BoardDefinition},
    optimize::PointRefiner,
    transforms::rigid_from_rvec_tvec,
    CameraArray, CaptureVolume, PointEstimates,
};

const CALIBRATION_DIR: &str = "calibration";
const POINT_DATA_FILE: &str = "point_data.csv";

#[derive(FromArgs, Debug)]
/// Multi-camera motion capture calibration and post processing.
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Command {
    Batch(BatchArgs),
    InitVolume(InitVolumeArgs),
    Optimize(OptimizeArgs),
    SetOrigin(SetOriginArgs),
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "batch")]
/// Process every trial of a workspace with one tracker.
struct BatchArgs {
    /// path to the workspace directory
    #[argh(positional)]
    workspace: PathBuf,

    /// name of the tracker to use (RAW, CONFIDENT, CENTROID)
    #[argh(option)]
    tracker: TrackerKind,

    /// longest 2D gap to interpolate, in frames
    #[argh(option, default = "3")]
    xy_gap_fill: usize,

    /// longest 3D gap to interpolate, in frames
    #[argh(option, default = "3")]
    xyz_gap_fill: usize,

    /// low-pass cutoff frequency in Hz
    #[argh(option, default = "6.0")]
    cutoff_freq: f64,

    /// whether to export .trc files
    #[argh(option, default = "true")]
    include_trc: bool,

    /// number of trials processed concurrently
    #[argh(option, short = 'n', default = "1")]
    workers: usize,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "init-volume")]
/// Triangulate the calibration point data into an initial capture volume.
struct InitVolumeArgs {
    /// path to the workspace directory
    #[argh(positional)]
    workspace: PathBuf,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "optimize")]
/// Refine a capture volume and export the camera array.
struct OptimizeArgs {
    /// path to the workspace directory
    #[argh(positional)]
    workspace: PathBuf,

    /// snapshot to start from
    #[argh(option, default = "String::from(\"initial\")")]
    tag: String,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "set-origin")]
/// Move the world origin of a capture volume and export the camera array.
struct SetOriginArgs {
    /// path to the workspace directory
    #[argh(positional)]
    workspace: PathBuf,

    /// snapshot to start from
    #[argh(option, default = "String::from(\"optimized\")")]
    tag: String,

    /// rotation vector of the new origin, as a,b,c
    #[argh(option, from_str_fn(parse_vec3))]
    rvec: Option<[f64; 3]>,

    /// translation of the new origin, as x,y,z
    #[argh(option, from_str_fn(parse_vec3))]
    tvec: Option<[f64; 3]>,

    /// board definition JSON used to place the origin on the board
    #[argh(option)]
    board: Option<PathBuf>,

    /// sync index at which the board is observed
    #[argh(option)]
    sync_index: Option<i64>,
}

fn parse_vec3(value: &str) -> Result<[f64; 3], String> {
    let parts = value
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(format!("expected three comma separated values, got {value}")),
    }
}

fn calibration_dir(workspace: &Path) -> PathBuf {
    workspace.join(CALIBRATION_DIR)
}

fn batch(args: BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let params = ProcessingParams {
        xy_gap_fill: args.xy_gap_fill,
        xyz_gap_fill: args.xyz_gap_fill,
        cutoff_freq: args.cutoff_freq,
        include_trc: args.include_trc,
    };

    let ctx =
        BatchContext::load(&args.workspace, args.tracker, params)?.with_workers(args.workers);
    let report = BatchRunner::new(ctx).run()?;

    println!(
        "processed {} trials: {} succeeded, {} failed, {} skipped",
        report.processed(),
        report.succeeded().len(),
        report.failed().len(),
        report.skipped().len()
    );

    Ok(())
}

fn init_volume(args: InitVolumeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let camera_array = CameraArray::load_json(args.workspace.join(CAMERA_ARRAY_FILE))?;
    let calibration = calibration_dir(&args.workspace);
    let observations = read_point_data(calibration.join(POINT_DATA_FILE))?;

    let estimates = PointEstimates::triangulate(&camera_array, &observations)?;
    log::info!(
        "Triangulated {} points from {} observations",
        estimates.n_points(),
        observations.len()
    );

    let volume = CaptureVolume::new(camera_array, estimates)?;
    log::info!("Initial rmse: {:.4} px", volume.reprojection_error().overall);

    let path = volume.save(&calibration, "initial")?;
    println!("saved {}", path.display());

    Ok(())
}

fn optimize(args: OptimizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let calibration = calibration_dir(&args.workspace);
    let mut volume = CaptureVolume::load(&calibration, &args.tag)?;

    let summary = volume.optimize(&PointRefiner::new())?;
    println!(
        "rmse {:.4} px -> {:.4} px (stage {})",
        summary.rmse_before, summary.rmse_after, summary.stage
    );

    let path = volume.save(&calibration, "optimized")?;
    volume
        .camera_array()
        .save_json(args.workspace.join(CAMERA_ARRAY_FILE))?;
    println!("saved {}", path.display());

    Ok(())
}

fn set_origin(args: SetOriginArgs) -> Result<(), Box<dyn std::error::Error>> {
    let calibration = calibration_dir(&args.workspace);
    let mut volume = CaptureVolume::load(&calibration, &args.tag)?;

    let new_origin = match (args.rvec, args.tvec, &args.board, args.sync_index) {
        (Some(rvec), Some(tvec), None, None) => rigid_from_rvec_tvec(rvec, tvec),
        (None, None, Some(board), Some(sync_index)) => {
            let board = BoardDefinition::load_json(board)?;
            volume.board_origin(sync_index, &board.corners)?
        }
        _ => return Err("pass either --rvec and --tvec, or --board and --sync-index".into()),
    };

    volume.set_origin(&new_origin)?;
    log::info!("Moved origin, rmse {:.4} px", volume.reprojection_error().overall);

    let path = volume.save(&calibration, "new_origin")?;
    volume
        .camera_array()
        .save_json(args.workspace.join(CAMERA_ARRAY_FILE))?;
    println!("saved {}", path.display());

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    match args.command {
        Command::Batch(args) => batch(args),
        Command::InitVolume(args) => init_volume(args),
        Command::Optimize(args) => optimize(args),
        Command::SetOrigin(args) => set_origin(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("2.5, 0,-1"), Ok([2.5, 0.0, -1.0]));
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("1,x,2").is_err());
    }

    #[test]
    fn test_batch_args() -> Result<(), String> {
        let args = Args::from_args(&["mocap"], &["batch", "ws", "--tracker", "CENTROID"])
            .map_err(|e| e.output)?;
        let Command::Batch(batch) = args.command else {
            return Err("expected batch".to_string());
        };
        assert_eq!(batch.tracker, TrackerKind::Centroid);
        assert_eq!(batch.xy_gap_fill, 3);
        assert_eq!(batch.workers, 1);
        assert!(batch.include_trc);
        Ok(())
    }

    #[test]
    fn test_unknown_tracker_rejected() {
        let err = Args::from_args(&["mocap"], &["batch", "ws", "--tracker", "NOPE"]);
        assert!(err.is_err_and(|e| e.output.contains("RAW, CONFIDENT, CENTROID")));
    }
}
