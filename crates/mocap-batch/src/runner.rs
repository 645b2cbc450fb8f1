use std::{
    fs,
    path::{Path, PathBuf},
};

use mocap_post::{PostError, PostProcessor};
use rayon::prelude::*;

use crate::{BatchContext, BatchError, BatchReport, TrialOutcome, TrialStatus};

/// Runs the post processor over every trial of a workspace.
pub struct BatchRunner {
    ctx: BatchContext,
}

impl BatchRunner {
    /// Create a runner for a loaded context.
    pub fn new(ctx: BatchContext) -> Self {
        Self { ctx }
    }

    /// The context of the run.
    pub fn context(&self) -> &BatchContext {
        &self.ctx
    }

    /// Trial directories sorted by name. Other entries are ignored.
    pub fn trial_dirs(&self) -> Result<Vec<PathBuf>, BatchError> {
        let mut trials = Vec::new();
        for entry in fs::read_dir(self.ctx.recordings_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                trials.push(entry.path());
            }
        }
        trials.sort();
        Ok(trials)
    }

    /// Process every trial that has no output for the tracker yet.
    ///
    /// A failing trial is recorded in the report and does not stop the batch.
    /// With more than one worker, trials run on a dedicated thread pool; the
    /// report keeps the listing order either way.
    pub fn run(&self) -> Result<BatchReport, BatchError> {
        log::info!("Beginning batch process.");
        log::info!("Processing workspace: {}", self.ctx.workspace().display());

        let trials = self.trial_dirs()?;
        log::info!("Found {} trial directories", trials.len());

        let outcomes = match self.ctx.workers() {
            0 => return Err(BatchError::InvalidWorkerCount(0)),
            1 => trials
                .iter()
                .enumerate()
                .map(|(i, trial)| self.process(i, trials.len(), trial))
                .collect(),
            n => {
                let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
                pool.install(|| {
                    trials
                        .par_iter()
                        .enumerate()
                        .map(|(i, trial)| self.process(i, trials.len(), trial))
                        .collect()
                })
            }
        };

        let report = BatchReport { outcomes };
        report.log_summary();
        Ok(report)
    }

    fn process(&self, index: usize, total: usize, trial: &Path) -> TrialOutcome {
        log::info!("Processing trial {}/{}: {}", index + 1, total, trial.display());

        let tracker = self.ctx.tracker();
        let processor = PostProcessor::new(self.ctx.camera_array(), trial, tracker);

        let status = if processor.is_processed() {
            log::info!(
                "Skipping {} - already processed with {tracker}",
                trial.display()
            );
            TrialStatus::Skipped
        } else {
            match self.process_trial(&processor) {
                Ok(()) => {
                    log::info!("Successfully processed {}", trial.display());
                    TrialStatus::Succeeded
                }
                Err(e) => {
                    log::warn!("Failed to process {}: {e}", trial.display());
                    if let Err(cleanup) = processor.discard_partial() {
                        log::warn!("Failed to remove partial output: {cleanup}");
                    }
                    TrialStatus::Failed(e.to_string())
                }
            }
        };

        TrialOutcome {
            trial: trial.to_path_buf(),
            status,
        }
    }

    fn process_trial(&self, processor: &PostProcessor) -> Result<(), PostError> {
        if processor.discard_partial()? {
            log::info!(
                "Removed stale partial output in {}",
                processor.recording_path().display()
            );
        }
        processor.create_xy()?;
        processor.create_xyz(self.ctx.params())?;
        Ok(())
    }
}
