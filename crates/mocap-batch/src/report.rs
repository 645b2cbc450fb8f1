use std::path::{Path, PathBuf};

/// What happened to one trial.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialStatus {
    /// Both processing stages completed.
    Succeeded,
    /// Output for the tracker already existed.
    Skipped,
    /// Processing stopped with the given error.
    Failed(String),
}

/// The status of one trial directory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    /// The trial directory.
    pub trial: PathBuf,
    /// What happened to it.
    pub status: TrialStatus,
}

/// Outcomes of a batch run, in trial listing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// One outcome per trial directory.
    pub outcomes: Vec<TrialOutcome>,
}

impl BatchReport {
    fn with_status(&self, f: impl Fn(&TrialStatus) -> bool) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter(|o| f(&o.status))
            .map(|o| o.trial.as_path())
            .collect()
    }

    /// Trials processed successfully.
    pub fn succeeded(&self) -> Vec<&Path> {
        self.with_status(|s| *s == TrialStatus::Succeeded)
    }

    /// Trials that failed.
    pub fn failed(&self) -> Vec<&Path> {
        self.with_status(|s| matches!(s, TrialStatus::Failed(_)))
    }

    /// Trials skipped because they were already processed.
    pub fn skipped(&self) -> Vec<&Path> {
        self.with_status(|s| *s == TrialStatus::Skipped)
    }

    /// Number of trials that were processed, successfully or not.
    pub fn processed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status != TrialStatus::Skipped)
            .count()
    }

    /// Fraction of processed trials that succeeded, 0 if none were processed.
    pub fn success_ratio(&self) -> f64 {
        self.ratio(self.succeeded().len())
    }

    /// Fraction of processed trials that failed, 0 if none were processed.
    pub fn failure_ratio(&self) -> f64 {
        self.ratio(self.failed().len())
    }

    fn ratio(&self, count: usize) -> f64 {
        match self.processed() {
            0 => 0.0,
            n => count as f64 / n as f64,
        }
    }

    /// Log the summary of the run.
    pub fn log_summary(&self) {
        log::info!("Batch process complete.");
        log::info!("Successes: {:.3}", self.success_ratio());
        for trial in self.succeeded() {
            log::info!("  {}", trial.display());
        }
        log::info!("Failures: {:.3}", self.failure_ratio());
        for outcome in &self.outcomes {
            if let TrialStatus::Failed(reason) = &outcome.status {
                log::info!("  {}: {reason}", outcome.trial.display());
            }
        }
        if !self.skipped().is_empty() {
            log::info!("Skipped: {}", self.skipped().len());
        }
    }
}
