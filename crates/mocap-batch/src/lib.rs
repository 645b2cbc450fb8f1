#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for batch processing.
pub mod error;

/// Per-trial outcomes and the batch report.
pub mod report;

mod context;
pub use context::*;

mod runner;
pub use runner::*;

pub use error::BatchError;
pub use report::{BatchReport, TrialOutcome, TrialStatus};
