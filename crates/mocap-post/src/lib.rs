#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// CSV artifacts written by the post processor.
pub mod artifacts;

/// Error types for the post processing pipeline.
pub mod error;

/// Low-pass filtering of trajectories.
pub mod filter;

/// Reading raw per-camera frames.
pub mod frames;

/// Bounded temporal gap filling.
pub mod gap_fill;

/// 2D keypoint trackers.
pub mod tracker;

/// Motion capture interchange (TRC) files.
pub mod trc;

mod processor;
pub use processor::*;

pub use error::PostError;
pub use tracker::{Tracker, TrackerKind};
