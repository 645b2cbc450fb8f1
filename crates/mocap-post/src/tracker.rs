use std::{fmt, str::FromStr};

use crate::PostError;

/// A 2D landmark in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Identity of the landmark.
    pub point_id: u32,
    /// Pixel coordinates.
    pub img: [f64; 2],
    /// Detection confidence in `[0, 1]`.
    pub score: f64,
}

/// Everything one camera captured at one sync index.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Port of the camera.
    pub port: u32,
    /// Synchronization index of the capture instant.
    pub sync_index: i64,
    /// Capture time in seconds.
    pub frame_time: f64,
    /// Raw landmark detections of the frame.
    pub detections: Vec<Keypoint>,
}

/// A strategy that extracts tracked 2D keypoints from a frame.
pub trait Tracker: Send + Sync {
    /// Registry name of the tracker, also used for output directories.
    fn name(&self) -> &'static str;

    /// Extract the keypoints of one frame.
    fn extract(&self, frame: &Frame) -> Vec<Keypoint>;

    /// Human readable name of a point id, used as TRC marker label.
    fn point_name(&self, point_id: u32) -> String {
        format!("p{point_id}")
    }
}

/// Passes every raw detection through.
#[derive(Debug, Clone, Default)]
pub struct RawTracker;

impl Tracker for RawTracker {
    fn name(&self) -> &'static str {
        TrackerKind::Raw.name()
    }

    fn extract(&self, frame: &Frame) -> Vec<Keypoint> {
        frame.detections.clone()
    }
}

/// Keeps detections whose score reaches a threshold.
#[derive(Debug, Clone)]
pub struct ConfidenceTracker {
    /// Minimum accepted score.
    pub min_score: f64,
}

impl Default for ConfidenceTracker {
    fn default() -> Self {
        Self { min_score: 0.5 }
    }
}

impl Tracker for ConfidenceTracker {
    fn name(&self) -> &'static str {
        TrackerKind::Confident.name()
    }

    fn extract(&self, frame: &Frame) -> Vec<Keypoint> {
        frame
            .detections
            .iter()
            .filter(|k| k.score >= self.min_score)
            .copied()
            .collect()
    }
}

/// Collapses a frame into one point at the score weighted centroid.
#[derive(Debug, Clone, Default)]
pub struct CentroidTracker;

impl Tracker for CentroidTracker {
    fn name(&self) -> &'static str {
        TrackerKind::Centroid.name()
    }

    fn extract(&self, frame: &Frame) -> Vec<Keypoint> {
        let total = frame.detections.iter().map(|k| k.score).sum::<f64>();
        if total <= 0.0 {
            return Vec::new();
        }
        let (x, y) = frame
            .detections
            .iter()
            .fold((0.0, 0.0), |(x, y), k| (x + k.img[0] * k.score, y + k.img[1] * k.score));
        let score = total / frame.detections.len() as f64;
        vec![Keypoint {
            point_id: 0,
            img: [x / total, y / total],
            score,
        }]
    }

    fn point_name(&self, _point_id: u32) -> String {
        "centroid".to_string()
    }
}

/// The closed set of available trackers, selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    /// [`RawTracker`].
    Raw,
    /// [`ConfidenceTracker`] with its default threshold.
    Confident,
    /// [`CentroidTracker`].
    Centroid,
}

impl TrackerKind {
    /// Every tracker of the registry.
    pub const ALL: [TrackerKind; 3] = [
        TrackerKind::Raw,
        TrackerKind::Confident,
        TrackerKind::Centroid,
    ];

    /// Registry name of the tracker.
    pub const fn name(&self) -> &'static str {
        match self {
            TrackerKind::Raw => "RAW",
            TrackerKind::Confident => "CONFIDENT",
            TrackerKind::Centroid => "CENTROID",
        }
    }

    /// Names of all trackers, in registry order.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.name()).collect()
    }

    /// Instantiate the tracker strategy.
    pub fn build(&self) -> Box<dyn Tracker> {
        match self {
            TrackerKind::Raw => Box::new(RawTracker),
            TrackerKind::Confident => Box::new(ConfidenceTracker::default()),
            TrackerKind::Centroid => Box::new(CentroidTracker),
        }
    }
}

impl FromStr for TrackerKind {
    type Err = PostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| PostError::UnknownTracker {
                name: s.to_string(),
                valid: Self::names().join(", "),
            })
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
