//! Per-source and per-batch run reports.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::segment::SegmentSummary;

/// How processing of one source video ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// Input exhausted; segments closed and source archived
    Completed,
    /// Stopped at a cancellation check-point; source left in place
    Cancelled,
    /// Processing aborted with an error
    Failed { error: String },
}

impl SourceOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SourceOutcome::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SourceOutcome::Failed { .. })
    }
}

/// Counters and results for one source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Source path as found in the input directory
    pub source: PathBuf,
    /// Frames decoded from the source
    pub frames_read: u64,
    /// Frames delivered to the segment writer
    pub frames_written: u64,
    /// Frames with a usable primary detection
    pub detections: u64,
    /// Frames written by reusing the last valid output frame
    pub fallback_frames: u64,
    /// Frames dropped because nothing valid existed yet
    pub skipped_frames: u64,
    /// Inference calls that failed and were treated as "no detection"
    pub detector_failures: u64,
    /// Closed output segments, in creation order
    pub segments: Vec<SegmentSummary>,
    /// Archive location, when the source was moved
    pub archived_to: Option<PathBuf>,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    /// Empty report for a source that has not been processed yet.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            frames_read: 0,
            frames_written: 0,
            detections: 0,
            fallback_frames: 0,
            skipped_frames: 0,
            detector_failures: 0,
            segments: Vec::new(),
            archived_to: None,
            outcome: SourceOutcome::Completed,
        }
    }

    /// Frame counts per segment, in creation order.
    pub fn segment_frame_counts(&self) -> Vec<u64> {
        self.segments.iter().map(|s| s.frames).collect()
    }
}

/// Results for a whole batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per attempted source, in processing order
    pub sources: Vec<SourceReport>,
    /// Whether the batch stopped early because of cancellation
    pub cancelled: bool,
}

impl BatchReport {
    pub fn completed_count(&self) -> usize {
        self.sources.iter().filter(|r| r.outcome.is_completed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.sources.iter().filter(|r| r.outcome.is_failed()).count()
    }

    pub fn total_frames_written(&self) -> u64 {
        self.sources.iter().map(|r| r.frames_written).sum()
    }

    pub fn total_segments(&self) -> usize {
        self.sources.iter().map(|r| r.segments.len()).sum()
    }
}
