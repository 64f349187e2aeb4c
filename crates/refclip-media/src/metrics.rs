//! Processing metrics.
//!
//! Emitted through the `metrics` facade. Nothing is recorded unless the
//! embedding process installs a recorder.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    // Frame loop
    pub const FRAMES_READ_TOTAL: &str = "refclip_frames_read_total";
    pub const FRAMES_WRITTEN_TOTAL: &str = "refclip_frames_written_total";
    pub const DETECTIONS_TOTAL: &str = "refclip_detections_total";
    pub const DETECTOR_FAILURES_TOTAL: &str = "refclip_detector_failures_total";

    // Output
    pub const SEGMENTS_CLOSED_TOTAL: &str = "refclip_segments_closed_total";

    // Sources
    pub const SOURCES_PROCESSED_TOTAL: &str = "refclip_sources_processed_total";
    pub const SOURCES_FAILED_TOTAL: &str = "refclip_sources_failed_total";
    pub const SOURCE_DURATION_SECONDS: &str = "refclip_source_duration_seconds";
}

pub fn record_frame_read() {
    counter!(names::FRAMES_READ_TOTAL).increment(1);
}

pub fn record_frame_written(fallback: bool) {
    let labels = [("kind", if fallback { "fallback" } else { "fresh" })];
    counter!(names::FRAMES_WRITTEN_TOTAL, &labels).increment(1);
}

pub fn record_detection() {
    counter!(names::DETECTIONS_TOTAL).increment(1);
}

pub fn record_detector_failure() {
    counter!(names::DETECTOR_FAILURES_TOTAL).increment(1);
}

pub fn record_segment_closed() {
    counter!(names::SEGMENTS_CLOSED_TOTAL).increment(1);
}

/// Record the end of one source, with its outcome label and wall time.
pub fn record_source_finished(outcome: &'static str, duration_secs: f64) {
    let labels = [("outcome", outcome)];
    counter!(names::SOURCES_PROCESSED_TOTAL, &labels).increment(1);
    histogram!(names::SOURCE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_source_failed(error_kind: &'static str) {
    let labels = [("error", error_kind)];
    counter!(names::SOURCES_FAILED_TOTAL, &labels).increment(1);
}
