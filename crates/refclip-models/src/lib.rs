//! Shared data models for the refclip video segmenter.
//!
//! This crate provides Serde-serializable types for:
//! - Detections and pixel bounding boxes
//! - Source video metadata
//! - Segment naming and per-segment summaries
//! - Per-source and per-batch run reports
//! - Normalized (YOLO-format) label records consumed downstream

pub mod detection;
pub mod label;
pub mod report;
pub mod segment;
pub mod video;

// Re-export common types
pub use detection::{BoundingBox, Detection};
pub use label::{LabelError, YoloLabel};
pub use report::{BatchReport, SourceOutcome, SourceReport};
pub use segment::{creation_timestamp, segment_file_name, SegmentSummary};
pub use video::SourceVideo;
