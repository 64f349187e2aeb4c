#![deny(unreachable_patterns)]
//! Detector-driven cropping and segmenting of long-form video.
//!
//! This crate provides:
//! - YOLO object detection over ONNX Runtime, with construction-time device selection
//! - Single-detection adapter with IoU track ids
//! - Aspect-preserving crop and fixed-canvas letterboxing
//! - Rolling segment writer with exact frame-rank rotation
//! - OpenCV container decode/encode behind the `opencv` feature
//! - Per-source orchestration with scoped cleanup and cross-device archiving
//! - Sequential batch driver with per-file isolation and cooperative cancellation

pub mod batch;
pub mod cancel;
pub mod detector;
pub mod device;
pub mod error;
pub mod frame;
pub mod fs_utils;
pub mod metrics;
pub mod pipeline;
pub mod segment;
pub mod tracker;
pub mod transform;
pub mod video;
pub mod yolo;

pub use batch::{list_sources, BatchConfig, BatchDriver};
pub use cancel::CancellationFlag;
pub use detector::{resolve_target_class, Detector, DetectorAdapter};
pub use device::{ComputeDevice, DevicePreference, ExecutionTarget, Precision};
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use fs_utils::{archive_source, move_file};
pub use pipeline::{Pipeline, PipelineConfig, PipelineState, SourceError};
pub use segment::{EncoderFactory, SegmentEncoder, SegmentSpec, SegmentWriter};
pub use tracker::IouTracker;
pub use transform::{FrameTransformer, Transformed};
pub use video::{backend_available, FrameSource, OpenCvEncoderFactory, OpenCvOpener, SourceOpener};
pub use yolo::{YoloConfig, YoloDetector};
