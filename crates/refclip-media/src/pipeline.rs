//! Per-source orchestration: read, detect, transform, write, rotate, archive.
//!
//! [`Pipeline::process_source`] drives one source video end to end. On every
//! exit path the segment writer is closed and the frame reader released.
//! The source is then archived unless the failure leaves it retryable: the
//! reader could not be opened, the first segment could not be created, or
//! the run was cancelled. Once a segment has been written, a failure to
//! create a later one archives the source like any other in-loop error, so
//! a retry never duplicates output already on disk.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use refclip_models::{creation_timestamp, SourceOutcome, SourceReport};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationFlag;
use crate::detector::DetectorAdapter;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::fs_utils::archive_source;
use crate::metrics;
use crate::segment::{EncoderFactory, SegmentSpec, SegmentWriter};
use crate::transform::{FrameTransformer, Transformed};
use crate::video::{FrameSource, SourceOpener};

/// Frames between progress log lines.
pub const PROGRESS_LOG_EVERY: u64 = 1_000;

/// Pipeline settings, fixed for a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory receiving output segments
    pub output_dir: PathBuf,
    /// Directory receiving processed sources
    pub archive_dir: PathBuf,
    /// Output container extension, without the dot
    pub extension: String,
    /// Output frame height (multiple of 32)
    pub output_height: u32,
    /// Segment duration
    pub segment_seconds: u64,
    pub confidence_threshold: f32,
    /// Resolved target class id
    pub target_class: usize,
}

impl PipelineConfig {
    pub fn validate(&self) -> MediaResult<()> {
        if self.segment_seconds == 0 {
            return Err(MediaError::invalid_config("segment duration must be at least 1 second"));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(MediaError::invalid_config(format!(
                "confidence threshold must be in (0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(MediaError::invalid_config("output extension must not be empty"));
        }
        Ok(())
    }
}

/// Mutable per-source state of the frame loop.
///
/// The written-frame counter and the last valid output frame live here, so
/// the fallback policy can be exercised without any decoding. The segment
/// counter is owned by the [`SegmentWriter`].
#[derive(Debug, Default)]
pub struct PipelineState {
    /// Frames handed to the writer so far
    pub written_frames: u64,
    /// Most recent output frame; `None` until the first usable detection
    pub last_valid: Option<Frame>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one transformer result.
    ///
    /// Returns the frame to write, which is also the new last valid frame,
    /// or `None` when nothing may be written yet. The written-frame counter
    /// advances only when a frame is returned.
    pub fn advance(&mut self, transformed: Transformed) -> Option<&Frame> {
        match transformed {
            Transformed::Fresh(frame) | Transformed::Fallback(frame) => {
                self.written_frames += 1;
                self.last_valid = Some(frame);
                self.last_valid.as_ref()
            }
            Transformed::Empty => None,
        }
    }
}

/// Failure processing one source, with the partial report.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SourceError {
    #[source]
    pub error: MediaError,
    pub report: SourceReport,
}

/// Releases the frame reader when dropped, including during unwinding.
struct SourceGuard {
    source: Box<dyn FrameSource>,
}

impl SourceGuard {
    fn get(&mut self) -> &mut dyn FrameSource {
        self.source.as_mut()
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// Single-source orchestrator.
pub struct Pipeline {
    config: PipelineConfig,
    detector: DetectorAdapter,
    transformer: FrameTransformer,
    opener: Box<dyn SourceOpener>,
    encoders: Box<dyn EncoderFactory>,
    cancel: CancellationFlag,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        detector: DetectorAdapter,
        opener: Box<dyn SourceOpener>,
        encoders: Box<dyn EncoderFactory>,
    ) -> MediaResult<Self> {
        config.validate()?;
        let transformer = FrameTransformer::new(config.output_height)?;

        Ok(Self {
            config,
            detector,
            transformer,
            opener,
            encoders,
            cancel: CancellationFlag::new(),
        })
    }

    /// Use a shared cancellation flag.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    /// Process one source video end to end.
    pub fn process_source(&mut self, path: &Path) -> Result<SourceReport, SourceError> {
        let started = Instant::now();
        let mut report = SourceReport::new(path);

        info!(source = %path.display(), "Processing source");

        let mut error = self.run(path, &mut report).err();

        let archive = match &error {
            Some(e) if e.is_source_retryable() && !wrote_output(e, &report) => {
                warn!(
                    source = %path.display(),
                    "Leaving source in input directory: {}", e
                );
                false
            }
            _ => true,
        };

        if archive {
            match archive_source(path, &self.config.archive_dir) {
                Ok(archived) => report.archived_to = Some(archived),
                Err(archive_err) => {
                    error!(
                        source = %path.display(),
                        "Failed to archive source: {}", archive_err
                    );
                    if error.is_none() {
                        error = Some(archive_err);
                    }
                }
            }
        }

        report.outcome = match &error {
            None => SourceOutcome::Completed,
            Some(MediaError::Cancelled) => SourceOutcome::Cancelled,
            Some(e) => SourceOutcome::Failed {
                error: e.to_string(),
            },
        };

        let outcome_label = match &report.outcome {
            SourceOutcome::Completed => "completed",
            SourceOutcome::Cancelled => "cancelled",
            SourceOutcome::Failed { .. } => "failed",
        };
        metrics::record_source_finished(outcome_label, started.elapsed().as_secs_f64());

        info!(
            source = %path.display(),
            outcome = outcome_label,
            frames_read = report.frames_read,
            frames_written = report.frames_written,
            detections = report.detections,
            fallback_frames = report.fallback_frames,
            skipped_frames = report.skipped_frames,
            detector_failures = report.detector_failures,
            segments = report.segments.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Source finished"
        );

        match error {
            None => Ok(report),
            Some(error) => {
                if !matches!(error, MediaError::Cancelled) {
                    metrics::record_source_failed(error.kind());
                }
                Err(SourceError { error, report })
            }
        }
    }

    /// Open, loop and finalize. Everything except archiving.
    fn run(&mut self, path: &Path, report: &mut SourceReport) -> MediaResult<()> {
        let Pipeline {
            config,
            detector,
            transformer,
            opener,
            encoders,
            cancel,
        } = self;

        let source = opener.open(path).map_err(|e| match e {
            MediaError::SourceOpen { .. } => e,
            other => MediaError::source_open(path, other.to_string()),
        })?;
        let mut guard = SourceGuard { source };

        let video = guard.get().video().clone();
        let (width, height) = transformer.output_size();
        let frames_per_segment = video.frames_per_segment(config.segment_seconds);

        info!(
            source = %path.display(),
            fps = video.fps,
            frame_count = ?video.frame_count,
            frames_per_segment,
            "Source opened"
        );

        let spec = SegmentSpec {
            output_dir: config.output_dir.clone(),
            stem: video.stem(),
            timestamp: creation_timestamp(Local::now()),
            extension: config.extension.trim_start_matches('.').to_string(),
            fps: video.fps,
            frames_per_segment,
            width,
            height,
        };
        let mut writer = SegmentWriter::new(spec, &**encoders)?;

        detector.reset();
        let loop_result = panic::catch_unwind(AssertUnwindSafe(|| {
            drive_frames(
                guard.get(),
                detector,
                transformer,
                config,
                cancel,
                &mut writer,
                report,
            )
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(source = %path.display(), "Frame loop panicked: {}", message);
            Err(MediaError::internal(format!("panic: {}", message)))
        });

        let close_result = writer.close();
        report.frames_written = writer.frames_written();
        report.segments = writer.segments().to_vec();
        guard.get().release();

        match (loop_result, close_result) {
            (Ok(()), close) => close,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                error!(
                    source = %path.display(),
                    "Failed to close segment after error: {}", close_err
                );
                Err(e)
            }
        }
    }
}

/// Whether an output-create failure came after segments were already
/// written for this source.
fn wrote_output(error: &MediaError, report: &SourceReport) -> bool {
    matches!(error, MediaError::OutputCreate { .. }) && !report.segments.is_empty()
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// The frame loop: read, detect, transform, write.
///
/// Returns when input is exhausted, at a cancellation check-point, or on a
/// writer error. Detector errors are absorbed here.
fn drive_frames(
    source: &mut dyn FrameSource,
    detector: &mut DetectorAdapter,
    transformer: &FrameTransformer,
    config: &PipelineConfig,
    cancel: &CancellationFlag,
    writer: &mut SegmentWriter<'_>,
    report: &mut SourceReport,
) -> MediaResult<()> {
    let mut state = PipelineState::new();

    loop {
        cancel.check()?;

        let raw = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(
                    frame = report.frames_read + 1,
                    "Read error, treating as end of stream: {}", e
                );
                break;
            }
        };
        report.frames_read += 1;
        metrics::record_frame_read();

        let detection = match detector.try_detect(&raw, config.confidence_threshold, config.target_class) {
            Ok(detection) => detection,
            Err(e) => {
                report.detector_failures += 1;
                metrics::record_detector_failure();
                warn!(
                    frame = report.frames_read,
                    "Detector failed, treating as no detection: {}", e
                );
                None
            }
        };

        let transformed = transformer.transform(&raw, detection.as_ref(), state.last_valid.take());
        let fresh = transformed.is_fresh();

        match state.advance(transformed) {
            Some(frame) => {
                writer.write(frame)?;
                if fresh {
                    report.detections += 1;
                    metrics::record_detection();
                } else {
                    report.fallback_frames += 1;
                }
                metrics::record_frame_written(!fresh);
            }
            None => report.skipped_frames += 1,
        }

        if report.frames_read % PROGRESS_LOG_EVERY == 0 {
            info!(
                frames_read = report.frames_read,
                frames_written = state.written_frames,
                detections = report.detections,
                fallback_frames = report.fallback_frames,
                segment = writer.current_index(),
                "Progress"
            );
        }
    }

    debug!(
        frames_read = report.frames_read,
        frames_written = state.written_frames,
        "Input exhausted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(value: u8) -> Frame {
        Frame::from_pixel(32, 32, Rgb([value, value, value]))
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_state_skips_until_first_valid() {
        let mut state = PipelineState::new();

        assert!(state.advance(Transformed::Empty).is_none());
        assert!(state.advance(Transformed::Empty).is_none());
        assert_eq!(state.written_frames, 0);
        assert!(state.last_valid.is_none());

        assert!(state.advance(Transformed::Fresh(frame(1))).is_some());
        assert_eq!(state.written_frames, 1);
        assert_eq!(state.last_valid, Some(frame(1)));
    }

    #[test]
    fn test_state_fallback_reuses_last_valid() {
        let transformer = FrameTransformer::new(32).unwrap();
        let raw = frame(0);
        let mut state = PipelineState::new();

        state.advance(Transformed::Fresh(frame(7)));

        let transformed = transformer.transform(&raw, None, state.last_valid.take());
        assert!(!transformed.is_fresh());
        let written = state.advance(transformed).cloned();

        assert_eq!(written, Some(frame(7)));
        assert_eq!(state.written_frames, 2);
        assert_eq!(state.last_valid, Some(frame(7)));
    }

    #[test]
    fn test_config_validation() {
        let config = PipelineConfig {
            output_dir: PathBuf::from("forLabel"),
            archive_dir: PathBuf::from("used"),
            extension: "mp4".to_string(),
            output_height: 640,
            segment_seconds: 3600,
            confidence_threshold: 0.7,
            target_class: 0,
        };
        assert!(config.validate().is_ok());

        let zero_seconds = PipelineConfig {
            segment_seconds: 0,
            ..config.clone()
        };
        assert!(zero_seconds.validate().is_err());

        let bad_threshold = PipelineConfig {
            confidence_threshold: 1.5,
            ..config.clone()
        };
        assert!(bad_threshold.validate().is_err());

        let no_extension = PipelineConfig {
            extension: ".".to_string(),
            ..config
        };
        assert!(no_extension.validate().is_err());
    }
}
