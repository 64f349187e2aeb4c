//! Rolling output-file writer.
//!
//! [`SegmentWriter`] owns the currently open output file for one source and
//! rotates to a new file every `frames_per_segment` written frames:
//!
//! ```text
//! Idle --write--> Open --write (count < N)--> Open
//!                  |
//!                  +--write (count == N)--> flush + close, index += 1 --> Idle
//!
//! Idle | Open --close--> Closed
//! ```
//!
//! The next file is opened lazily on the write after a rotation, so segment
//! `k` holds exactly the written frames ranked `[(k-1)N + 1, kN]` and no
//! empty trailing file is ever created.

use std::path::{Path, PathBuf};

use refclip_models::{segment_file_name, SegmentSummary};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::metrics;

/// An open output file accepting frames of fixed dimensions.
pub trait SegmentEncoder: Send {
    /// Append one frame.
    fn write(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Flush and close the file.
    fn finish(self: Box<Self>) -> MediaResult<()>;
}

/// Creates output files.
pub trait EncoderFactory: Send + Sync {
    /// Create a new output file at `path`.
    ///
    /// Failures should be reported as [`MediaError::OutputCreate`].
    fn create(
        &self,
        path: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> MediaResult<Box<dyn SegmentEncoder>>;
}

/// Everything needed to name and size the segments of one source.
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    pub output_dir: PathBuf,
    /// Source file stem
    pub stem: String,
    /// Creation timestamp, captured once per source
    pub timestamp: String,
    /// Container extension, without the dot
    pub extension: String,
    pub fps: f64,
    /// Written frames per segment (N), at least one
    pub frames_per_segment: u64,
    pub width: u32,
    pub height: u32,
}

impl SegmentSpec {
    /// First free path for a segment index.
    ///
    /// The plain name is used unless a file already exists there, in which
    /// case a numeric disambiguator is appended.
    pub fn path_for(&self, index: u32) -> PathBuf {
        let mut disambiguator = 0;
        loop {
            let name = segment_file_name(
                &self.stem,
                &self.timestamp,
                index,
                disambiguator,
                &self.extension,
            );
            let path = self.output_dir.join(name);
            if !path.exists() {
                return path;
            }
            disambiguator += 1;
        }
    }
}

/// Segment writer state.
enum WriterState {
    /// No file open; the next write opens one
    Idle,
    Open {
        encoder: Box<dyn SegmentEncoder>,
        path: PathBuf,
        frames: u64,
        first_rank: u64,
    },
    /// Terminal; further writes are rejected
    Closed,
}

/// Writer that owns the active segment of one source.
pub struct SegmentWriter<'a> {
    spec: SegmentSpec,
    factory: &'a dyn EncoderFactory,
    state: WriterState,
    /// Index of the open segment, or of the next one to open
    index: u32,
    written: u64,
    segments: Vec<SegmentSummary>,
}

impl<'a> SegmentWriter<'a> {
    pub fn new(spec: SegmentSpec, factory: &'a dyn EncoderFactory) -> MediaResult<Self> {
        if spec.frames_per_segment == 0 {
            return Err(MediaError::invalid_config("frames per segment must be at least 1"));
        }
        if spec.width == 0 || spec.height == 0 {
            return Err(MediaError::invalid_config(format!(
                "segment frame size must be non-zero, got {}x{}",
                spec.width, spec.height
            )));
        }

        Ok(Self {
            spec,
            factory,
            state: WriterState::Idle,
            index: 1,
            written: 0,
            segments: Vec::new(),
        })
    }

    /// Index of the open segment, or of the next one to open.
    pub fn current_index(&self) -> u32 {
        self.index
    }

    /// Total frames written across all segments.
    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, WriterState::Open { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, WriterState::Closed)
    }

    /// Closed segments, in creation order.
    pub fn segments(&self) -> &[SegmentSummary] {
        &self.segments
    }

    /// Write one frame, opening or rotating files as needed.
    pub fn write(&mut self, frame: &Frame) -> MediaResult<()> {
        if self.is_closed() {
            return Err(MediaError::internal("Segment writer already closed"));
        }
        if frame.dimensions() != (self.spec.width, self.spec.height) {
            return Err(MediaError::encode_failed(format!(
                "frame is {}x{}, segment expects {}x{}",
                frame.width(),
                frame.height(),
                self.spec.width,
                self.spec.height
            )));
        }

        if matches!(self.state, WriterState::Idle) {
            self.open()?;
        }

        let rotate = match &mut self.state {
            WriterState::Open {
                encoder, frames, ..
            } => {
                encoder.write(frame)?;
                *frames += 1;
                self.written += 1;
                *frames == self.spec.frames_per_segment
            }
            _ => return Err(MediaError::internal("Segment writer not open after open()")),
        };

        if rotate {
            self.finish_active()?;
            self.index += 1;
        }
        Ok(())
    }

    /// Flush and close the active segment. Idempotent.
    pub fn close(&mut self) -> MediaResult<()> {
        let result = self.finish_active();
        self.state = WriterState::Closed;
        result
    }

    fn open(&mut self) -> MediaResult<()> {
        let path = self.spec.path_for(self.index);
        let encoder = self
            .factory
            .create(&path, self.spec.fps, self.spec.width, self.spec.height)
            .map_err(|e| match e {
                MediaError::OutputCreate { .. } => e,
                other => MediaError::output_create(&path, other.to_string()),
            })?;

        debug!(
            segment = self.index,
            path = %path.display(),
            "Opened output segment"
        );

        self.state = WriterState::Open {
            encoder,
            path,
            frames: 0,
            first_rank: self.written + 1,
        };
        Ok(())
    }

    /// Finish the open encoder, if any, and record its summary.
    fn finish_active(&mut self) -> MediaResult<()> {
        match std::mem::replace(&mut self.state, WriterState::Idle) {
            WriterState::Open {
                encoder,
                path,
                frames,
                first_rank,
            } => {
                let result = encoder.finish();
                info!(
                    segment = self.index,
                    frames,
                    path = %path.display(),
                    "Closed output segment"
                );
                metrics::record_segment_closed();
                self.segments.push(SegmentSummary {
                    index: self.index,
                    path,
                    frames,
                    first_rank,
                });
                result
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }
}

impl Drop for SegmentWriter<'_> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                warn!(segment = self.index, "Failed to close segment on drop: {}", e);
            }
        }
    }
}
