//! Source video metadata.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A source video as reported by its container.
///
/// Immutable for the duration of processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVideo {
    /// Path in the input directory
    pub path: PathBuf,
    /// Frame rate (fps)
    pub fps: f64,
    /// Total frame count, if the container reports one
    pub frame_count: Option<u64>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl SourceVideo {
    /// File stem used as the base of every output segment name.
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }

    /// Number of written frames per output segment.
    ///
    /// `segment_seconds * fps`, rounded, never less than one.
    pub fn frames_per_segment(&self, segment_seconds: u64) -> u64 {
        let frames = (segment_seconds as f64 * self.fps).round();
        if frames.is_finite() && frames >= 1.0 {
            frames as u64
        } else {
            1
        }
    }

    /// Duration in seconds derived from the frame count.
    pub fn duration_secs(&self) -> Option<f64> {
        match self.frame_count {
            Some(count) if self.fps > 0.0 => Some(count as f64 / self.fps),
            _ => None,
        }
    }
}

/// File stem of a path, falling back to `"video"` for unnamed paths.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string())
}
