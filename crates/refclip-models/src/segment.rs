//! Output segment naming and summaries.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp format embedded in segment file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Format a creation timestamp for segment names (`20240217_153000`).
pub fn creation_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Build a segment file name.
///
/// `{stem}_{timestamp}_part{index}.{extension}`; a non-zero `disambiguator`
/// is appended as `_{n}` before the extension when the plain name is taken.
///
/// # Examples
/// ```
/// use refclip_models::segment_file_name;
/// assert_eq!(
///     segment_file_name("match", "20240217_153000", 2, 0, "mp4"),
///     "match_20240217_153000_part2.mp4"
/// );
/// assert_eq!(
///     segment_file_name("match", "20240217_153000", 2, 1, "mp4"),
///     "match_20240217_153000_part2_1.mp4"
/// );
/// ```
pub fn segment_file_name(
    stem: &str,
    timestamp: &str,
    index: u32,
    disambiguator: u32,
    extension: &str,
) -> String {
    let extension = extension.trim_start_matches('.');
    if disambiguator == 0 {
        format!("{stem}_{timestamp}_part{index}.{extension}")
    } else {
        format!("{stem}_{timestamp}_part{index}_{disambiguator}.{extension}")
    }
}

/// A closed output segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSummary {
    /// 1-based segment index (the `partN` suffix)
    pub index: u32,
    /// Output file path
    pub path: PathBuf,
    /// Frames written into this segment
    pub frames: u64,
    /// 1-based rank of the first written frame in this segment
    pub first_rank: u64,
}

impl SegmentSummary {
    /// 1-based rank of the last written frame, if any frame was written.
    pub fn last_rank(&self) -> Option<u64> {
        if self.frames == 0 {
            None
        } else {
            Some(self.first_rank + self.frames - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_creation_timestamp_format() {
        let at = Local.with_ymd_and_hms(2024, 2, 17, 15, 30, 5).unwrap();
        assert_eq!(creation_timestamp(at), "20240217_153005");
    }

    #[test]
    fn test_segment_file_name_strips_leading_dot() {
        assert_eq!(
            segment_file_name("a", "20240101_000000", 1, 0, ".mp4"),
            "a_20240101_000000_part1.mp4"
        );
    }

    #[test]
    fn test_last_rank() {
        let summary = SegmentSummary {
            index: 2,
            path: PathBuf::from("out/a_part2.mp4"),
            frames: 2,
            first_rank: 3,
        };
        assert_eq!(summary.last_rank(), Some(4));

        let empty = SegmentSummary { frames: 0, ..summary };
        assert_eq!(empty.last_rank(), None);
    }
}
