//! Normalized label records.
//!
//! The labeling service downstream of the segmenter stores each confirmed
//! sample as an image plus one line per object:
//! `class_id center_x center_y width height`, spatial values divided by the
//! image's corresponding dimension. The segmenter never writes these files;
//! the type documents and validates the contract its crops feed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::BoundingBox;

/// Errors produced when building or parsing a label record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LabelError {
    #[error("Image dimensions must be positive, got {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("Bounding box has no area inside the image")]
    EmptyBox,

    #[error("Expected 5 fields, got {0}")]
    FieldCount(usize),

    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("{field} out of range [0, 1]: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// One normalized label line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YoloLabel {
    pub class_id: usize,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl YoloLabel {
    /// Normalize a pixel box against the image it was drawn on.
    ///
    /// The box is clipped to the image first, so all values land in `[0, 1]`.
    pub fn from_bbox(
        class_id: usize,
        bbox: &BoundingBox,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self, LabelError> {
        if image_width == 0 || image_height == 0 {
            return Err(LabelError::InvalidImageSize {
                width: image_width,
                height: image_height,
            });
        }

        let clipped = bbox.clamp(image_width, image_height);
        if clipped.is_degenerate() {
            return Err(LabelError::EmptyBox);
        }

        let w = image_width as f64;
        let h = image_height as f64;
        Ok(Self {
            class_id,
            center_x: (clipped.x1 as f64 + clipped.x2 as f64) / 2.0 / w,
            center_y: (clipped.y1 as f64 + clipped.y2 as f64) / 2.0 / h,
            width: clipped.width() as f64 / w,
            height: clipped.height() as f64 / h,
        })
    }

    /// Map back to pixel coordinates of an image of the given size.
    pub fn to_bbox(&self, image_width: u32, image_height: u32) -> BoundingBox {
        let w = image_width as f64;
        let h = image_height as f64;
        BoundingBox::from_center(
            (self.center_x * w) as f32,
            (self.center_y * h) as f32,
            (self.width * w) as f32,
            (self.height * h) as f32,
        )
    }

    /// Serialize as a label line (six decimals, no trailing newline).
    pub fn to_line(&self) -> String {
        self.to_string()
    }

    /// Parse one label line.
    pub fn parse_line(line: &str) -> Result<Self, LabelError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(LabelError::FieldCount(fields.len()));
        }

        let class_id = fields[0].parse().map_err(|_| LabelError::InvalidValue {
            field: "class_id",
            value: fields[0].to_string(),
        })?;

        let center_x = parse_unit("center_x", fields[1])?;
        let center_y = parse_unit("center_y", fields[2])?;
        let width = parse_unit("width", fields[3])?;
        let height = parse_unit("height", fields[4])?;

        Ok(Self {
            class_id,
            center_x,
            center_y,
            width,
            height,
        })
    }
}

fn parse_unit(field: &'static str, raw: &str) -> Result<f64, LabelError> {
    let value: f64 = raw.parse().map_err(|_| LabelError::InvalidValue {
        field,
        value: raw.to_string(),
    })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(LabelError::OutOfRange { field, value });
    }
    Ok(value)
}

impl fmt::Display for YoloLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.center_x, self.center_y, self.width, self.height
        )
    }
}

impl FromStr for YoloLabel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bbox_normalizes() {
        let bbox = BoundingBox::new(100.0, 50.0, 300.0, 250.0);
        let label = YoloLabel::from_bbox(1, &bbox, 400, 500).unwrap();
        assert_eq!(label.to_line(), "1 0.500000 0.300000 0.500000 0.400000");
    }

    #[test]
    fn test_from_bbox_clips_to_image() {
        let bbox = BoundingBox::new(-50.0, -50.0, 50.0, 50.0);
        let label = YoloLabel::from_bbox(0, &bbox, 100, 100).unwrap();
        assert!((label.center_x - 0.25).abs() < 1e-9);
        assert!((label.width - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_from_bbox_rejects_bad_input() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(matches!(
            YoloLabel::from_bbox(0, &bbox, 0, 10),
            Err(LabelError::InvalidImageSize { .. })
        ));

        let outside = BoundingBox::new(200.0, 200.0, 300.0, 300.0);
        assert_eq!(
            YoloLabel::from_bbox(0, &outside, 100, 100),
            Err(LabelError::EmptyBox)
        );
    }

    #[test]
    fn test_parse_line() {
        let label: YoloLabel = "3 0.5 0.25 0.1 0.2".parse().unwrap();
        assert_eq!(label.class_id, 3);
        assert!((label.center_y - 0.25).abs() < 1e-9);

        let bbox = label.to_bbox(200, 400);
        assert!((bbox.x1 - 90.0).abs() < 1e-3);
        assert!((bbox.y2 - 140.0).abs() < 1e-3);
    }

    #[test]
    fn test_parse_line_errors() {
        assert_eq!(
            YoloLabel::parse_line("0 0.5 0.5"),
            Err(LabelError::FieldCount(3))
        );
        assert!(matches!(
            YoloLabel::parse_line("x 0.5 0.5 0.1 0.1"),
            Err(LabelError::InvalidValue { field: "class_id", .. })
        ));
        assert!(matches!(
            YoloLabel::parse_line("0 1.5 0.5 0.1 0.1"),
            Err(LabelError::OutOfRange { field: "center_x", .. })
        ));
    }
}
