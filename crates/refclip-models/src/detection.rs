//! Detector output types.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in source-frame pixel coordinates.
///
/// Stored in corner format (`x1,y1` top-left, `x2,y2` bottom-right), which is
/// what the detector emits after decoding its center-format output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a box from center format (`cx, cy, w, h`).
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x1: cx - width / 2.0,
            y1: cy - height / 2.0,
            x2: cx + width / 2.0,
            y2: cy + height / 2.0,
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Width over height, or `None` for a degenerate box.
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.is_degenerate() {
            None
        } else {
            Some(self.width() / self.height())
        }
    }

    /// A box is degenerate when it has no positive width or height.
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Clip the box to the frame bounds.
    pub fn clamp(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let w = frame_width as f32;
        let h = frame_height as f32;
        BoundingBox {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Integer pixel rectangle `(x, y, width, height)` for cropping.
    ///
    /// Corners are truncated toward zero. Returns `None` if the rectangle
    /// collapses to zero width or height after truncation.
    pub fn pixel_rect(&self) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.max(0.0) as u32;
        let y1 = self.y1.max(0.0) as u32;
        let x2 = self.x2.max(0.0) as u32;
        let y2 = self.y2.max(0.0) as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One detection of interest in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box in source-frame pixels
    pub bbox: BoundingBox,
    /// Detection confidence [0, 1]
    pub confidence: f32,
    /// Model class id
    pub class_id: usize,
    /// Stable identity across frames, when tracking is enabled
    pub track_id: Option<u32>,
}

impl Detection {
    /// Create an untracked detection.
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: usize) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            track_id: None,
        }
    }

    /// Attach a track id.
    pub fn with_track_id(mut self, track_id: u32) -> Self {
        self.track_id = Some(track_id);
        self
    }

    /// Whether the box can be cropped at all.
    pub fn is_usable(&self) -> bool {
        !self.bbox.is_degenerate()
    }
}
