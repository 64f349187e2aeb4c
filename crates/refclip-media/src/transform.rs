//! Crop-and-resize of detections into fixed-size output frames.
//!
//! A detection box is cropped from the raw frame and resized, preserving the
//! box's aspect ratio, to the largest size that fits a square `H x H` canvas.
//! Because an output container needs fixed frame dimensions, the resized crop
//! is then letterboxed onto that canvas.

use image::imageops::{self, FilterType};
use image::Rgb;
use refclip_models::{BoundingBox, Detection};
use tracing::trace;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Result of transforming one raw frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    /// Produced from this frame's detection; becomes the new last valid frame
    Fresh(Frame),
    /// No usable detection; the previous valid frame is reused
    Fallback(Frame),
    /// No usable detection and nothing valid yet: nothing to write
    Empty,
}

impl Transformed {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Transformed::Fresh(frame) | Transformed::Fallback(frame) => Some(frame),
            Transformed::Empty => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Transformed::Fresh(_))
    }
}

/// Stateless frame transformer.
///
/// The last valid frame is owned by the caller and passed in and out of
/// [`FrameTransformer::transform`].
#[derive(Debug, Clone, Copy)]
pub struct FrameTransformer {
    target_height: u32,
}

impl FrameTransformer {
    /// Create a transformer for the given output height (a multiple of 32).
    pub fn new(target_height: u32) -> MediaResult<Self> {
        if target_height == 0 || target_height % 32 != 0 {
            return Err(MediaError::invalid_config(format!(
                "output height must be a positive multiple of 32, got {}",
                target_height
            )));
        }
        Ok(Self { target_height })
    }

    pub fn target_height(&self) -> u32 {
        self.target_height
    }

    /// Fixed `(width, height)` of every output frame.
    pub fn output_size(&self) -> (u32, u32) {
        (self.target_height, self.target_height)
    }

    /// Produce the output frame for one raw frame.
    pub fn transform(
        &self,
        raw: &Frame,
        detection: Option<&Detection>,
        last_valid: Option<Frame>,
    ) -> Transformed {
        let fresh = detection.and_then(|det| self.crop_and_resize(raw, &det.bbox));

        match (fresh, last_valid) {
            (Some(crop), _) => Transformed::Fresh(self.letterbox(&crop)),
            (None, Some(previous)) => Transformed::Fallback(previous),
            (None, None) => Transformed::Empty,
        }
    }

    /// Crop `raw` to `bbox` and resize it to fit the `H x H` canvas in one
    /// step, preserving the box's aspect ratio.
    ///
    /// Boxes at least as tall as they are wide come out `H` high and
    /// `round(H * box_width / box_height)` wide. Wider boxes come out `H` wide
    /// instead, so the resize never allocates beyond the canvas. Both sides
    /// are at least one pixel. Returns `None` for boxes that are degenerate
    /// once clipped to the frame.
    pub fn crop_and_resize(&self, raw: &Frame, bbox: &BoundingBox) -> Option<Frame> {
        let (x, y, w, h) = bbox.clamp(raw.width(), raw.height()).pixel_rect()?;

        let (target_width, target_height) = self.fitted_size(w, h);

        trace!(x, y, w, h, target_width, target_height, "Cropping detection");

        let crop = imageops::crop_imm(raw, x, y, w, h).to_image();
        Some(imageops::resize(
            &crop,
            target_width,
            target_height,
            FilterType::Triangle,
        ))
    }

    /// Size of a `w x h` box scaled by `min(H / h, H / w)`.
    fn fitted_size(&self, w: u32, h: u32) -> (u32, u32) {
        let side = self.target_height;
        if w <= h {
            let width = ((side as f64 * w as f64 / h as f64).round() as u32).clamp(1, side);
            (width, side)
        } else {
            let height = ((side as f64 * h as f64 / w as f64).round() as u32).clamp(1, side);
            (side, height)
        }
    }

    /// Center `crop` on a black `H x H` canvas, scaling it down to fit first
    /// when it is wider than the canvas.
    pub fn letterbox(&self, crop: &Frame) -> Frame {
        let (canvas_w, canvas_h) = self.output_size();
        let mut canvas = Frame::from_pixel(canvas_w, canvas_h, Rgb([0, 0, 0]));

        let fitted;
        let content = if crop.width() > canvas_w || crop.height() > canvas_h {
            let scale = f64::min(
                canvas_w as f64 / crop.width() as f64,
                canvas_h as f64 / crop.height() as f64,
            );
            let w = ((crop.width() as f64 * scale).round() as u32).clamp(1, canvas_w);
            let h = ((crop.height() as f64 * scale).round() as u32).clamp(1, canvas_h);
            fitted = imageops::resize(crop, w, h, FilterType::Triangle);
            &fitted
        } else {
            crop
        };

        let offset_x = (canvas_w - content.width()) / 2;
        let offset_y = (canvas_h - content.height()) / 2;
        imageops::overlay(&mut canvas, content, offset_x as i64, offset_y as i64);
        canvas
    }
}
