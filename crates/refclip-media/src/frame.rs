//! Decoded frame representation.
//!
//! Frames travel through the pipeline as packed RGB8 buffers. Container
//! backends convert to and from their native layout at the edges.

use image::RgbImage;

use crate::error::{MediaError, MediaResult};

/// A decoded RGB frame.
pub type Frame = RgbImage;

/// Build a frame from packed RGB bytes (`width * height * 3`).
pub fn frame_from_rgb(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Frame> {
    let expected_len = width as usize * height as usize * 3;
    if data.len() != expected_len {
        return Err(MediaError::internal(format!(
            "Invalid frame data length: expected {}, got {}",
            expected_len,
            data.len()
        )));
    }

    RgbImage::from_raw(width, height, data)
        .ok_or_else(|| MediaError::internal("Failed to create frame buffer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_rgb() {
        let frame = frame_from_rgb(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.dimensions(), (2, 1));
        assert_eq!(frame.get_pixel(1, 0).0, [4, 5, 6]);
    }

    #[test]
    fn test_frame_from_rgb_rejects_bad_length() {
        assert!(frame_from_rgb(2, 2, vec![0; 5]).is_err());
    }
}
