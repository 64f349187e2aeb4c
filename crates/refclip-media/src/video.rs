//! Container decode and encode.
//!
//! The pipeline reads frames through [`FrameSource`] and writes segments
//! through [`EncoderFactory`](crate::segment::EncoderFactory). The OpenCV
//! implementations here are the production backends; with the `opencv`
//! feature disabled they report [`MediaError::UnsupportedFormat`].

use std::path::Path;

use refclip_models::SourceVideo;

use crate::error::MediaResult;
use crate::frame::Frame;

#[cfg(not(feature = "opencv"))]
use crate::error::MediaError;
#[cfg(not(feature = "opencv"))]
use crate::segment::{EncoderFactory, SegmentEncoder};

/// A sequential frame reader for one source video.
pub trait FrameSource: Send {
    /// Container metadata, read when the source was opened.
    fn video(&self) -> &SourceVideo;

    /// Next decoded frame.
    ///
    /// `Ok(None)` is the end of the stream. An error also terminates the
    /// stream; callers treat it as end of input.
    fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Release the underlying decoder. Idempotent.
    fn release(&mut self);
}

/// Opens source videos.
pub trait SourceOpener: Send + Sync {
    /// Open `path` for reading.
    ///
    /// Failures should be reported as [`MediaError::SourceOpen`](crate::MediaError::SourceOpen).
    fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>>;
}

#[cfg(feature = "opencv")]
mod backend {
    use std::path::{Path, PathBuf};

    use opencv::core::{Mat, Scalar, Size, CV_8UC3};
    use opencv::imgproc;
    use opencv::prelude::*;
    use opencv::videoio::{
        VideoCapture, VideoWriter, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT,
        CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH,
    };
    use refclip_models::SourceVideo;
    use tracing::{debug, warn};

    use super::{FrameSource, SourceOpener};
    use crate::error::{MediaError, MediaResult};
    use crate::frame::{frame_from_rgb, Frame};
    use crate::segment::{EncoderFactory, SegmentEncoder};

    /// Opens sources with OpenCV `VideoCapture`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct OpenCvOpener;

    impl SourceOpener for OpenCvOpener {
        fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
            OpenCvSource::open(path).map(|s| Box::new(s) as Box<dyn FrameSource>)
        }
    }

    /// OpenCV-backed frame reader.
    pub struct OpenCvSource {
        capture: VideoCapture,
        video: SourceVideo,
        released: bool,
    }

    impl OpenCvSource {
        pub fn open(path: &Path) -> MediaResult<Self> {
            let path_str = path
                .to_str()
                .ok_or_else(|| MediaError::source_open(path, "path is not valid UTF-8"))?;

            let capture = VideoCapture::from_file(path_str, CAP_ANY)
                .map_err(|e| MediaError::source_open(path, e.to_string()))?;
            if !capture.is_opened().unwrap_or(false) {
                return Err(MediaError::source_open(path, "decoder could not open file"));
            }

            let fps = capture.get(CAP_PROP_FPS).unwrap_or(0.0);
            if !fps.is_finite() || fps <= 0.0 {
                return Err(MediaError::source_open(
                    path,
                    format!("container reports invalid frame rate {}", fps),
                ));
            }

            let frame_count = capture
                .get(CAP_PROP_FRAME_COUNT)
                .ok()
                .filter(|c| c.is_finite() && *c > 0.0)
                .map(|c| c as u64);
            let width = capture.get(CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
            let height = capture.get(CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;

            debug!(
                source = %path.display(),
                fps,
                frame_count = ?frame_count,
                width,
                height,
                "Source opened"
            );

            Ok(Self {
                capture,
                video: SourceVideo {
                    path: path.to_path_buf(),
                    fps,
                    frame_count,
                    width,
                    height,
                },
                released: false,
            })
        }
    }

    impl FrameSource for OpenCvSource {
        fn video(&self) -> &SourceVideo {
            &self.video
        }

        fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
            if self.released {
                return Ok(None);
            }

            let mut bgr = Mat::default();
            let ok = self
                .capture
                .read(&mut bgr)
                .map_err(|e| MediaError::internal(format!("Frame decode failed: {}", e)))?;
            if !ok || bgr.empty() {
                return Ok(None);
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB)
                .map_err(|e| MediaError::internal(format!("Color conversion failed: {}", e)))?;

            let data = rgb
                .data_bytes()
                .map_err(|e| MediaError::internal(format!("Frame buffer not contiguous: {}", e)))?
                .to_vec();
            frame_from_rgb(rgb.cols() as u32, rgb.rows() as u32, data).map(Some)
        }

        fn release(&mut self) {
            if self.released {
                return;
            }
            self.released = true;
            if let Err(e) = self.capture.release() {
                warn!(source = %self.video.path.display(), "Failed to release decoder: {}", e);
            }
        }
    }

    impl Drop for OpenCvSource {
        fn drop(&mut self) {
            self.release();
        }
    }

    /// Creates segments with OpenCV `VideoWriter`.
    #[derive(Debug, Clone, Copy)]
    pub struct OpenCvEncoderFactory {
        fourcc: [char; 4],
    }

    impl OpenCvEncoderFactory {
        pub fn new(fourcc: [char; 4]) -> Self {
            Self { fourcc }
        }
    }

    impl Default for OpenCvEncoderFactory {
        fn default() -> Self {
            Self::new(['m', 'p', '4', 'v'])
        }
    }

    impl EncoderFactory for OpenCvEncoderFactory {
        fn create(
            &self,
            path: &Path,
            fps: f64,
            width: u32,
            height: u32,
        ) -> MediaResult<Box<dyn SegmentEncoder>> {
            let path_str = path
                .to_str()
                .ok_or_else(|| MediaError::output_create(path, "path is not valid UTF-8"))?;
            let [c1, c2, c3, c4] = self.fourcc;
            let fourcc = VideoWriter::fourcc(c1, c2, c3, c4)
                .map_err(|e| MediaError::output_create(path, e.to_string()))?;

            let writer = VideoWriter::new(
                path_str,
                fourcc,
                fps,
                Size::new(width as i32, height as i32),
                true,
            )
            .map_err(|e| MediaError::output_create(path, e.to_string()))?;
            if !writer.is_opened().unwrap_or(false) {
                return Err(MediaError::output_create(path, "encoder could not open file"));
            }

            Ok(Box::new(OpenCvEncoder {
                writer,
                path: path.to_path_buf(),
                width,
                height,
            }))
        }
    }

    /// OpenCV-backed segment file.
    pub struct OpenCvEncoder {
        writer: VideoWriter,
        path: PathBuf,
        width: u32,
        height: u32,
    }

    impl SegmentEncoder for OpenCvEncoder {
        fn write(&mut self, frame: &Frame) -> MediaResult<()> {
            let mut rgb = Mat::new_rows_cols_with_default(
                self.height as i32,
                self.width as i32,
                CV_8UC3,
                Scalar::all(0.0),
            )
            .map_err(|e| MediaError::encode_failed(e.to_string()))?;
            rgb.data_bytes_mut()
                .map_err(|e| MediaError::encode_failed(e.to_string()))?
                .copy_from_slice(frame.as_raw());

            let mut bgr = Mat::default();
            imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)
                .map_err(|e| MediaError::encode_failed(e.to_string()))?;

            self.writer
                .write(&bgr)
                .map_err(|e| MediaError::encode_failed(format!("{}: {}", self.path.display(), e)))
        }

        fn finish(mut self: Box<Self>) -> MediaResult<()> {
            self.writer
                .release()
                .map_err(|e| MediaError::encode_failed(format!("{}: {}", self.path.display(), e)))
        }
    }
}

#[cfg(feature = "opencv")]
pub use backend::{OpenCvEncoder, OpenCvEncoderFactory, OpenCvOpener, OpenCvSource};

/// Stub for when OpenCV is not available
#[cfg(not(feature = "opencv"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvOpener;

#[cfg(not(feature = "opencv"))]
impl SourceOpener for OpenCvOpener {
    fn open(&self, _path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        Err(MediaError::UnsupportedFormat(
            "OpenCV feature not enabled".to_string(),
        ))
    }
}

/// Stub for when OpenCV is not available
#[cfg(not(feature = "opencv"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvEncoderFactory;

#[cfg(not(feature = "opencv"))]
impl EncoderFactory for OpenCvEncoderFactory {
    fn create(
        &self,
        _path: &Path,
        _fps: f64,
        _width: u32,
        _height: u32,
    ) -> MediaResult<Box<dyn SegmentEncoder>> {
        Err(MediaError::UnsupportedFormat(
            "OpenCV feature not enabled".to_string(),
        ))
    }
}

/// Whether the production decoder and encoder are compiled in.
pub fn backend_available() -> bool {
    cfg!(feature = "opencv")
}

#[cfg(all(test, not(feature = "opencv")))]
mod tests {
    use super::*;

    #[test]
    fn test_stubs_report_unsupported() {
        assert!(matches!(
            OpenCvOpener.open(Path::new("a.mp4")),
            Err(MediaError::UnsupportedFormat(_))
        ));
        assert!(!backend_available());
    }
}
