//! Object detection using a YOLOv8-family ONNX model.
//!
//! Provides the production [`Detector`] with execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS with Apple Silicon
//! - CPU fallback on all platforms
//!
//! The class-name table comes from the Ultralytics `names` metadata entry
//! embedded in exported models, unless an explicit table is configured.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use half::f16;
use image::imageops::FilterType;
use ndarray::ArrayView2;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{Tensor, Value, ValueType};
use refclip_models::{BoundingBox, Detection};
use tracing::{debug, info, warn};

use crate::detector::{parse_class_names, Detector};
use crate::device::{candidate_targets, ComputeDevice, DevicePreference, ExecutionTarget, Precision};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Configuration for the YOLO detector.
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Candidates below this confidence are dropped before NMS
    pub confidence_floor: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Square input size expected by the model (multiple of 32)
    pub input_size: u32,
    /// Requested execution device
    pub device: DevicePreference,
    /// Class names overriding the model metadata
    pub class_names: Option<Vec<String>>,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/referee.onnx"),
            confidence_floor: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
            device: DevicePreference::Auto,
            class_names: None,
        }
    }
}

/// YOLO detector backed by an ONNX Runtime session.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: YoloConfig,
    device: ComputeDevice,
    class_names: Vec<String>,
}

impl YoloDetector {
    /// Load the model and resolve device placement and precision.
    ///
    /// Returns an error if the model file doesn't exist or cannot be loaded.
    /// Both are fatal for the run.
    pub fn new(config: YoloConfig) -> MediaResult<Self> {
        if !config.model_path.exists() {
            return Err(MediaError::model_not_found(
                config.model_path.display().to_string(),
            ));
        }
        if config.input_size == 0 || config.input_size % 32 != 0 {
            return Err(MediaError::invalid_config(format!(
                "model input size must be a positive multiple of 32, got {}",
                config.input_size
            )));
        }

        let (session, target) = create_session(&config.model_path, config.device)?;
        let precision = input_precision(&session)?;
        let device = ComputeDevice::new(target, precision);

        let class_names = match &config.class_names {
            Some(names) => names.clone(),
            None => model_class_names(&session)?,
        };

        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            device = %device,
            classes = class_names.len(),
            "Object detector initialized"
        );

        Ok(Self {
            session: Mutex::new(session),
            config,
            device,
            class_names,
        })
    }

    /// Device and precision chosen at construction.
    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn config(&self) -> &YoloConfig {
        &self.config
    }

    /// Resize to the model input and pack as NCHW, normalized to [0, 1].
    fn preprocess(&self, frame: &Frame) -> MediaResult<Value> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(frame, size, size, FilterType::Triangle);
        let chw = pack_chw(&resized);
        let shape = vec![1usize, 3, size as usize, size as usize];

        match self.device.precision {
            Precision::Fp32 => Tensor::from_array((shape, chw.into_boxed_slice()))
                .map(Value::from)
                .map_err(|e| MediaError::inference_failed(format!("Failed to create tensor: {}", e))),
            Precision::Fp16 => {
                let half: Vec<f16> = chw.into_iter().map(f16::from_f32).collect();
                Tensor::from_array((shape, half.into_boxed_slice()))
                    .map(Value::from)
                    .map_err(|e| {
                        MediaError::inference_failed(format!("Failed to create tensor: {}", e))
                    })
            }
        }
    }

    /// Run the session and return the raw output with its `(features, boxes)` shape.
    fn run_inference(&self, input: Value) -> MediaResult<(Vec<f32>, usize, usize)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::inference_failed("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::inference_failed(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 4 + classes, candidates]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::inference_failed("Missing output0 tensor"))?;

        let (dims, data): (Vec<i64>, Vec<f32>) = match self.device.precision {
            Precision::Fp32 => {
                let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
                    MediaError::inference_failed(format!("Failed to extract tensor: {}", e))
                })?;
                (shape.to_vec(), data.to_vec())
            }
            Precision::Fp16 => {
                let (shape, data) = output.try_extract_tensor::<f16>().map_err(|e| {
                    MediaError::inference_failed(format!("Failed to extract tensor: {}", e))
                })?;
                (shape.to_vec(), data.iter().map(|v| v.to_f32()).collect())
            }
        };

        if dims.len() != 3 || dims[1] <= 4 || dims[2] <= 0 {
            return Err(MediaError::inference_failed(format!(
                "Unexpected output shape: {:?}",
                dims
            )));
        }

        Ok((data, dims[1] as usize, dims[2] as usize))
    }
}

impl Detector for YoloDetector {
    fn infer(&mut self, frame: &Frame) -> MediaResult<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        let input = self.preprocess(frame)?;
        let (output, features, boxes) = self.run_inference(input)?;

        let candidates = decode_output(
            &output,
            features,
            boxes,
            self.config.input_size,
            width,
            height,
            self.config.confidence_floor,
        )?;
        let detections = non_maximum_suppression(candidates, self.config.nms_threshold);

        debug!(count = detections.len(), "Object detection completed");
        Ok(detections)
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn name(&self) -> &'static str {
        "yolo"
    }
}

/// HWC RGB8 to CHW f32 in [0, 1].
fn pack_chw(img: &Frame) -> Vec<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let raw = img.as_raw();
    let plane = w * h;
    let mut chw = vec![0.0f32; 3 * plane];

    for (i, px) in raw.chunks_exact(3).enumerate() {
        chw[i] = px[0] as f32 / 255.0;
        chw[plane + i] = px[1] as f32 / 255.0;
        chw[2 * plane + i] = px[2] as f32 / 255.0;
    }
    chw
}

/// Decode a `[features, boxes]` YOLOv8 output into pixel-space detections.
///
/// Each candidate column holds `cx, cy, w, h` in model-input pixels followed
/// by one score per class. Boxes are scaled back to the original frame and
/// clipped to it.
pub fn decode_output(
    output: &[f32],
    features: usize,
    boxes: usize,
    input_size: u32,
    orig_width: u32,
    orig_height: u32,
    confidence_floor: f32,
) -> MediaResult<Vec<Detection>> {
    let view = ArrayView2::from_shape((features, boxes), output).map_err(|e| {
        MediaError::inference_failed(format!("Failed to reshape output: {}", e))
    })?;
    let num_classes = features - 4;

    let scale_w = orig_width as f32 / input_size as f32;
    let scale_h = orig_height as f32 / input_size as f32;

    let mut candidates = Vec::new();
    for i in 0..boxes {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for c in 0..num_classes {
            let score = view[[4 + c, i]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if best_score < confidence_floor {
            continue;
        }

        let bbox = BoundingBox::from_center(
            view[[0, i]] * scale_w,
            view[[1, i]] * scale_h,
            view[[2, i]] * scale_w,
            view[[3, i]] * scale_h,
        )
        .clamp(orig_width, orig_height);

        if bbox.is_degenerate() {
            continue;
        }

        candidates.push(Detection::new(bbox, best_score, best_class));
    }

    Ok(candidates)
}

/// Per-class Non-Maximum Suppression.
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

/// Create an ONNX Runtime session, trying execution targets in preference order.
fn create_session(
    model_path: &Path,
    preference: DevicePreference,
) -> MediaResult<(Session, ExecutionTarget)> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::model_load(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::model_load(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::model_load(format!("Failed to set optimization level: {}", e)))?;

    for target in candidate_targets(preference) {
        match target {
            ExecutionTarget::Cpu => {
                info!("Using CPU execution provider for object detection");
                let session = builder
                    .clone()
                    .commit_from_memory(&model_bytes)
                    .map_err(|e| MediaError::model_load(format!("Failed to load ONNX model: {}", e)))?;
                return Ok((session, ExecutionTarget::Cpu));
            }
            accelerator => match try_accelerator(&builder, accelerator, &model_bytes) {
                Some(session) => {
                    info!(target = %accelerator, "Using accelerator execution provider for object detection");
                    return Ok((session, accelerator));
                }
                None => debug!(target = %accelerator, "Execution provider not available, trying alternatives"),
            },
        }
    }

    Err(MediaError::model_load("No execution provider available"))
}

#[allow(unused_variables)]
fn try_accelerator(
    builder: &SessionBuilder,
    target: ExecutionTarget,
    model_bytes: &[u8],
) -> Option<Session> {
    match target {
        #[cfg(all(target_os = "linux", feature = "cuda"))]
        ExecutionTarget::Cuda => {
            use ort::execution_providers::CUDAExecutionProvider;
            builder
                .clone()
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .ok()?
                .commit_from_memory(model_bytes)
                .ok()
        }
        #[cfg(target_os = "macos")]
        ExecutionTarget::CoreMl => {
            use ort::execution_providers::CoreMLExecutionProvider;
            builder
                .clone()
                .with_execution_providers([CoreMLExecutionProvider::default().build()])
                .ok()?
                .commit_from_memory(model_bytes)
                .ok()
        }
        other => {
            warn!(target = %other, "Execution provider not compiled into this build");
            None
        }
    }
}

/// Precision of the model's first input.
fn input_precision(session: &Session) -> MediaResult<Precision> {
    let input = session
        .inputs
        .first()
        .ok_or_else(|| MediaError::model_load("Model has no inputs"))?;

    match &input.input_type {
        ValueType::Tensor {
            ty: TensorElementType::Float32,
            ..
        } => Ok(Precision::Fp32),
        ValueType::Tensor {
            ty: TensorElementType::Float16,
            ..
        } => Ok(Precision::Fp16),
        other => Err(MediaError::model_load(format!(
            "Unsupported model input type: {:?}",
            other
        ))),
    }
}

/// Class table from the model's `names` metadata entry.
fn model_class_names(session: &Session) -> MediaResult<Vec<String>> {
    let metadata = session
        .metadata()
        .map_err(|e| MediaError::model_load(format!("Failed to read model metadata: {}", e)))?;
    let raw = metadata
        .custom("names")
        .map_err(|e| MediaError::model_load(format!("Failed to read class names: {}", e)))?;

    match raw {
        Some(raw) => parse_class_names(&raw),
        None => {
            warn!("Model metadata has no class names; configure them explicitly");
            Ok(Vec::new())
        }
    }
}
