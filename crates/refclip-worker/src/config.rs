//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;

use refclip_media::{BatchConfig, DevicePreference, PipelineConfig, YoloConfig};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory scanned for source videos
    pub input_dir: PathBuf,
    /// Directory receiving output segments
    pub output_dir: PathBuf,
    /// Directory receiving processed sources
    pub archive_dir: PathBuf,
    /// ONNX model weights
    pub model_path: PathBuf,
    /// Class name resolved against the model's class table
    pub target_class: String,
    /// Class id used when `target_class` is not in the table.
    /// Unset means an unknown class aborts startup.
    pub class_fallback: Option<usize>,
    /// Output frame height, a multiple of 32
    pub output_height: u32,
    /// Segment duration
    pub segment_seconds: u64,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    /// Container extension for sources and segments
    pub extension: String,
    pub device: DevicePreference,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("dataVideo"),
            output_dir: PathBuf::from("forLabel"),
            archive_dir: PathBuf::from("used"),
            model_path: PathBuf::from("models/referee.onnx"),
            target_class: "referee".to_string(),
            class_fallback: None,
            output_height: 640,
            segment_seconds: 3600, // 1 hour
            confidence_threshold: 0.7,
            nms_threshold: 0.45,
            extension: "mp4".to_string(),
            device: DevicePreference::Auto,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    ///
    /// Unset or empty variables take their default; malformed ones are an
    /// error.
    pub fn from_lookup<F>(lookup: F) -> WorkerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let config = Self {
            input_dir: get("REFCLIP_INPUT_DIR").map(PathBuf::from).unwrap_or(defaults.input_dir),
            output_dir: get("REFCLIP_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            archive_dir: get("REFCLIP_ARCHIVE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.archive_dir),
            model_path: get("REFCLIP_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            target_class: get("REFCLIP_TARGET_CLASS").unwrap_or(defaults.target_class),
            class_fallback: match get("REFCLIP_CLASS_FALLBACK_ID") {
                Some(raw) => Some(parse_value("REFCLIP_CLASS_FALLBACK_ID", &raw)?),
                None => None,
            },
            output_height: parse_or(&get, "REFCLIP_OUTPUT_HEIGHT", defaults.output_height)?,
            segment_seconds: parse_or(&get, "REFCLIP_SEGMENT_SECONDS", defaults.segment_seconds)?,
            confidence_threshold: parse_or(
                &get,
                "REFCLIP_CONFIDENCE",
                defaults.confidence_threshold,
            )?,
            nms_threshold: parse_or(&get, "REFCLIP_NMS_THRESHOLD", defaults.nms_threshold)?,
            extension: get("REFCLIP_EXTENSION")
                .map(|e| e.trim_start_matches('.').to_string())
                .unwrap_or(defaults.extension),
            device: parse_or(&get, "REFCLIP_DEVICE", defaults.device)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges. Does not touch the filesystem.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.output_height == 0 || self.output_height % 32 != 0 {
            return Err(WorkerError::config_error(format!(
                "REFCLIP_OUTPUT_HEIGHT must be a positive multiple of 32, got {}",
                self.output_height
            )));
        }
        if self.segment_seconds == 0 {
            return Err(WorkerError::config_error("REFCLIP_SEGMENT_SECONDS must be at least 1"));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(WorkerError::config_error(format!(
                "REFCLIP_CONFIDENCE must be in (0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(self.nms_threshold > 0.0 && self.nms_threshold <= 1.0) {
            return Err(WorkerError::config_error(format!(
                "REFCLIP_NMS_THRESHOLD must be in (0, 1], got {}",
                self.nms_threshold
            )));
        }
        if self.target_class.is_empty() {
            return Err(WorkerError::config_error("REFCLIP_TARGET_CLASS must not be empty"));
        }
        if self.extension.is_empty() {
            return Err(WorkerError::config_error("REFCLIP_EXTENSION must not be empty"));
        }
        Ok(())
    }

    /// Check the input directory and create the output and archive directories.
    pub fn prepare_directories(&self) -> WorkerResult<()> {
        if !self.input_dir.is_dir() {
            return Err(WorkerError::config_error(format!(
                "input directory does not exist: {}",
                self.input_dir.display()
            )));
        }
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.archive_dir)?;
        Ok(())
    }

    pub fn yolo_config(&self) -> YoloConfig {
        YoloConfig {
            model_path: self.model_path.clone(),
            confidence_floor: self.confidence_threshold,
            nms_threshold: self.nms_threshold,
            device: self.device,
            ..Default::default()
        }
    }

    /// Pipeline settings for a resolved target class id.
    pub fn pipeline_config(&self, target_class: usize) -> PipelineConfig {
        PipelineConfig {
            output_dir: self.output_dir.clone(),
            archive_dir: self.archive_dir.clone(),
            extension: self.extension.clone(),
            output_height: self.output_height,
            segment_seconds: self.segment_seconds,
            confidence_threshold: self.confidence_threshold,
            target_class,
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            input_dir: self.input_dir.clone(),
            extension: self.extension.clone(),
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> WorkerResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| WorkerError::config_error(format!("{} has invalid value '{}': {}", key, raw, e)))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> WorkerResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> WorkerResult<WorkerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.input_dir, PathBuf::from("dataVideo"));
        assert_eq!(config.output_dir, PathBuf::from("forLabel"));
        assert_eq!(config.archive_dir, PathBuf::from("used"));
        assert_eq!(config.target_class, "referee");
        assert_eq!(config.class_fallback, None);
        assert_eq!(config.output_height, 640);
        assert_eq!(config.segment_seconds, 3600);
        assert!((config.confidence_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.extension, "mp4");
        assert_eq!(config.device, DevicePreference::Auto);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("REFCLIP_OUTPUT_HEIGHT", "320"),
            ("REFCLIP_SEGMENT_SECONDS", "60"),
            ("REFCLIP_CONFIDENCE", "0.5"),
            ("REFCLIP_CLASS_FALLBACK_ID", "0"),
            ("REFCLIP_EXTENSION", ".mkv"),
            ("REFCLIP_DEVICE", "cpu"),
            ("REFCLIP_INPUT_DIR", "  "),
        ])
        .unwrap();

        assert_eq!(config.output_height, 320);
        assert_eq!(config.segment_seconds, 60);
        assert_eq!(config.class_fallback, Some(0));
        assert_eq!(config.extension, "mkv");
        assert_eq!(config.device, DevicePreference::Cpu);
        assert_eq!(config.input_dir, PathBuf::from("dataVideo"));
    }

    #[test]
    fn test_malformed_values_are_errors() {
        for vars in [
            [("REFCLIP_OUTPUT_HEIGHT", "tall")],
            [("REFCLIP_OUTPUT_HEIGHT", "100")],
            [("REFCLIP_SEGMENT_SECONDS", "0")],
            [("REFCLIP_CONFIDENCE", "1.5")],
            [("REFCLIP_CONFIDENCE", "0")],
            [("REFCLIP_NMS_THRESHOLD", "-1")],
            [("REFCLIP_CLASS_FALLBACK_ID", "first")],
            [("REFCLIP_DEVICE", "tpu")],
        ] {
            let result = config_from(&vars);
            assert!(
                matches!(result, Err(WorkerError::ConfigError(_))),
                "{:?} should be rejected",
                vars
            );
        }
    }

    #[test]
    fn test_derived_configs() {
        let config = config_from(&[("REFCLIP_SEGMENT_SECONDS", "10")]).unwrap();

        let pipeline = config.pipeline_config(3);
        assert_eq!(pipeline.target_class, 3);
        assert_eq!(pipeline.segment_seconds, 10);
        assert_eq!(pipeline.output_height, 640);
        assert!(pipeline.validate().is_ok());

        let yolo = config.yolo_config();
        assert_eq!(yolo.model_path, PathBuf::from("models/referee.onnx"));
        assert_eq!(yolo.input_size, 640);

        assert_eq!(config.batch_config().extension, "mp4");
    }

    #[test]
    fn test_prepare_directories() {
        let root = tempfile::TempDir::new().unwrap();
        let mut config = WorkerConfig {
            input_dir: root.path().join("in"),
            output_dir: root.path().join("out"),
            archive_dir: root.path().join("used"),
            ..Default::default()
        };
        assert!(config.prepare_directories().is_err());

        std::fs::create_dir(&config.input_dir).unwrap();
        config.prepare_directories().unwrap();
        assert!(config.output_dir.is_dir());
        assert!(config.archive_dir.is_dir());

        config.input_dir = root.path().join("missing");
        assert!(config.prepare_directories().is_err());
    }
}
