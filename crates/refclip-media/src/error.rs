//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to open source video {path}: {message}")]
    SourceOpen { path: PathBuf, message: String },

    #[error("Failed to create output file {path}: {message}")]
    OutputCreate { path: PathBuf, message: String },

    #[error("Failed to encode frame: {0}")]
    EncodeFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Target class '{name}' not found in model classes {available:?}")]
    UnknownClass {
        name: String,
        available: Vec<String>,
    },

    #[error("Archive destination already exists: {0}")]
    ArchiveConflict(PathBuf),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a source-open failure error.
    pub fn source_open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SourceOpen {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an output-creation failure error.
    pub fn output_create(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::OutputCreate {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an encoding failure error.
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::EncodeFailed(message.into())
    }

    /// Create an inference failure error.
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::InferenceFailed(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create a model load error.
    pub fn model_load(message: impl Into<String>) -> Self {
        Self::ModelLoad(message.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the source file must stay in the input directory.
    ///
    /// Reader/writer creation failures leave the source untouched so a later
    /// run can retry it; so does cancellation, which interrupts a source
    /// before it is fully consumed.
    pub fn is_source_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::SourceOpen { .. } | MediaError::OutputCreate { .. } | MediaError::Cancelled
        )
    }

    /// Whether the error is scoped to a single frame and absorbed by the frame loop.
    pub fn is_frame_scoped(&self) -> bool {
        matches!(self, MediaError::InferenceFailed(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MediaError::SourceOpen { .. } => "source_open",
            MediaError::OutputCreate { .. } => "output_create",
            MediaError::EncodeFailed(_) => "encode",
            MediaError::InferenceFailed(_) => "inference",
            MediaError::ModelNotFound(_) | MediaError::ModelLoad(_) => "model",
            MediaError::UnknownClass { .. } => "unknown_class",
            MediaError::ArchiveConflict(_) => "archive_conflict",
            MediaError::FileNotFound(_) => "file_not_found",
            MediaError::InvalidConfig(_) => "config",
            MediaError::UnsupportedFormat(_) => "unsupported",
            MediaError::Cancelled => "cancelled",
            MediaError::Io(_) => "io",
            MediaError::Internal(_) => "internal",
        }
    }
}
