//! Compute device selection for inference.
//!
//! Device placement and numeric precision are resolved once, when the
//! detector session is built, and captured in a [`ComputeDevice`]. Frame
//! processing code never inspects it; only the detector's tensor packing
//! reads the precision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// Requested device, from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Try accelerators in platform order, then fall back to CPU
    #[default]
    Auto,
    /// NVIDIA GPU via CUDA (requires the `cuda` feature)
    Cuda,
    /// Apple CoreML (macOS only)
    CoreMl,
    /// General-purpose processor only
    Cpu,
}

impl FromStr for DevicePreference {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            "cpu" => Ok(Self::Cpu),
            other => Err(MediaError::invalid_config(format!(
                "unknown device '{}', expected auto, cuda, coreml or cpu",
                other
            ))),
        }
    }
}

/// Execution provider actually backing the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTarget {
    Cuda,
    CoreMl,
    Cpu,
}

impl ExecutionTarget {
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, ExecutionTarget::Cpu)
    }
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionTarget::Cuda => write!(f, "cuda"),
            ExecutionTarget::CoreMl => write!(f, "coreml"),
            ExecutionTarget::Cpu => write!(f, "cpu"),
        }
    }
}

/// Numeric precision of the model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp32,
    Fp16,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Fp32 => write!(f, "fp32"),
            Precision::Fp16 => write!(f, "fp16"),
        }
    }
}

/// Construction-time capability of an inference session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeDevice {
    pub target: ExecutionTarget,
    pub precision: Precision,
}

impl ComputeDevice {
    pub fn new(target: ExecutionTarget, precision: Precision) -> Self {
        Self { target, precision }
    }

    pub fn cpu() -> Self {
        Self::new(ExecutionTarget::Cpu, Precision::Fp32)
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.precision)
    }
}

/// Execution targets to try for a preference, in order.
///
/// `Auto` lists only the accelerators compiled for this platform before CPU.
/// An explicit accelerator request still ends with CPU so a missing driver
/// degrades instead of failing startup.
pub fn candidate_targets(preference: DevicePreference) -> Vec<ExecutionTarget> {
    let mut targets = Vec::new();
    match preference {
        DevicePreference::Auto => {
            if cfg!(all(target_os = "linux", feature = "cuda")) {
                targets.push(ExecutionTarget::Cuda);
            }
            if cfg!(target_os = "macos") {
                targets.push(ExecutionTarget::CoreMl);
            }
        }
        DevicePreference::Cuda => targets.push(ExecutionTarget::Cuda),
        DevicePreference::CoreMl => targets.push(ExecutionTarget::CoreMl),
        DevicePreference::Cpu => {}
    }
    targets.push(ExecutionTarget::Cpu);
    targets
}
