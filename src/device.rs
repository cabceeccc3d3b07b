//! Processing device selection (CPU vs GPU).
//!
//! Selection is a pure function of the caller's preference and whether a GPU
//! was detected. The chosen device is passed to every backend invocation
//! explicitly rather than through process-wide environment state.

use std::process::Command;

use serde::{Deserialize, Serialize};

/// Device a run executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        }
    }

    /// Device name in the spelling used by torch-based tools (`cuda` / `cpu`).
    pub fn torch_name(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "cuda",
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Gpu)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Policy for choosing between CPU and GPU.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// Use the GPU when one is present.
    #[default]
    #[serde(alias = "gpu-first")]
    GpuFirst,
    /// Always use the CPU.
    #[serde(alias = "cpu-first")]
    CpuFirst,
    /// Same as `gpu-first`.
    Auto,
}

impl DevicePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePreference::GpuFirst => "gpu_first",
            DevicePreference::CpuFirst => "cpu_first",
            DevicePreference::Auto => "auto",
        }
    }
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pick a device for a run.
pub fn select(preference: DevicePreference, gpu_available: bool) -> Device {
    match preference {
        DevicePreference::CpuFirst => Device::Cpu,
        DevicePreference::GpuFirst | DevicePreference::Auto => {
            if gpu_available {
                Device::Gpu
            } else {
                Device::Cpu
            }
        }
    }
}

/// Reports whether a GPU is usable in the current environment.
pub trait DeviceProbe: Send + Sync {
    fn is_gpu_available(&self) -> bool;
}

impl<P: DeviceProbe + ?Sized> DeviceProbe for Box<P> {
    fn is_gpu_available(&self) -> bool {
        (**self).is_gpu_available()
    }
}

/// Probe that asks `nvidia-smi` for the list of installed GPUs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl DeviceProbe for SystemProbe {
    fn is_gpu_available(&self) -> bool {
        let Ok(binary) = which::which("nvidia-smi") else {
            tracing::debug!("nvidia-smi not found in PATH, assuming no GPU");
            return false;
        };

        match Command::new(binary).arg("-L").output() {
            Ok(output) if output.status.success() => {
                let listing = String::from_utf8_lossy(&output.stdout);
                listing.lines().any(|line| line.starts_with("GPU "))
            }
            Ok(output) => {
                tracing::debug!(
                    "nvidia-smi exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(e) => {
                tracing::debug!("Failed to run nvidia-smi: {}", e);
                false
            }
        }
    }
}

/// Probe with a predetermined answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub bool);

impl DeviceProbe for FixedProbe {
    fn is_gpu_available(&self) -> bool {
        self.0
    }
}
