//! Hardware detection for the generation model
//!
//! Detects available compute devices in priority order:
//! CUDA, then ROCm, then Vulkan, with the CPU as the last resort.
//!
//! Detection uses device-node checks and vendor CLIs rather than linking to GPU
//! libraries at compile time, so the crate builds the same on every host.

use crate::error::InitError;
use crate::pipeline::Accelerator;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Compute device the model is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DeviceKind {
    /// NVIDIA CUDA
    Cuda,
    /// AMD ROCm
    Rocm,
    /// Vulkan compute on any vendor
    Vulkan,
    /// CPU-only fallback, always available and very slow for large models
    Cpu,
}

impl DeviceKind {
    /// `true` for every device with its own memory cache to reclaim.
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, DeviceKind::Cpu)
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cuda => write!(f, "cuda"),
            DeviceKind::Rocm => write!(f, "rocm"),
            DeviceKind::Vulkan => write!(f, "vulkan"),
            DeviceKind::Cpu => write!(f, "cpu"),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cuda" => Ok(DeviceKind::Cuda),
            "rocm" => Ok(DeviceKind::Rocm),
            "vulkan" => Ok(DeviceKind::Vulkan),
            "cpu" => Ok(DeviceKind::Cpu),
            other => Err(format!("unknown device '{other}'")),
        }
    }
}

/// What the host offers for running the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareInfo {
    /// Best available device
    pub device: DeviceKind,
    /// All devices detected on this system, best first; always ends with CPU
    pub available_devices: Vec<DeviceKind>,
    /// Estimated VRAM in bytes (0 for CPU or when unknown)
    pub vram_bytes: u64,
    /// Host RAM in bytes
    pub total_ram_bytes: u64,
    /// Free host RAM in bytes when known
    pub available_ram_bytes: u64,
    /// Logical cores
    pub cpu_cores: usize,
}

impl HardwareInfo {
    /// Detect available hardware.
    ///
    /// Runs synchronously and may shell out to vendor tools, so call it from a
    /// blocking context or `spawn_blocking`.
    pub fn detect() -> Self {
        let mut available = Vec::new();

        let cuda_vram = detect_cuda();
        if cuda_vram.is_some() {
            available.push(DeviceKind::Cuda);
        }

        let rocm_vram = detect_rocm();
        if rocm_vram.is_some() {
            available.push(DeviceKind::Rocm);
        }

        if detect_vulkan() {
            available.push(DeviceKind::Vulkan);
        }

        available.push(DeviceKind::Cpu);

        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();

        Self {
            device: available[0],
            available_devices: available,
            vram_bytes: cuda_vram.or(rocm_vram).unwrap_or(0),
            total_ram_bytes: sys.total_memory(),
            available_ram_bytes: sys.available_memory(),
            cpu_cores: logical_cores(),
        }
    }

    /// A CPU-only environment, used when detection is skipped.
    pub fn cpu_only() -> Self {
        Self {
            device: DeviceKind::Cpu,
            available_devices: vec![DeviceKind::Cpu],
            vram_bytes: 0,
            total_ram_bytes: 0,
            available_ram_bytes: 0,
            cpu_cores: logical_cores(),
        }
    }

    /// `true` when at least one accelerator was found.
    pub fn has_accelerator(&self) -> bool {
        self.available_devices.iter().any(DeviceKind::is_accelerator)
    }

    /// Pick the device to bind: the requested one if present, otherwise the
    /// best detected device.
    pub fn select(&self, requested: Option<DeviceKind>) -> Result<DeviceKind, InitError> {
        match requested {
            Some(device) if self.available_devices.contains(&device) => Ok(device),
            Some(device) => Err(InitError::RequestedDeviceUnavailable(device)),
            None => Ok(self.device),
        }
    }
}

/// Accelerator runtime backed by the detected device.
///
/// The reference pipeline keeps nothing resident between calls, so reclaiming
/// only records the request. Real backends free their allocator cache here.
#[derive(Debug)]
pub struct SystemAccelerator {
    device: DeviceKind,
    reclaims: AtomicU64,
}

impl SystemAccelerator {
    pub fn new(device: DeviceKind) -> Self {
        Self {
            device,
            reclaims: AtomicU64::new(0),
        }
    }

    /// Number of cache reclaims issued since startup.
    pub fn reclaim_count(&self) -> u64 {
        self.reclaims.load(Ordering::Relaxed)
    }
}

impl Accelerator for SystemAccelerator {
    fn is_available(&self) -> bool {
        self.device.is_accelerator()
    }

    fn reclaim_cache(&self) {
        let n = self.reclaims.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(device = %self.device, reclaims = n, "accelerator cache reclaimed");
    }
}

// ----------------------------------------------------------------------------
// Device queries
// ----------------------------------------------------------------------------

/// A GPU vendor stack: a device node that proves the driver is loaded and a
/// CLI that reports memory.
struct VramQuery {
    node: &'static str,
    tool: &'static str,
    args: &'static [&'static str],
    parse: fn(&str) -> Option<u64>,
}

const CUDA_QUERY: VramQuery = VramQuery {
    node: "/dev/nvidia0",
    tool: "nvidia-smi",
    args: &["--query-gpu=memory.total", "--format=csv,noheader,nounits"],
    parse: parse_nvidia_smi,
};

const ROCM_QUERY: VramQuery = VramQuery {
    node: "/dev/kfd",
    tool: "rocm-smi",
    args: &["--showmeminfo", "vram", "--csv"],
    parse: parse_rocm_smi,
};

impl VramQuery {
    /// `None` without the driver; `Some(0)` when the driver is there but the
    /// tool is missing or its output unreadable.
    fn run(&self) -> Option<u64> {
        if !Path::new(self.node).exists() {
            return None;
        }
        let vram = Command::new(self.tool)
            .args(self.args)
            .output()
            .ok()
            .filter(|out| out.status.success())
            .and_then(|out| (self.parse)(&String::from_utf8_lossy(&out.stdout)));
        Some(vram.unwrap_or(0))
    }
}

fn detect_cuda() -> Option<u64> {
    CUDA_QUERY.run()
}

fn detect_rocm() -> Option<u64> {
    ROCM_QUERY.run()
}

/// First GPU's total in MiB, one line per GPU.
fn parse_nvidia_smi(stdout: &str) -> Option<u64> {
    let mib: u64 = stdout.lines().map(str::trim).find(|l| !l.is_empty())?.parse().ok()?;
    Some(mib * 1024 * 1024)
}

/// CSV with a header row; the second column is the total in bytes.
fn parse_rocm_smi(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|row| row.split(',').nth(1))
        .find_map(|total| total.trim().parse().ok())
}

fn detect_vulkan() -> bool {
    Path::new("/dev/dri/renderD128").exists()
        || Command::new("vulkaninfo")
            .arg("--summary")
            .output()
            .is_ok_and(|out| out.status.success())
}

fn logical_cores() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display_is_lowercase() {
        assert_eq!(DeviceKind::Cuda.to_string(), "cuda");
        assert_eq!(DeviceKind::Rocm.to_string(), "rocm");
        assert_eq!(DeviceKind::Vulkan.to_string(), "vulkan");
        assert_eq!(DeviceKind::Cpu.to_string(), "cpu");
    }

    #[test]
    fn test_device_parse() {
        assert_eq!("CUDA".parse::<DeviceKind>(), Ok(DeviceKind::Cuda));
        assert_eq!(" cpu ".parse::<DeviceKind>(), Ok(DeviceKind::Cpu));
        assert!("tpu".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn test_device_serializes_like_display() {
        let json = serde_json::to_string(&DeviceKind::Rocm).expect("serialize");
        assert_eq!(json, "\"rocm\"");
    }

    #[test]
    fn test_detect_always_includes_cpu() {
        let info = HardwareInfo::detect();
        assert_eq!(info.available_devices.last(), Some(&DeviceKind::Cpu));
        assert_eq!(info.device, info.available_devices[0]);
        assert!(info.cpu_cores > 0);
    }

    #[test]
    fn test_select_defaults_to_best() {
        let info = HardwareInfo::cpu_only();
        assert_eq!(info.select(None).unwrap(), DeviceKind::Cpu);
        assert!(!info.has_accelerator());
    }

    #[test]
    fn test_select_missing_device_fails() {
        let info = HardwareInfo::cpu_only();
        let err = info.select(Some(DeviceKind::Cuda)).unwrap_err();
        assert!(matches!(err, InitError::RequestedDeviceUnavailable(DeviceKind::Cuda)));
    }

    #[test]
    fn test_parse_nvidia_smi_takes_first_gpu() {
        assert_eq!(parse_nvidia_smi("24576\n8192\n"), Some(24576 * 1024 * 1024));
        assert_eq!(parse_nvidia_smi("\n"), None);
        assert_eq!(parse_nvidia_smi("[N/A]"), None);
    }

    #[test]
    fn test_parse_rocm_smi_skips_header() {
        let csv = "device,VRAM Total Memory (B),VRAM Total Used Memory (B)\ncard0,17163091968,10452992\n";
        assert_eq!(parse_rocm_smi(csv), Some(17_163_091_968));
        assert_eq!(parse_rocm_smi("device,total\n"), None);
    }

    #[test]
    fn test_system_accelerator_counts_reclaims() {
        let accel = SystemAccelerator::new(DeviceKind::Cpu);
        assert!(!accel.is_available());
        accel.reclaim_cache();
        accel.reclaim_cache();
        assert_eq!(accel.reclaim_count(), 2);
        assert!(SystemAccelerator::new(DeviceKind::Cuda).is_available());
    }
}
