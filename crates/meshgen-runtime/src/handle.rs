//! The process-wide compute resource
//!
//! [`ComputeHandle`] owns the one initialized [`ModelPipeline`] and the
//! accelerator it is bound to. It is built once at startup and shared by
//! reference (`Arc`) with every job; there is no global instance.

use crate::error::InitError;
use crate::hardware::{DeviceKind, HardwareInfo, SystemAccelerator};
use crate::pipeline::{Accelerator, ModelPipeline, PipelineLoader};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Model pipeline bound to a device, or nothing if loading failed.
pub struct ComputeHandle {
    /// Single-slot critical section around the model's `run`.
    pipeline: Option<Mutex<Box<dyn ModelPipeline>>>,
    device: DeviceKind,
    accelerator: Arc<dyn Accelerator>,
}

impl ComputeHandle {
    /// Bind a pipeline to the best available device.
    ///
    /// Never fails: a load error is logged and yields an unavailable handle so
    /// the process keeps serving and reports the failure per request.
    pub fn initialize(
        hardware: &HardwareInfo,
        requested: Option<DeviceKind>,
        loader: impl PipelineLoader,
    ) -> Self {
        match Self::try_initialize(hardware, requested, loader) {
            Ok(handle) => handle,
            Err(err) => {
                error!(
                    error = %err,
                    requested = ?requested,
                    "model load failed, serving in unavailable mode"
                );
                // The device a load would have used; a missing forced device
                // falls back to the best one actually present.
                let device = hardware.select(requested).unwrap_or(hardware.device);
                Self::unavailable(device, Arc::new(SystemAccelerator::new(device)))
            }
        }
    }

    /// Bind a pipeline, returning the startup error instead of degrading.
    pub fn try_initialize(
        hardware: &HardwareInfo,
        requested: Option<DeviceKind>,
        loader: impl PipelineLoader,
    ) -> Result<Self, InitError> {
        let device = hardware.select(requested)?;
        if !device.is_accelerator() {
            warn!(
                available = ?hardware.available_devices,
                "no accelerator detected, falling back to CPU; generation will be very slow"
            );
        }

        info!(device = %device, vram_bytes = hardware.vram_bytes, "loading model");
        let pipeline = loader.load(device)?;
        info!(device = %device, "model loaded");

        Ok(Self::with_pipeline(
            pipeline,
            device,
            Arc::new(SystemAccelerator::new(device)),
        ))
    }

    /// Wrap an already constructed pipeline.
    pub fn with_pipeline(
        pipeline: Box<dyn ModelPipeline>,
        device: DeviceKind,
        accelerator: Arc<dyn Accelerator>,
    ) -> Self {
        Self {
            pipeline: Some(Mutex::new(pipeline)),
            device,
            accelerator,
        }
    }

    /// A handle with no model; every job fails with `ResourceUnavailable`.
    pub fn unavailable(device: DeviceKind, accelerator: Arc<dyn Accelerator>) -> Self {
        Self {
            pipeline: None,
            device,
            accelerator,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    /// Whether the bound device runtime reports itself usable.
    pub fn is_accelerated(&self) -> bool {
        self.accelerator.is_available()
    }

    /// Enter the single-slot section and hand `work` the pipeline.
    ///
    /// The lock is held until `work` returns or unwinds, so anything `work`
    /// allocates on the device is released before the next caller gets in.
    /// Returns `None` when no pipeline is loaded.
    pub(crate) fn exclusive<R>(&self, work: impl FnOnce(&mut dyn ModelPipeline) -> R) -> Option<R> {
        let slot = self.pipeline.as_ref()?;
        let mut pipeline = slot.lock();
        Some(work(&mut **pipeline))
    }

    /// Ask the accelerator runtime to drop its cached allocations.
    pub(crate) fn reclaim(&self) {
        self.accelerator.reclaim_cache();
    }
}

impl std::fmt::Debug for ComputeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeHandle")
            .field("ready", &self.is_ready())
            .field("device", &self.device)
            .field("accelerated", &self.is_accelerated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingAccelerator, RecordingPipeline};

    fn failing_loader(_: DeviceKind) -> Result<Box<dyn ModelPipeline>, InitError> {
        Err(InitError::LoadFailed("weights missing".into()))
    }

    #[test]
    fn test_initialize_binds_cpu_without_accelerator() {
        let (pipeline, stats) = RecordingPipeline::new();
        let handle = ComputeHandle::initialize(
            &HardwareInfo::cpu_only(),
            None,
            move |_: DeviceKind| -> Result<Box<dyn ModelPipeline>, InitError> {
                Ok(Box::new(pipeline.clone()))
            },
        );
        assert_eq!(stats.runs(), 0);
        assert!(handle.is_ready());
        assert_eq!(handle.device(), DeviceKind::Cpu);
        assert!(!handle.is_accelerated());
    }

    #[test]
    fn test_load_failure_degrades_to_unavailable() {
        let handle = ComputeHandle::initialize(&HardwareInfo::cpu_only(), None, failing_loader);
        assert!(!handle.is_ready());
        assert_eq!(handle.device(), DeviceKind::Cpu);
    }

    #[test]
    fn test_failed_load_reports_requested_present_device() {
        let mut hardware = HardwareInfo::cpu_only();
        hardware.available_devices.insert(0, DeviceKind::Vulkan);
        hardware.device = DeviceKind::Vulkan;
        let handle = ComputeHandle::initialize(&hardware, Some(DeviceKind::Cpu), failing_loader);
        assert!(!handle.is_ready());
        assert_eq!(handle.device(), DeviceKind::Cpu);
    }

    #[test]
    fn test_try_initialize_surfaces_error() {
        let err = ComputeHandle::try_initialize(&HardwareInfo::cpu_only(), None, failing_loader)
            .unwrap_err();
        assert!(matches!(err, InitError::LoadFailed(_)));
    }

    #[test]
    fn test_requested_missing_device_is_unavailable() {
        let handle = ComputeHandle::initialize(
            &HardwareInfo::cpu_only(),
            Some(DeviceKind::Cuda),
            |_: DeviceKind| -> Result<Box<dyn ModelPipeline>, InitError> {
                panic!("loader must not run for a missing device")
            },
        );
        assert!(!handle.is_ready());
        // Reports what the host has, not what was asked for.
        assert_eq!(handle.device(), DeviceKind::Cpu);
    }

    #[test]
    fn test_unavailable_handle_never_enters_pipeline() {
        let (accel, _) = CountingAccelerator::new(true);
        let handle = ComputeHandle::unavailable(DeviceKind::Cuda, Arc::new(accel));
        assert!(handle.exclusive(|_| ()).is_none());
    }
}
