//! meshgen gateway entry point.
//!
//! Reads configuration from environment variables, binds the model to the
//! best available device and starts the axum-based HTTP service. A failed
//! model load does not stop the process; it serves in "unavailable" mode.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MESHGEN_HOST` | `0.0.0.0` | Address to bind. |
//! | `MESHGEN_PORT` | `8080` | TCP port to listen on. |
//! | `MESHGEN_DEVICE` | *(auto)* | Force `cuda`, `rocm`, `vulkan` or `cpu`. |
//! | `MESHGEN_WORKERS` | `4` | Blocking worker slots for decode and conversion. |
//! | `MESHGEN_MAX_UPLOAD_BYTES` | `33554432` | Largest accepted request body. |
//! | `MESHGEN_JOB_TIMEOUT_SECS` | `600` | Per-step wait limit; `0` disables it. |
//! | `RUST_LOG` | `meshgen_gateway=info,meshgen_runtime=info,tower_http=info` | Log filter. |

use meshgen_gateway::server::{GatewayServer, GatewayServerConfig};
use meshgen_runtime::{
    ComputeHandle, DeviceKind, GenerationParams, GlbExporter, HardwareInfo, JobRunner,
    PreviewPipeline,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("meshgen_gateway=info,meshgen_runtime=info,tower_http=info")
        }))
        .init();

    let defaults = GatewayServerConfig::default();
    let host = std::env::var("MESHGEN_HOST").unwrap_or(defaults.host);
    let port: u16 = env_or("MESHGEN_PORT", defaults.port);
    let workers: usize = env_or("MESHGEN_WORKERS", defaults.workers);
    let max_upload_bytes: usize = env_or("MESHGEN_MAX_UPLOAD_BYTES", defaults.max_upload_bytes);
    let job_timeout = match env_or::<u64>("MESHGEN_JOB_TIMEOUT_SECS", 600) {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let requested_device = match std::env::var("MESHGEN_DEVICE") {
        Ok(raw) if !raw.trim().is_empty() => match DeviceKind::from_str(&raw) {
            Ok(device) => Some(device),
            Err(err) => {
                warn!(error = %err, "ignoring MESHGEN_DEVICE, auto-detecting instead");
                None
            }
        },
        _ => None,
    };

    // Hardware probing shells out to vendor tools and model loading is slow;
    // both happen before the listener is bound.
    let handle = tokio::task::spawn_blocking(move || {
        let hardware = HardwareInfo::detect();
        info!(
            device = %hardware.device,
            available = ?hardware.available_devices,
            vram_mb = hardware.vram_bytes / (1024 * 1024),
            ram_mb = hardware.total_ram_bytes / (1024 * 1024),
            cpu_cores = hardware.cpu_cores,
            "hardware detected"
        );
        ComputeHandle::initialize(&hardware, requested_device, PreviewPipeline::loader())
    })
    .await
    .unwrap_or_else(|err| {
        tracing::error!(error = %err, "model initialization panicked, serving in unavailable mode");
        let device = DeviceKind::Cpu;
        ComputeHandle::unavailable(
            device,
            Arc::new(meshgen_runtime::SystemAccelerator::new(device)),
        )
    });

    let runner = JobRunner::new(
        Arc::new(handle),
        Arc::new(GlbExporter),
        GenerationParams::default(),
    );

    let server = GatewayServer::new(
        GatewayServerConfig {
            host,
            port,
            workers,
            max_upload_bytes,
            job_timeout,
        },
        runner,
    );

    if let Err(e) = server.start().await {
        eprintln!("Gateway error: {e}");
        std::process::exit(1);
    }
}

/// Parse an environment variable, falling back to `default` when unset or
/// malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
