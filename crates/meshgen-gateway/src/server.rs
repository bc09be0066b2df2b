//! Axum-based HTTP gateway server.
//!
//! [`GatewayServer`] wires the job runner and worker pool into a running
//! axum service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service status and bound compute device. |
//! | `GET`  | `/health` | Liveness check, always `200 OK`. |
//! | `POST` | `/convert` | Multipart image upload → `model/gltf-binary`. |

use crate::handlers::{convert_router, health_router};
use crate::state::AppState;
use axum::{Router, extract::DefaultBodyLimit};
use meshgen_runtime::{JobRunner, Offloader};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServerConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime configuration for [`GatewayServer`].
#[derive(Debug, Clone)]
pub struct GatewayServerConfig {
    /// Address to bind (default: `0.0.0.0`).
    pub host: String,
    /// TCP port to listen on (default: 8080).
    pub port: u16,
    /// Blocking worker slots for decode and conversion (default: 4).
    pub workers: usize,
    /// Largest accepted request body in bytes (default: 32 MiB).
    pub max_upload_bytes: usize,
    /// How long a request waits for each offloaded step before failing.
    /// `None` waits indefinitely (default: 600 s).
    pub job_timeout: Option<Duration>,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: 4,
            max_upload_bytes: 32 * 1024 * 1024,
            job_timeout: Some(Duration::from_secs(600)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

/// Gateway server owning the job runner and its worker pool.
pub struct GatewayServer {
    config: GatewayServerConfig,
    runner: JobRunner,
}

impl GatewayServer {
    /// Create a server around an already initialized runner.
    pub fn new(config: GatewayServerConfig, runner: JobRunner) -> Self {
        Self { config, runner }
    }

    /// Build the axum [`Router`]. Call [`start()`](Self::start) to bind and
    /// serve, or drive the router directly in tests.
    pub fn build_app(&self) -> Router {
        let state = AppState::new(
            self.runner.clone(),
            Offloader::new(self.config.workers),
            self.config.job_timeout,
            self.config.max_upload_bytes,
        );

        Router::new()
            .merge(health_router())
            .merge(convert_router())
            .layer(DefaultBodyLimit::max(self.config.max_upload_bytes))
            .layer(CorsLayer::very_permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind to `{host}:{port}` and serve until Ctrl-C or SIGTERM.
    pub async fn start(self) -> std::io::Result<()> {
        let app = self.build_app();
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let handle = self.runner.handle();
        info!(
            addr = %addr,
            device = %handle.device(),
            ready = handle.is_ready(),
            accelerated = handle.is_accelerated(),
            workers = self.config.workers,
            max_upload_bytes = self.config.max_upload_bytes,
            "meshgen gateway starting"
        );
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
