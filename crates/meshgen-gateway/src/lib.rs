//! `meshgen-gateway`: HTTP front end for image-to-3D conversion.
//!
//! Accepts one image per request, runs it through the
//! [`meshgen_runtime`] job runner on a bounded blocking pool and returns the
//! generated model as `model/gltf-binary`.
//!
//! The [`server::GatewayServer`] wires everything together into an axum
//! HTTP service.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meshgen_gateway::server::{GatewayServer, GatewayServerConfig};
//! use meshgen_runtime::{
//!     ComputeHandle, GenerationParams, GlbExporter, HardwareInfo, JobRunner, PreviewPipeline,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let hardware = HardwareInfo::detect();
//!     let handle = ComputeHandle::initialize(&hardware, None, PreviewPipeline::loader());
//!     let runner = JobRunner::new(Arc::new(handle), Arc::new(GlbExporter), GenerationParams::default());
//!
//!     let server = GatewayServer::new(GatewayServerConfig::default(), runner);
//!     server.start().await.unwrap();
//! }
//! ```

pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use error::{GatewayError, GatewayResult};
