//! # meshgen-runtime
//!
//! Service core for turning a single 2D image into a binary 3D model.
//!
//! The expensive part of a conversion is a stateful generative model bound to
//! one accelerator. This crate owns that model behind a [`ComputeHandle`] and
//! exposes it safely to concurrent callers:
//!
//! | Component | Type |
//! |-----------|------|
//! | Compute Resource Handle | [`ComputeHandle`] |
//! | Inference Job Runner | [`JobRunner`] |
//! | Concurrency Offload Layer | [`Offloader`] |
//! | Hardware detection | [`HardwareInfo`], [`DeviceKind`] |
//!
//! The model itself, the export codec and the accelerator runtime are
//! collaborators described by the traits in [`pipeline`]. [`preview`] and
//! [`glb`] provide working implementations so the service runs without
//! external weights.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meshgen_runtime::{
//!     ArtifactName, ComputeHandle, GenerationParams, GlbExporter, HardwareInfo, ImageInput,
//!     JobRunner, Offloader, PreviewPipeline,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let hardware = HardwareInfo::detect();
//!     let handle = ComputeHandle::initialize(&hardware, None, PreviewPipeline::loader());
//!     let runner = JobRunner::new(Arc::new(handle), Arc::new(GlbExporter), GenerationParams::default());
//!     let offloader = Offloader::new(4);
//!
//!     let bytes = std::fs::read("chair.png").unwrap();
//!     let image = offloader.submit(move || ImageInput::decode(&bytes)).await.unwrap();
//!     let artifact = offloader
//!         .submit(move || runner.run_job(image, ArtifactName::from_upload(Some("chair.png"))))
//!         .await
//!         .unwrap();
//!     println!("{} ({} bytes)", artifact.file_name(), artifact.len());
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod glb;
pub mod handle;
pub mod hardware;
pub mod input;
pub mod job;
pub mod offload;
pub mod pipeline;
pub mod preview;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use artifact::{ArtifactName, OutputArtifact};
pub use config::{GenerationParams, OutputFormat};
pub use error::{CollaboratorError, InitError, JobError};
pub use glb::GlbExporter;
pub use handle::ComputeHandle;
pub use hardware::{DeviceKind, HardwareInfo, SystemAccelerator};
pub use input::ImageInput;
pub use job::JobRunner;
pub use offload::Offloader;
pub use pipeline::{Accelerator, ArtifactExporter, ArtifactKind, ModelPipeline, PipelineLoader};
pub use preview::PreviewPipeline;
