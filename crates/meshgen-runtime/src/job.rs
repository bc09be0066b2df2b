//! Inference job runner
//!
//! One job turns one decoded image into one artifact. While holding the
//! handle's lock it generates, exports, then releases the intermediate outputs
//! and reclaims accelerator memory. The reclaim lives in [`ReclaimScope`]'s `Drop`, so it
//! runs exactly once on success, on generation or export failure, and while
//! unwinding from a panic.

use crate::artifact::{ArtifactName, OutputArtifact};
use crate::config::GenerationParams;
use crate::error::JobError;
use crate::handle::ComputeHandle;
use crate::input::ImageInput;
use crate::pipeline::{ArtifactExporter, ArtifactKind, Representations};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runs complete image → artifact jobs against a shared [`ComputeHandle`].
///
/// Cheap to clone; clones share the handle and exporter.
#[derive(Clone)]
pub struct JobRunner {
    handle: Arc<ComputeHandle>,
    exporter: Arc<dyn ArtifactExporter>,
    params: GenerationParams,
    kind: ArtifactKind,
}

impl JobRunner {
    pub fn new(
        handle: Arc<ComputeHandle>,
        exporter: Arc<dyn ArtifactExporter>,
        params: GenerationParams,
    ) -> Self {
        Self {
            handle,
            exporter,
            params,
            kind: ArtifactKind::Glb,
        }
    }

    pub fn handle(&self) -> &Arc<ComputeHandle> {
        &self.handle
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Execute one job. Blocking: call through an [`Offloader`](crate::Offloader).
    ///
    /// Generation, export and the release of the job's outputs all happen
    /// inside the handle's exclusive section, so the next job only enters the
    /// model once this one has reclaimed.
    pub fn run_job(&self, image: ImageInput, name: ArtifactName) -> Result<OutputArtifact, JobError> {
        if !self.handle.is_ready() {
            return Err(JobError::ResourceUnavailable);
        }

        let started = Instant::now();
        let bytes = self
            .handle
            .exclusive(|pipeline| -> Result<Vec<u8>, JobError> {
                let mut scope = ReclaimScope::new(&self.handle);

                let outputs = pipeline
                    .run(&image, self.params.seed, &self.params.formats)
                    .map_err(|e| JobError::GenerationFailed(e.to_string()))?;
                drop(image);
                let outputs = scope.hold(outputs);
                debug!(
                    formats = ?outputs.formats().collect::<Vec<_>>(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generation finished"
                );

                self.export(outputs)
            })
            .ok_or(JobError::ResourceUnavailable)??;

        info!(
            file = %name.file_name(self.kind),
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "job finished"
        );

        Ok(OutputArtifact {
            name,
            kind: self.kind,
            bytes,
        })
    }

    fn export(&self, outputs: &Representations) -> Result<Vec<u8>, JobError> {
        let scene = self
            .exporter
            .to_artifact(outputs, self.params.simplify, self.params.texture_size)
            .map_err(|e| JobError::GenerationFailed(e.to_string()))?;

        let mut buf = Vec::new();
        scene
            .export(&mut buf, self.kind)
            .map_err(|e| JobError::GenerationFailed(e.to_string()))?;
        Ok(buf)
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("handle", &self.handle)
            .field("params", &self.params)
            .finish()
    }
}

/// Owns a job's intermediate outputs; dropping it frees them and reclaims
/// the accelerator cache. Lives inside the exclusive section, so it drops
/// before the lock is released, unwinding included.
struct ReclaimScope<'a> {
    handle: &'a ComputeHandle,
    outputs: Option<Representations>,
}

impl<'a> ReclaimScope<'a> {
    fn new(handle: &'a ComputeHandle) -> Self {
        Self {
            handle,
            outputs: None,
        }
    }

    fn hold(&mut self, outputs: Representations) -> &Representations {
        self.outputs.insert(outputs)
    }
}

impl Drop for ReclaimScope<'_> {
    fn drop(&mut self) {
        // Outputs must be gone before the cache is reclaimed.
        drop(self.outputs.take());
        self.handle.reclaim();
    }
}
