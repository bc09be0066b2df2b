//! Collaborator contracts consumed by the job runner
//!
//! - [`ModelPipeline`]: the generative model, `run(image, seed, formats)`
//! - [`ArtifactExporter`] / [`Exportable`]: the mesh/texture export codec
//! - [`Accelerator`]: the device runtime, availability and cache reclaim

use crate::config::OutputFormat;
use crate::error::{CollaboratorError, InitError};
use crate::hardware::DeviceKind;
use crate::input::ImageInput;
use std::collections::BTreeMap;
use std::io::Write;

/// Coloured point cloud (gaussian centres)
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub positions: Vec<[f32; 3]>,
    /// Linear RGBA in `[0, 1]`, one per position
    pub colors: Vec<[f32; 4]>,
}

/// Indexed triangle mesh
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    pub positions: Vec<[f32; 3]>,
    /// Linear RGBA in `[0, 1]`, one per position
    pub colors: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// One model output
#[derive(Debug, Clone)]
pub enum Representation {
    Points(PointCloud),
    Mesh(TriangleMesh),
}

/// Model outputs keyed by format.
///
/// Owned by exactly one job and dropped before that job returns.
#[derive(Debug, Default)]
pub struct Representations {
    outputs: BTreeMap<OutputFormat, Representation>,
}

impl Representations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, format: OutputFormat, repr: Representation) {
        self.outputs.insert(format, repr);
    }

    pub fn get(&self, format: OutputFormat) -> Option<&Representation> {
        self.outputs.get(&format)
    }

    pub fn mesh(&self) -> Option<&TriangleMesh> {
        match self.outputs.get(&OutputFormat::Mesh) {
            Some(Representation::Mesh(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn points(&self) -> Option<&PointCloud> {
        match self.outputs.get(&OutputFormat::Gaussian) {
            Some(Representation::Points(points)) => Some(points),
            _ => None,
        }
    }

    pub fn formats(&self) -> impl Iterator<Item = OutputFormat> + '_ {
        self.outputs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// The generative model bound to one device.
///
/// Implementations hold mutable device state and are never called
/// concurrently; [`ComputeHandle`](crate::ComputeHandle) serializes access,
/// and the previous job's outputs are released before the next `run`.
pub trait ModelPipeline: Send {
    fn run(
        &mut self,
        image: &ImageInput,
        seed: u64,
        formats: &[OutputFormat],
    ) -> Result<Representations, CollaboratorError>;
}

/// Constructs a [`ModelPipeline`] for the selected device.
pub trait PipelineLoader {
    fn load(&self, device: DeviceKind) -> Result<Box<dyn ModelPipeline>, InitError>;
}

impl<F> PipelineLoader for F
where
    F: Fn(DeviceKind) -> Result<Box<dyn ModelPipeline>, InitError>,
{
    fn load(&self, device: DeviceKind) -> Result<Box<dyn ModelPipeline>, InitError> {
        self(device)
    }
}

/// Container formats an [`Exportable`] can be written as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ArtifactKind {
    /// glTF 2.0 binary (`model/gltf-binary`)
    Glb,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Glb => "glb",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactKind::Glb => "model/gltf-binary",
        }
    }
}

/// A converted scene ready to be serialized.
pub trait Exportable {
    fn export(&self, out: &mut dyn Write, kind: ArtifactKind) -> Result<(), CollaboratorError>;
}

/// Converts model outputs into an exportable scene.
pub trait ArtifactExporter: Send + Sync {
    fn to_artifact(
        &self,
        outputs: &Representations,
        simplify: f32,
        texture_size: u32,
    ) -> Result<Box<dyn Exportable>, CollaboratorError>;
}

/// Device runtime hooks.
pub trait Accelerator: Send + Sync {
    fn is_available(&self) -> bool;

    /// Release cached device memory held by the runtime allocator.
    fn reclaim_cache(&self);
}
