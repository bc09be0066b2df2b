//! Instrumented fakes for exercising the job runner and gateway without a
//! real model. Enabled in this crate's tests and via the `testing` feature.

use crate::config::OutputFormat;
use crate::error::CollaboratorError;
use crate::input::ImageInput;
use crate::pipeline::{
    Accelerator, ArtifactExporter, ArtifactKind, Exportable, ModelPipeline, PointCloud,
    Representation, Representations, TriangleMesh,
};
use image::{DynamicImage, RgbaImage};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Counters shared between a [`RecordingPipeline`] and the test.
#[derive(Debug, Default)]
pub struct PipelineStats {
    runs: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    finished: AtomicUsize,
    dirty_starts: AtomicUsize,
}

impl PipelineStats {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Highest number of callers observed inside `run` at the same time.
    pub fn max_overlap(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls to `run` that began while an earlier job had not yet reclaimed.
    /// Only tracked for pipelines built with
    /// [`watching_reclaims`](RecordingPipeline::watching_reclaims).
    pub fn dirty_starts(&self) -> usize {
        self.dirty_starts.load(Ordering::SeqCst)
    }
}

/// Pipeline that records call overlap and can be told to sleep or fail.
#[derive(Debug, Clone)]
pub struct RecordingPipeline {
    stats: Arc<PipelineStats>,
    delay: Duration,
    fail: bool,
    reclaims: Option<Arc<AtomicUsize>>,
}

impl RecordingPipeline {
    pub fn new() -> (Self, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::default());
        let pipeline = Self {
            stats: stats.clone(),
            delay: Duration::ZERO,
            fail: false,
            reclaims: None,
        };
        (pipeline, stats)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Compare every `run` entry against this reclaim counter: one reclaim per
    /// finished run must already have happened.
    pub fn watching_reclaims(mut self, reclaims: Arc<AtomicUsize>) -> Self {
        self.reclaims = Some(reclaims);
        self
    }
}

impl ModelPipeline for RecordingPipeline {
    fn run(
        &mut self,
        _image: &ImageInput,
        _seed: u64,
        formats: &[OutputFormat],
    ) -> Result<Representations, CollaboratorError> {
        if let Some(reclaims) = &self.reclaims {
            if reclaims.load(Ordering::SeqCst) < self.stats.finished.load(Ordering::SeqCst) {
                self.stats.dirty_starts.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.stats.runs.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.stats.finished.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(CollaboratorError::new("out of device memory"));
        }

        let mut outputs = Representations::new();
        for format in formats {
            let repr = match format {
                OutputFormat::Mesh => Representation::Mesh(unit_triangle()),
                _ => Representation::Points(PointCloud {
                    positions: vec![[0.0, 0.0, 0.0]],
                    colors: vec![[1.0, 1.0, 1.0, 1.0]],
                }),
            };
            outputs.insert(*format, repr);
        }
        Ok(outputs)
    }
}

/// Accelerator that counts reclaim calls.
#[derive(Debug)]
pub struct CountingAccelerator {
    available: bool,
    reclaims: Arc<AtomicUsize>,
}

impl CountingAccelerator {
    pub fn new(available: bool) -> (Self, Arc<AtomicUsize>) {
        let reclaims = Arc::new(AtomicUsize::new(0));
        (
            Self {
                available,
                reclaims: reclaims.clone(),
            },
            reclaims,
        )
    }
}

impl Accelerator for CountingAccelerator {
    fn is_available(&self) -> bool {
        self.available
    }

    fn reclaim_cache(&self) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
    }
}

/// Exporter that writes a fixed payload, or fails when asked to.
#[derive(Debug, Default)]
pub struct StaticExporter {
    fail: AtomicBool,
    delay: Duration,
}

/// Payload written by [`StaticExporter`].
pub const STATIC_ARTIFACT: &[u8] = b"glTF-static-artifact";

impl StaticExporter {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            delay: Duration::ZERO,
        }
    }

    /// Sleep in `to_artifact`, standing in for a slow device-side export.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

struct StaticScene;

impl Exportable for StaticScene {
    fn export(&self, out: &mut dyn Write, _kind: ArtifactKind) -> Result<(), CollaboratorError> {
        out.write_all(STATIC_ARTIFACT)?;
        Ok(())
    }
}

impl ArtifactExporter for StaticExporter {
    fn to_artifact(
        &self,
        outputs: &Representations,
        _simplify: f32,
        _texture_size: u32,
    ) -> Result<Box<dyn Exportable>, CollaboratorError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("mesh export failed"));
        }
        if outputs.mesh().is_none() {
            return Err(CollaboratorError::new("mesh output missing"));
        }
        Ok(Box::new(StaticScene))
    }
}

pub fn unit_triangle() -> TriangleMesh {
    TriangleMesh {
        positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        colors: vec![[1.0, 0.0, 0.0, 1.0]; 3],
        indices: vec![0, 1, 2],
    }
}

pub fn solid_image(w: u32, h: u32) -> ImageInput {
    ImageInput::from_image(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        w,
        h,
        image::Rgba([200, 120, 40, 255]),
    )))
}
