//! Reference model pipeline
//!
//! Produces a coloured relief of the input image: the image is downsampled to
//! a grid whose height follows pixel luminance. It needs no weights and runs
//! on any device, which makes the service usable end to end before a real
//! generative model is plugged in.

use crate::config::OutputFormat;
use crate::error::{CollaboratorError, InitError};
use crate::hardware::DeviceKind;
use crate::input::ImageInput;
use crate::pipeline::{ModelPipeline, PointCloud, Representation, Representations, TriangleMesh};
use image::imageops::FilterType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Relief-mesh pipeline.
#[derive(Debug)]
pub struct PreviewPipeline {
    device: DeviceKind,
    resolution: u32,
    depth: f32,
    runs: u64,
}

impl PreviewPipeline {
    /// Grid side for the longest image edge.
    pub const DEFAULT_RESOLUTION: u32 = 96;

    pub fn new(device: DeviceKind) -> Self {
        Self {
            device,
            resolution: Self::DEFAULT_RESOLUTION,
            depth: 0.15,
            runs: 0,
        }
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution.max(2);
        self
    }

    /// Loader for [`ComputeHandle::initialize`](crate::ComputeHandle::initialize).
    pub fn loader() -> impl Fn(DeviceKind) -> Result<Box<dyn ModelPipeline>, InitError> {
        |device| Ok(Box::new(PreviewPipeline::new(device)) as Box<dyn ModelPipeline>)
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    fn relief(&self, image: &ImageInput) -> TriangleMesh {
        let source = image.as_image();
        let fitted = if source.width() > self.resolution || source.height() > self.resolution {
            source.thumbnail(self.resolution, self.resolution)
        } else {
            source.clone()
        };
        let (w, h) = (fitted.width().max(2), fitted.height().max(2));
        let grid = if (w, h) == (fitted.width(), fitted.height()) {
            fitted.to_rgba8()
        } else {
            fitted.resize_exact(w, h, FilterType::Nearest).to_rgba8()
        };

        let scale = 1.0 / (w.max(h) - 1) as f32;
        let (cx, cy) = ((w - 1) as f32 / 2.0, (h - 1) as f32 / 2.0);

        let mut positions = Vec::with_capacity((w * h) as usize);
        let mut colors = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let [r, g, b, a] = grid.get_pixel(x, y).0.map(|c| c as f32 / 255.0);
                let luminance = 0.2126 * r + 0.7152 * g + 0.0722 * b;
                positions.push([
                    (x as f32 - cx) * scale,
                    (cy - y as f32) * scale,
                    luminance * a * self.depth,
                ]);
                colors.push([r, g, b, a]);
            }
        }

        let mut indices = Vec::with_capacity(((w - 1) * (h - 1) * 6) as usize);
        for y in 0..h - 1 {
            for x in 0..w - 1 {
                let i = y * w + x;
                indices.extend_from_slice(&[i, i + w, i + 1, i + 1, i + w, i + w + 1]);
            }
        }

        TriangleMesh {
            positions,
            colors,
            indices,
        }
    }
}

/// Seeded jitter of the mesh vertices, half a grid cell at most.
fn scatter_points(mesh: &TriangleMesh, seed: u64, cell: f32) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let half = cell / 2.0;
    let positions = mesh
        .positions
        .iter()
        .map(|[x, y, z]| {
            [
                x + rng.gen_range(-half..=half),
                y + rng.gen_range(-half..=half),
                *z,
            ]
        })
        .collect();
    PointCloud {
        positions,
        colors: mesh.colors.clone(),
    }
}

impl ModelPipeline for PreviewPipeline {
    fn run(
        &mut self,
        image: &ImageInput,
        seed: u64,
        formats: &[OutputFormat],
    ) -> Result<Representations, CollaboratorError> {
        if formats.is_empty() {
            return Err(CollaboratorError::new("no output formats requested"));
        }
        if let Some(unsupported) = formats.iter().find(|f| **f == OutputFormat::RadianceField) {
            return Err(CollaboratorError::new(format!(
                "preview pipeline cannot produce {unsupported} outputs"
            )));
        }

        let mesh = self.relief(image);
        let mut outputs = Representations::new();
        if formats.contains(&OutputFormat::Gaussian) {
            let cell = 1.0 / self.resolution as f32;
            outputs.insert(
                OutputFormat::Gaussian,
                Representation::Points(scatter_points(&mesh, seed, cell)),
            );
        }

        self.runs += 1;
        debug!(
            device = %self.device,
            run = self.runs,
            vertices = mesh.positions.len(),
            triangles = mesh.triangle_count(),
            "preview relief generated"
        );

        if formats.contains(&OutputFormat::Mesh) {
            outputs.insert(OutputFormat::Mesh, Representation::Mesh(mesh));
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::solid_image;

    fn both() -> Vec<OutputFormat> {
        vec![OutputFormat::Gaussian, OutputFormat::Mesh]
    }

    #[test]
    fn test_relief_grid_shape() {
        let mut p = PreviewPipeline::new(DeviceKind::Cpu).with_resolution(8);
        let out = p.run(&solid_image(16, 8), 1, &both()).unwrap();
        let mesh = out.mesh().expect("mesh output");
        // 16x8 thumbnails to 8x4
        assert_eq!(mesh.positions.len(), 32);
        assert_eq!(mesh.triangle_count(), 7 * 3 * 2);
        assert_eq!(mesh.colors.len(), mesh.positions.len());
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.positions.len()));
        assert_eq!(out.points().expect("points").positions.len(), 32);
        assert_eq!(p.runs(), 1);
    }

    #[test]
    fn test_tiny_image_still_meshes() {
        let mut p = PreviewPipeline::new(DeviceKind::Cpu);
        let out = p.run(&solid_image(1, 1), 1, &[OutputFormat::Mesh]).unwrap();
        assert_eq!(out.mesh().unwrap().triangle_count(), 2);
        assert!(out.points().is_none());
    }

    #[test]
    fn test_seed_is_deterministic() {
        let mut p = PreviewPipeline::new(DeviceKind::Cpu).with_resolution(6);
        let img = solid_image(6, 6);
        let a = p.run(&img, 7, &both()).unwrap();
        let b = p.run(&img, 7, &both()).unwrap();
        let c = p.run(&img, 8, &both()).unwrap();
        let pa = &a.points().unwrap().positions;
        assert_eq!(pa, &b.points().unwrap().positions);
        assert_ne!(pa, &c.points().unwrap().positions);
    }

    #[test]
    fn test_radiance_field_rejected() {
        let mut p = PreviewPipeline::new(DeviceKind::Cpu);
        let err = p
            .run(&solid_image(4, 4), 1, &[OutputFormat::RadianceField])
            .unwrap_err();
        assert!(err.to_string().contains("radiance_field"));
        assert_eq!(p.runs(), 0);
    }

    #[test]
    fn test_loader_builds_pipeline() {
        let loader = PreviewPipeline::loader();
        assert!(loader(DeviceKind::Cpu).is_ok());
    }
}
