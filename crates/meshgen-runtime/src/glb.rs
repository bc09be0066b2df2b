//! glTF 2.0 binary export
//!
//! [`GlbExporter`] turns the mesh output (plus the point output, when present,
//! as the texture source) into a single-primitive GLB with POSITION,
//! TEXCOORD_0, indices and an embedded PNG base-colour texture.
//!
//! Simplification is vertex clustering on a uniform grid sized so roughly
//! `(1 - simplify)` of the vertices survive.

use crate::error::CollaboratorError;
use crate::pipeline::{ArtifactExporter, ArtifactKind, Exportable, Representations, TriangleMesh};
use image::imageops::FilterType;
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{Cursor, Write};

const GLB_MAGIC: &[u8; 4] = b"glTF";
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;
const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_UNSIGNED_INT: u32 = 5125;
const FILTER_LINEAR: u32 = 9729;

/// Largest baked texture side, regardless of the requested size.
pub const MAX_TEXTURE_SIZE: u32 = 4096;

/// Exporter producing GLB containers.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlbExporter;

/// An encoded GLB scene.
#[derive(Debug)]
pub struct GlbScene {
    bytes: Vec<u8>,
    vertices: usize,
    triangles: usize,
}

impl GlbScene {
    pub fn vertex_count(&self) -> usize {
        self.vertices
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles
    }
}

impl Exportable for GlbScene {
    fn export(&self, out: &mut dyn Write, kind: ArtifactKind) -> Result<(), CollaboratorError> {
        match kind {
            ArtifactKind::Glb => out.write_all(&self.bytes)?,
        }
        Ok(())
    }
}

impl ArtifactExporter for GlbExporter {
    fn to_artifact(
        &self,
        outputs: &Representations,
        simplify: f32,
        texture_size: u32,
    ) -> Result<Box<dyn Exportable>, CollaboratorError> {
        let scene = self.build(outputs, simplify, texture_size)?;
        Ok(Box::new(scene))
    }
}

impl GlbExporter {
    /// Build the GLB scene for `outputs`.
    pub fn build(
        &self,
        outputs: &Representations,
        simplify: f32,
        texture_size: u32,
    ) -> Result<GlbScene, CollaboratorError> {
        let source = outputs
            .mesh()
            .ok_or_else(|| CollaboratorError::new("mesh output is required for GLB export"))?;
        if source.positions.is_empty() || source.indices.len() < 3 {
            return Err(CollaboratorError::new("mesh output is empty"));
        }
        if let Some(&bad) = source.indices.iter().find(|&&i| i as usize >= source.positions.len()) {
            return Err(CollaboratorError::new(format!("mesh index {bad} out of range")));
        }

        let bounds = Bounds::of(&source.positions);
        let mesh = simplify_mesh(source, simplify.clamp(0.0, 1.0));

        let texture = match outputs.points() {
            Some(points) if !points.positions.is_empty() => {
                bake_texture(&points.positions, &points.colors, &bounds, texture_size)
            }
            _ => bake_texture(&source.positions, &source.colors, &bounds, texture_size),
        };
        let mut png = Cursor::new(Vec::new());
        texture.write_to(&mut png, ImageFormat::Png)?;

        let uvs: Vec<[f32; 2]> = mesh.positions.iter().map(|p| bounds.uv(p)).collect();
        let mesh_bounds = Bounds::of(&mesh.positions);

        let mut bin = BinBuilder::default();
        let pos_view = bin.push(bytes_of_vec3(&mesh.positions), Some(TARGET_ARRAY_BUFFER));
        let uv_view = bin.push(bytes_of_vec2(&uvs), Some(TARGET_ARRAY_BUFFER));
        let idx_view = bin.push(bytes_of_u32(&mesh.indices), Some(TARGET_ELEMENT_ARRAY_BUFFER));
        let img_view = bin.push(png.into_inner(), None);

        let doc = json!({
            "asset": { "version": "2.0", "generator": concat!("meshgen-runtime ", env!("CARGO_PKG_VERSION")) },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{
                "primitives": [{
                    "attributes": { "POSITION": 0, "TEXCOORD_0": 1 },
                    "indices": 2,
                    "material": 0,
                }],
            }],
            "materials": [{
                "pbrMetallicRoughness": {
                    "baseColorTexture": { "index": 0 },
                    "metallicFactor": 0.0,
                    "roughnessFactor": 1.0,
                },
                "doubleSided": true,
            }],
            "textures": [{ "source": 0, "sampler": 0 }],
            "samplers": [{ "magFilter": FILTER_LINEAR, "minFilter": FILTER_LINEAR }],
            "images": [{ "bufferView": img_view, "mimeType": "image/png" }],
            "accessors": [
                {
                    "bufferView": pos_view,
                    "componentType": COMPONENT_FLOAT,
                    "count": mesh.positions.len(),
                    "type": "VEC3",
                    "min": mesh_bounds.min,
                    "max": mesh_bounds.max,
                },
                {
                    "bufferView": uv_view,
                    "componentType": COMPONENT_FLOAT,
                    "count": uvs.len(),
                    "type": "VEC2",
                },
                {
                    "bufferView": idx_view,
                    "componentType": COMPONENT_UNSIGNED_INT,
                    "count": mesh.indices.len(),
                    "type": "SCALAR",
                },
            ],
            "bufferViews": bin.views,
            "buffers": [{ "byteLength": bin.data.len() }],
        });

        let json = serde_json::to_vec(&doc).map_err(|e| CollaboratorError::new(e.to_string()))?;
        Ok(GlbScene {
            bytes: encode_glb(json, bin.data),
            vertices: mesh.positions.len(),
            triangles: mesh.triangle_count(),
        })
    }
}

// ============================================================================
// Geometry helpers
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: [f32; 3],
    max: [f32; 3],
}

impl Bounds {
    fn of(points: &[[f32; 3]]) -> Self {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for p in points {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        if points.is_empty() {
            min = [0.0; 3];
            max = [0.0; 3];
        }
        Self { min, max }
    }

    fn extent(&self) -> [f32; 3] {
        [0, 1, 2].map(|axis| self.max[axis] - self.min[axis])
    }

    /// Planar projection onto the XY bounds; v grows downwards.
    fn uv(&self, p: &[f32; 3]) -> [f32; 2] {
        let [ex, ey, _] = self.extent();
        let u = if ex > 0.0 { (p[0] - self.min[0]) / ex } else { 0.5 };
        let v = if ey > 0.0 { (self.max[1] - p[1]) / ey } else { 0.5 };
        [u.clamp(0.0, 1.0), v.clamp(0.0, 1.0)]
    }
}

/// Vertex clustering: merge all vertices sharing a grid cell into their
/// average and drop triangles that collapse.
fn simplify_mesh(mesh: &TriangleMesh, ratio: f32) -> TriangleMesh {
    let n = mesh.positions.len();
    let target = ((n as f32) * (1.0 - ratio)).round().max(4.0) as usize;
    if ratio <= 0.0 || target >= n {
        return mesh.clone();
    }

    let bounds = Bounds::of(&mesh.positions);
    let extent = bounds.extent();
    let largest = extent.iter().copied().fold(0.0_f32, f32::max);
    if largest <= 0.0 {
        return mesh.clone();
    }

    // Flat axes get a single layer so the cell budget goes to the others.
    let significant: Vec<f32> = extent.iter().copied().filter(|e| *e > largest * 1e-3).collect();
    let volume: f32 = significant.iter().product();
    let cell = (volume / target as f32).powf(1.0 / significant.len() as f32);
    let dims = extent.map(|e| ((e / cell).ceil() as u64).max(1));

    let mut clusters: HashMap<[u64; 3], u32> = HashMap::new();
    let mut sums: Vec<([f32; 3], [f32; 4], f32)> = Vec::new();
    let mut remap = Vec::with_capacity(n);
    for (i, p) in mesh.positions.iter().enumerate() {
        let key = [0, 1, 2].map(|axis| {
            let raw = ((p[axis] - bounds.min[axis]) / cell).floor().max(0.0) as u64;
            raw.min(dims[axis] - 1)
        });
        let next = sums.len() as u32;
        let id = *clusters.entry(key).or_insert(next);
        if id == next {
            sums.push(([0.0; 3], [0.0; 4], 0.0));
        }
        let entry = &mut sums[id as usize];
        for axis in 0..3 {
            entry.0[axis] += p[axis];
        }
        let color = mesh.colors.get(i).copied().unwrap_or([1.0; 4]);
        for c in 0..4 {
            entry.1[c] += color[c];
        }
        entry.2 += 1.0;
        remap.push(id);
    }

    let mut indices = Vec::with_capacity(mesh.indices.len());
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| remap[i as usize]);
        if a != b && b != c && a != c {
            indices.extend_from_slice(&[a, b, c]);
        }
    }
    if indices.is_empty() {
        return mesh.clone();
    }

    let (positions, colors): (Vec<[f32; 3]>, Vec<[f32; 4]>) = sums
        .into_iter()
        .map(|(p, c, count)| (p.map(|v| v / count), c.map(|v| v / count)))
        .unzip();

    TriangleMesh {
        positions,
        colors,
        indices,
    }
}

/// Splat coloured points into a square texture over the XY bounds.
fn bake_texture(
    positions: &[[f32; 3]],
    colors: &[[f32; 4]],
    bounds: &Bounds,
    texture_size: u32,
) -> RgbaImage {
    let size = texture_size.clamp(1, MAX_TEXTURE_SIZE);
    let side = ((positions.len() as f64).sqrt().ceil() as u32).clamp(1, size);

    let mut accum = vec![[0.0_f32; 5]; (side * side) as usize];
    let mut mean = [0.0_f32; 4];
    for (i, p) in positions.iter().enumerate() {
        let color = colors.get(i).copied().unwrap_or([1.0; 4]);
        let [u, v] = bounds.uv(p);
        let tx = ((u * (side - 1) as f32).round() as u32).min(side - 1);
        let ty = ((v * (side - 1) as f32).round() as u32).min(side - 1);
        let cell = &mut accum[(ty * side + tx) as usize];
        for c in 0..4 {
            cell[c] += color[c];
            mean[c] += color[c];
        }
        cell[4] += 1.0;
    }
    let total = positions.len().max(1) as f32;
    let fill = mean.map(|c| c / total);

    let low = RgbaImage::from_fn(side, side, |x, y| {
        let cell = accum[(y * side + x) as usize];
        let color = if cell[4] > 0.0 {
            [cell[0], cell[1], cell[2], cell[3]].map(|c| c / cell[4])
        } else {
            fill
        };
        Rgba(color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
    });

    if side == size {
        low
    } else {
        image::imageops::resize(&low, size, size, FilterType::Triangle)
    }
}

// ============================================================================
// Binary layout
// ============================================================================

#[derive(Default)]
struct BinBuilder {
    data: Vec<u8>,
    views: Vec<Value>,
}

impl BinBuilder {
    /// Append a 4-byte aligned buffer view, returning its index.
    fn push(&mut self, bytes: Vec<u8>, target: Option<u32>) -> usize {
        pad_to_four(&mut self.data, 0);
        let mut view = json!({
            "buffer": 0,
            "byteOffset": self.data.len(),
            "byteLength": bytes.len(),
        });
        if let Some(target) = target {
            view["target"] = json!(target);
        }
        self.data.extend_from_slice(&bytes);
        self.views.push(view);
        self.views.len() - 1
    }
}

fn pad_to_four(buf: &mut Vec<u8>, fill: u8) {
    while buf.len() % 4 != 0 {
        buf.push(fill);
    }
}

fn bytes_of_vec3(values: &[[f32; 3]]) -> Vec<u8> {
    values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_of_vec2(values: &[[f32; 2]]) -> Vec<u8> {
    values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_of_u32(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn encode_glb(mut json: Vec<u8>, mut bin: Vec<u8>) -> Vec<u8> {
    pad_to_four(&mut json, b' ');
    pad_to_four(&mut bin, 0);
    let total = 12 + 8 + json.len() + 8 + bin.len();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(GLB_MAGIC);
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());

    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json);

    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::hardware::DeviceKind;
    use crate::pipeline::{ModelPipeline, Representation};
    use crate::preview::PreviewPipeline;
    use crate::testing::{solid_image, unit_triangle};

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn json_chunk(bytes: &[u8]) -> Value {
        let len = u32_at(bytes, 12) as usize;
        assert_eq!(u32_at(bytes, 16), CHUNK_JSON);
        serde_json::from_slice(&bytes[20..20 + len]).expect("valid json chunk")
    }

    fn preview_outputs(side: u32) -> Representations {
        PreviewPipeline::new(DeviceKind::Cpu)
            .with_resolution(side)
            .run(
                &solid_image(side, side),
                1,
                &[OutputFormat::Gaussian, OutputFormat::Mesh],
            )
            .unwrap()
    }

    fn export(outputs: &Representations, simplify: f32, texture: u32) -> Vec<u8> {
        let scene = GlbExporter.to_artifact(outputs, simplify, texture).unwrap();
        let mut buf = Vec::new();
        scene.export(&mut buf, ArtifactKind::Glb).unwrap();
        buf
    }

    #[test]
    fn test_glb_header_and_chunks() {
        let bytes = export(&preview_outputs(8), 0.0, 16);
        assert_eq!(&bytes[0..4], GLB_MAGIC);
        assert_eq!(u32_at(&bytes, 4), 2);
        assert_eq!(u32_at(&bytes, 8) as usize, bytes.len());
        assert_eq!(bytes.len() % 4, 0);

        let json_len = u32_at(&bytes, 12) as usize;
        let bin_header = 20 + json_len;
        assert_eq!(u32_at(&bytes, bin_header + 4), CHUNK_BIN);
        assert_eq!(bin_header + 8 + u32_at(&bytes, bin_header) as usize, bytes.len());
    }

    #[test]
    fn test_json_describes_mesh() {
        let bytes = export(&preview_outputs(8), 0.0, 16);
        let doc = json_chunk(&bytes);
        assert_eq!(doc["asset"]["version"], "2.0");
        assert_eq!(doc["accessors"][0]["count"], 64);
        assert_eq!(doc["accessors"][2]["count"], 7 * 7 * 6);
        assert_eq!(doc["images"][0]["mimeType"], "image/png");
    }

    #[test]
    fn test_embedded_texture_has_requested_size() {
        let bytes = export(&preview_outputs(8), 0.0, 32);
        let doc = json_chunk(&bytes);
        let view = &doc["bufferViews"][doc["images"][0]["bufferView"].as_u64().unwrap() as usize];
        let json_len = u32_at(&bytes, 12) as usize;
        let bin_start = 20 + json_len + 8;
        let offset = bin_start + view["byteOffset"].as_u64().unwrap() as usize;
        let len = view["byteLength"].as_u64().unwrap() as usize;
        let png = image::load_from_memory(&bytes[offset..offset + len]).expect("png decodes");
        assert_eq!((png.width(), png.height()), (32, 32));
    }

    #[test]
    fn test_simplify_reduces_triangles() {
        let outputs = preview_outputs(32);
        let full = GlbExporter.build(&outputs, 0.0, 8).unwrap();
        let reduced = GlbExporter.build(&outputs, 0.9, 8).unwrap();
        assert_eq!(full.vertex_count(), 32 * 32);
        assert!(reduced.vertex_count() < full.vertex_count() / 2);
        assert!(reduced.triangle_count() > 0);
        assert!(reduced.triangle_count() < full.triangle_count());
    }

    #[test]
    fn test_mesh_without_points_uses_vertex_colors() {
        let mut outputs = Representations::new();
        outputs.insert(OutputFormat::Mesh, Representation::Mesh(unit_triangle()));
        let scene = GlbExporter.build(&outputs, 0.95, 4).unwrap();
        assert_eq!(scene.triangle_count(), 1);
    }

    #[test]
    fn test_missing_mesh_rejected() {
        let err = GlbExporter.build(&Representations::new(), 0.5, 4).unwrap_err();
        assert!(err.to_string().contains("mesh output is required"));
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let mut mesh = unit_triangle();
        mesh.indices = vec![0, 1, 9];
        let mut outputs = Representations::new();
        outputs.insert(OutputFormat::Mesh, Representation::Mesh(mesh));
        assert!(GlbExporter.build(&outputs, 0.0, 4).is_err());
    }
}
