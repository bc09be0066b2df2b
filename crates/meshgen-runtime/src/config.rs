//! Generation parameters passed to the model and exporter on every job

use serde::{Deserialize, Serialize};

/// Intermediate representation kinds the model can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Coloured point / gaussian-splat cloud, used to bake textures
    Gaussian,
    /// Triangle surface mesh
    Mesh,
    /// Volumetric radiance field
    RadianceField,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Gaussian => write!(f, "gaussian"),
            OutputFormat::Mesh => write!(f, "mesh"),
            OutputFormat::RadianceField => write!(f, "radiance_field"),
        }
    }
}

/// Fixed per-job configuration.
///
/// Built once per job. Every job currently uses [`GenerationParams::default`];
/// the builders exist so per-request overrides can be validated the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling seed handed to the model
    pub seed: u64,
    /// Representations requested from the model
    pub formats: Vec<OutputFormat>,
    /// Fraction of mesh detail removed on export, in `[0, 1]`
    pub simplify: f32,
    /// Side length in pixels of the baked texture
    pub texture_size: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            seed: 1,
            formats: vec![OutputFormat::Gaussian, OutputFormat::Mesh],
            simplify: 0.95,
            texture_size: 1024,
        }
    }
}

impl GenerationParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the requested formats; duplicates are dropped.
    pub fn with_formats(mut self, formats: Vec<OutputFormat>) -> Result<Self, &'static str> {
        if formats.is_empty() {
            return Err("formats must not be empty");
        }
        let mut deduped = formats;
        deduped.sort();
        deduped.dedup();
        self.formats = deduped;
        Ok(self)
    }

    pub fn with_simplify(mut self, ratio: f32) -> Result<Self, &'static str> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err("simplify must be between 0.0 and 1.0");
        }
        self.simplify = ratio;
        Ok(self)
    }

    pub fn with_texture_size(mut self, size: u32) -> Result<Self, &'static str> {
        if size == 0 {
            return Err("texture_size must be > 0");
        }
        self.texture_size = size;
        Ok(self)
    }
}
