//! Decoded upload image

use crate::error::JobError;
use image::DynamicImage;

/// A decoded raster image of any size and colour mode.
///
/// Created per request from the uploaded bytes and moved into the job that
/// consumes it.
#[derive(Debug, Clone)]
pub struct ImageInput {
    image: DynamicImage,
}

impl ImageInput {
    /// Decode PNG, JPEG, WebP or BMP bytes, guessing the format from content.
    pub fn decode(bytes: &[u8]) -> Result<Self, JobError> {
        if bytes.is_empty() {
            return Err(JobError::Decode("upload is empty".into()));
        }
        let image = image::load_from_memory(bytes).map_err(|e| JobError::Decode(e.to_string()))?;
        Ok(Self { image })
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }
}
