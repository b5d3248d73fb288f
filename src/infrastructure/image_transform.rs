//! Image decode, bound, sharpen and re-encode
//!
//! Every stored image is a JPEG whose longer edge does not exceed the
//! configured bound. Images already within the bound are never upscaled.

use image::{DynamicImage, GenericImageView, codecs::jpeg::JpegEncoder, imageops::FilterType};

use crate::infrastructure::config::EnrichmentConfig;
use crate::infrastructure::harvest_error::EnrichmentError;

/// Extension of every stored image
pub const STORED_IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, PartialEq)]
pub struct ImageTransformer {
    max_dimension: u32,
    quality: u8,
    sharpen: Option<(f32, i32)>,
}

impl ImageTransformer {
    #[must_use]
    pub fn new(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            quality: quality.clamp(1, 100),
            sharpen: None,
        }
    }

    #[must_use]
    pub fn from_config(config: &EnrichmentConfig) -> Self {
        let transformer = Self::new(config.max_dimension, config.jpeg_quality);
        if config.sharpen {
            transformer.with_sharpen(config.sharpen_sigma, config.sharpen_threshold)
        } else {
            transformer
        }
    }

    #[must_use]
    pub const fn with_sharpen(mut self, sigma: f32, threshold: i32) -> Self {
        self.sharpen = Some((sigma, threshold));
        self
    }

    /// Decodes `bytes`, fits them within the bound and encodes a JPEG.
    ///
    /// `source` only labels errors.
    pub fn transform(&self, source: &str, bytes: &[u8]) -> Result<Vec<u8>, EnrichmentError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| EnrichmentError::decode(source, e))?;

        let (width, height) = decoded.dimensions();
        let (target_width, target_height) = fit_within(width, height, self.max_dimension);
        let mut output = if (target_width, target_height) == (width, height) {
            decoded
        } else {
            decoded.resize_exact(target_width, target_height, FilterType::Lanczos3)
        };

        if let Some((sigma, threshold)) = self.sharpen {
            output = output.unsharpen(sigma, threshold);
        }

        self.encode_jpeg(&output)
    }

    fn encode_jpeg(&self, image: &DynamicImage) -> Result<Vec<u8>, EnrichmentError> {
        // JPEG has no alpha channel
        let rgb = image.to_rgb8();
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.quality)
            .encode_image(&rgb)
            .map_err(|e| EnrichmentError::Encode {
                reason: e.to_string(),
            })?;
        Ok(encoded)
    }
}

/// Largest size within `max_edge` on both axes that keeps the aspect ratio.
/// Never upscales; never returns a zero dimension.
#[must_use]
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let max_edge = max_edge.max(1);
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }

    let (w, h, max) = (u64::from(width), u64::from(height), u64::from(max_edge));
    let (target_w, target_h) = if w >= h {
        (max, (h * max + w / 2) / w)
    } else {
        ((w * max + h / 2) / h, max)
    };

    (
        u32::try_from(target_w.max(1)).unwrap_or(max_edge),
        u32::try_from(target_h.max(1)).unwrap_or(max_edge),
    )
}
