//! Opaque, cheaply cloned handle to a rendered image.

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use std::sync::Arc;

use ecv_common::{EngineError, EngineResult};

/// Shared RGBA image. Clones share the pixel buffer.
#[derive(Debug, Clone)]
pub struct ImageHandle(Arc<RgbaImage>);

impl ImageHandle {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    /// Wrap raw RGBA bytes; the length must be `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> EngineResult<Self> {
        let expected = width as usize * height as usize * 4;
        let actual = pixels.len();
        RgbaImage::from_raw(width, height, pixels)
            .map(Self::new)
            .ok_or_else(|| {
                EngineError::shape_mismatch(format!(
                    "RGBA buffer of {} bytes for {}x{} image (expected {})",
                    actual, width, height, expected
                ))
            })
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    /// Raw RGBA bytes, row-major from the top-left pixel.
    pub fn pixels(&self) -> &[u8] {
        self.0.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.0.get_pixel(x, y).0
    }

    /// True if both handles share one buffer.
    pub fn ptr_eq(&self, other: &ImageHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> EngineResult<Vec<u8>> {
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(self.pixels(), self.width(), self.height(), ColorType::Rgba8)
            .map_err(|e| EngineError::decode(format!("PNG encoding failed: {}", e)))?;
        Ok(png)
    }
}

impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}
