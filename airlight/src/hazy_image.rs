//! RGB image container and file decoding.

use std::path::Path;

use crate::error::{Error, Result};

/// An RGB image with interleaved `f32` channels, nominally in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbImage {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
}

impl RgbImage {
    /// Wrap interleaved RGB pixels. `pixels.len()` must be `width * height * 3`.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self> {
        if pixels.len() != width * height * 3 {
            return Err(Error::PixelBufferSize {
                width,
                height,
                expected: width * height * 3,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub(crate) fn from_raw_parts(width: usize, height: usize, pixels: Vec<f32>) -> Self {
        debug_assert_eq!(pixels.len(), width * height * 3);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// An image where every pixel has the same color.
    pub fn filled(width: usize, height: usize, color: [f32; 3]) -> Self {
        let pixels = std::iter::repeat_n(color, width * height)
            .flatten()
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Decode an image file (PNG, JPEG, TIFF) into normalized RGB.
    ///
    /// Integer formats are scaled to `[0, 1]`; alpha is dropped.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|source| Error::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let rgb = decoded.to_rgb32f();
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);

        tracing::debug!(path = %path.display(), width, height, "Decoded image");

        Ok(Self {
            width,
            height,
            pixels: rgb.into_raw(),
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Pixel at column `x`, row `y`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [f32; 3] {
        debug_assert!(x < self.width && y < self.height);
        let idx = (y * self.width + x) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// One full row as interleaved RGB.
    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        let stride = self.width * 3;
        &self.pixels[y * stride..(y + 1) * stride]
    }
}
