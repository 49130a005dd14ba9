//! Bitmap binarization
//!
//! Thresholds a grayscale bitmap into a per-pixel engrave/skip mask.
//! Dark pixels are material to burn: a pixel is "engrave" iff its sample
//! is below the threshold (inverted when `invert` is set).

use crate::error::{CamToolError, CamToolResult};
use image::GrayImage;
use std::path::Path;

/// Default binarization threshold (samples below this are engraved)
pub const DEFAULT_THRESHOLD: u8 = 127;

/// A per-pixel engrave/skip classification of a bitmap
///
/// Always has the same dimensions as the bitmap it was derived from and
/// is never mutated after binarization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl BinaryMask {
    /// Create an all-skip mask, for building synthetic masks in tests
    /// and for the degenerate zero-content case.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![false; (width as usize) * (height as usize)],
        }
    }

    /// Mask width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the pixel at `(x, y)` should be engraved
    pub fn is_engrave(&self, x: u32, y: u32) -> bool {
        self.cells[self.index(x, y)]
    }

    /// Mark a single pixel; only used when constructing masks directly
    pub fn set(&mut self, x: u32, y: u32, engrave: bool) {
        let idx = self.index(x, y);
        self.cells[idx] = engrave;
    }

    /// Number of engrave pixels in the mask
    pub fn engrave_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "mask index out of bounds");
        (y as usize) * (self.width as usize) + (x as usize)
    }
}

/// Thresholding binarizer
#[derive(Debug, Clone, Copy)]
pub struct Binarizer {
    threshold: u8,
    invert: bool,
}

impl Default for Binarizer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            invert: false,
        }
    }
}

impl Binarizer {
    /// Create a binarizer with the given threshold
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            invert: false,
        }
    }

    /// Flip the engrave/skip classification (light pixels burn)
    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Threshold a grayscale bitmap into a mask
    ///
    /// # Errors
    /// Fails if the bitmap has zero area.
    pub fn binarize(&self, image: &GrayImage) -> CamToolResult<BinaryMask> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CamToolError::ImageError(format!(
                "image has zero area ({}x{})",
                width, height
            )));
        }

        let mut mask = BinaryMask::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels() {
            let dark = pixel.0[0] < self.threshold;
            mask.set(x, y, dark != self.invert);
        }

        tracing::debug!(
            width,
            height,
            engrave = mask.engrave_count(),
            "binarized bitmap"
        );
        Ok(mask)
    }

    /// Load a bitmap from disk and threshold it
    ///
    /// # Errors
    /// Fails if the file cannot be read or decoded, or has zero area.
    pub fn binarize_file<P: AsRef<Path>>(&self, path: P) -> CamToolResult<BinaryMask> {
        let img = image::open(path.as_ref())
            .map_err(|e| {
                CamToolError::LoadError(format!("{}: {}", path.as_ref().display(), e))
            })?
            .to_luma8();
        self.binarize(&img)
    }
}
