//! Core types shared by the pipeline stages

use crate::error::{BgRemovalError, Result};
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// Whether a mask carries continuous confidence or strict two-level values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskKind {
    /// 0-255 foreground confidence
    Grayscale,
    /// Exactly `MASK_BACKGROUND` or `MASK_FOREGROUND`
    Binary,
}

/// Binary mask value for background pixels
pub const MASK_BACKGROUND: u8 = 0;
/// Binary mask value for foreground pixels
pub const MASK_FOREGROUND: u8 = 255;

/// Single-channel segmentation mask, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// Mask data as intensity values (0-255)
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),

    /// Grayscale or binary
    pub kind: MaskKind,
}

impl SegmentationMask {
    /// Create a new mask, checking that the buffer matches the dimensions
    pub fn new(data: Vec<u8>, dimensions: (u32, u32), kind: MaskKind) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgRemovalError::postprocess(format!(
                "Mask buffer has {} values, expected {} for {}x{}",
                data.len(),
                expected,
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self {
            data,
            dimensions,
            kind,
        })
    }

    /// Mask filled with a single value
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8, kind: MaskKind) -> Self {
        Self {
            data: vec![value; width as usize * height as usize],
            dimensions: (width, height),
            kind,
        }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &GrayImage, kind: MaskKind) -> Self {
        Self {
            data: image.as_raw().clone(),
            dimensions: image.dimensions(),
            kind,
        }
    }

    /// Convert mask to a grayscale image
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            BgRemovalError::postprocess("Failed to create image from mask data")
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Value at (x, y), None outside the mask
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return None;
        }
        let index = y as usize * self.dimensions.0 as usize + x as usize;
        self.data.get(index).copied()
    }

    /// True when every value is background or foreground
    #[must_use]
    pub fn is_two_level(&self) -> bool {
        self.data
            .iter()
            .all(|&v| v == MASK_BACKGROUND || v == MASK_FOREGROUND)
    }

    /// Fraction of pixels at full foreground
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|&&v| v == MASK_FOREGROUND).count();
        foreground as f32 / self.data.len() as f32
    }
}

/// Per-stage wall clock timings of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub encode_ms: u64,
    pub inference_ms: u64,
    pub decode_ms: u64,
    pub binarize_ms: u64,
    pub composite_ms: u64,
    pub total_ms: u64,
}

/// Everything one pipeline run produces
#[derive(Debug, Clone)]
pub struct RemovalOutput {
    /// Source image with background pixels made fully transparent
    pub image: RgbaImage,
    /// Binary mask at model resolution
    pub mask: SegmentationMask,
    pub timings: ProcessingTimings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_rejects_mismatched_buffer() {
        let err = SegmentationMask::new(vec![0; 3], (2, 2), MaskKind::Grayscale).unwrap_err();
        assert!(matches!(err, BgRemovalError::Postprocess(_)));
    }

    #[test]
    fn test_mask_accessors() {
        let mask = SegmentationMask::new(vec![0, 255, 10, 255], (2, 2), MaskKind::Grayscale)
            .unwrap();
        assert_eq!(mask.get(1, 0), Some(255));
        assert_eq!(mask.get(0, 1), Some(10));
        assert_eq!(mask.get(2, 0), None);
        assert!(!mask.is_two_level());
        assert!((mask.foreground_ratio() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mask_image_conversion() {
        let mask = SegmentationMask::filled(3, 2, MASK_FOREGROUND, MaskKind::Binary);
        let image = mask.to_image().unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        let back = SegmentationMask::from_image(&image, MaskKind::Binary);
        assert_eq!(back, mask);
        assert!(back.is_two_level());
    }
}
