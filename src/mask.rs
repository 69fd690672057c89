//! Mask binarization and two-level-preserving resize

use crate::{
    error::{BgRemovalError, Result},
    types::{MaskKind, SegmentationMask, MASK_BACKGROUND, MASK_FOREGROUND},
};
use image::imageops::FilterType;

/// Thresholds grayscale masks into strict foreground/background masks
///
/// A pixel is foreground when its value is strictly greater than the
/// threshold. The default threshold of 0 treats any non-zero confidence
/// as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaskBinarizer {
    threshold: u8,
}

impl MaskBinarizer {
    #[must_use]
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Produce a binary mask with the same dimensions as `mask`
    #[must_use]
    pub fn binarize(&self, mask: &SegmentationMask) -> SegmentationMask {
        let data = mask
            .data
            .iter()
            .map(|&v| {
                if v > self.threshold {
                    MASK_FOREGROUND
                } else {
                    MASK_BACKGROUND
                }
            })
            .collect();

        SegmentationMask {
            data,
            dimensions: mask.dimensions,
            kind: MaskKind::Binary,
        }
    }
}

/// Resize a binary mask with nearest-neighbour sampling
///
/// Nearest-neighbour never blends, so the result stays two-level.
///
/// # Errors
/// - `Postprocess` if the mask is not binary or its buffer is inconsistent
/// - `InvalidInput` if the target size is zero
pub fn resize_binary(mask: &SegmentationMask, width: u32, height: u32) -> Result<SegmentationMask> {
    if mask.kind != MaskKind::Binary {
        return Err(BgRemovalError::postprocess(
            "Only binary masks can be resized for compositing",
        ));
    }
    if width == 0 || height == 0 {
        return Err(BgRemovalError::invalid_input(format!(
            "Cannot resize mask to {}x{}",
            width, height
        )));
    }
    if mask.dimensions == (width, height) {
        return Ok(mask.clone());
    }

    let image = mask.to_image()?;
    let resized = image::imageops::resize(&image, width, height, FilterType::Nearest);
    Ok(SegmentationMask::from_image(&resized, MaskKind::Binary))
}
