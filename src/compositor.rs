//! Mask-guided compositing onto a transparent background

use crate::{
    error::{BgRemovalError, Result},
    mask::resize_binary,
    types::{MaskKind, SegmentationMask, MASK_FOREGROUND},
    utils::ImageValidator,
};
use image::{Rgba, RgbaImage};

/// Fully transparent output pixel
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Merges a binary mask with the original image
pub struct Compositor;

impl Compositor {
    /// Keep foreground pixels unchanged and clear everything else
    ///
    /// The mask is resized to the image's dimensions with nearest-neighbour
    /// sampling first. Foreground pixels are copied verbatim, including their
    /// original alpha; background pixels become `TRANSPARENT`.
    ///
    /// # Errors
    /// - `InvalidInput` if the image is empty
    /// - `Postprocess` if the mask is not binary
    pub fn merge(original: &RgbaImage, mask: &SegmentationMask) -> Result<RgbaImage> {
        let (width, height) = original.dimensions();
        ImageValidator::validate_image_dimensions(width, height)?;
        if mask.kind != MaskKind::Binary {
            return Err(BgRemovalError::postprocess(
                "Compositing requires a binary mask",
            ));
        }

        let resized = resize_binary(mask, width, height)?;

        let mut result = RgbaImage::new(width, height);
        for (x, y, pixel) in original.enumerate_pixels() {
            let keep = resized.get(x, y) == Some(MASK_FOREGROUND);
            result.put_pixel(x, y, if keep { *pixel } else { TRANSPARENT });
        }

        Ok(result)
    }
}
