//! Tensor codec: image to model input tensor, model output to grayscale mask
//!
//! Input tensors are NCHW with a single batch and channel-planar layout: all
//! red values, then all green, then all blue, each plane row-major. Output
//! buffers are read as one row-major plane of foreground probabilities.

use crate::{
    config::{ModelGeometry, Normalization, DIM_BATCH_SIZE, DIM_PIXEL_SIZE},
    error::{BgRemovalError, Result},
    types::{MaskKind, SegmentationMask},
    utils::ImageValidator,
};
use image::{imageops::FilterType, RgbaImage};
use ndarray::Array4;
use tracing::trace;

/// Resampling filter used when scaling the source down to model resolution
pub const ENCODE_FILTER: FilterType = FilterType::Triangle;

/// Converts images to input tensors and output tensors to masks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorCodec {
    geometry: ModelGeometry,
    normalization: Normalization,
}

impl TensorCodec {
    #[must_use]
    pub fn new(geometry: ModelGeometry, normalization: Normalization) -> Self {
        Self {
            geometry,
            normalization,
        }
    }

    #[must_use]
    pub fn geometry(&self) -> ModelGeometry {
        self.geometry
    }

    #[must_use]
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Encode at the configured model geometry
    pub fn encode(&self, image: &RgbaImage) -> Result<Array4<f32>> {
        Self::encode_with(
            image,
            self.geometry.width,
            self.geometry.height,
            &self.normalization,
        )
    }

    /// Decode an output buffer laid out at the configured model geometry
    pub fn decode(&self, output: &[f32]) -> Result<SegmentationMask> {
        Self::decode_with(output, self.geometry.width, self.geometry.height)
    }

    /// Resize `image` to `target_width x target_height` and normalize into a
    /// `[1, 3, H, W]` tensor
    ///
    /// Each channel byte is scaled to [0, 1] and normalized as
    /// `(value - mean[c]) / std[c]`, then stored at `c*H*W + y*W + x`.
    /// The alpha channel is ignored.
    ///
    /// # Errors
    /// - `InvalidInput` if the image has zero width or height
    /// - `InvalidConfig` if the target size is zero
    pub fn encode_with(
        image: &RgbaImage,
        target_width: u32,
        target_height: u32,
        normalization: &Normalization,
    ) -> Result<Array4<f32>> {
        let (width, height) = image.dimensions();
        ImageValidator::validate_image_dimensions(width, height)?;
        ImageValidator::validate_target_dimensions(target_width, target_height)?;

        let resized;
        let source = if (width, height) == (target_width, target_height) {
            image
        } else {
            resized = image::imageops::resize(image, target_width, target_height, ENCODE_FILTER);
            &resized
        };

        let plane = target_width as usize * target_height as usize;
        let mut data = vec![0.0_f32; DIM_PIXEL_SIZE * plane];
        let w = target_width as usize;

        for (x, y, pixel) in source.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for c in 0..DIM_PIXEL_SIZE {
                let value = f32::from(pixel.0.get(c).copied().unwrap_or(0)) / 255.0;
                let mean = normalization.mean.get(c).copied().unwrap_or(0.0);
                let std = normalization.std.get(c).copied().unwrap_or(1.0);
                if let Some(slot) = data.get_mut(c * plane + offset) {
                    *slot = (value - mean) / std;
                }
            }
        }

        trace!(
            source_width = width,
            source_height = height,
            target_width,
            target_height,
            "encoded input tensor"
        );

        Array4::from_shape_vec(
            (
                DIM_BATCH_SIZE,
                DIM_PIXEL_SIZE,
                target_height as usize,
                target_width as usize,
            ),
            data,
        )
        .map_err(|e| BgRemovalError::internal(format!("Failed to shape input tensor: {e}")))
    }

    /// Interpret `output` as a row-major `width x height` plane of
    /// probabilities and convert it to a grayscale mask
    ///
    /// Values are scaled by 255, truncated and clamped to [0, 255].
    ///
    /// # Errors
    /// - `OutOfBounds` if the buffer holds fewer than `width * height` values
    pub fn decode_with(output: &[f32], width: u32, height: u32) -> Result<SegmentationMask> {
        ImageValidator::validate_target_dimensions(width, height)?;
        ImageValidator::validate_buffer_len(output.len(), width, height)?;

        let len = width as usize * height as usize;
        let data = output
            .iter()
            .take(len)
            .map(|&v| probability_to_intensity(v))
            .collect();

        SegmentationMask::new(data, (width, height), MaskKind::Grayscale)
    }
}

/// Scale a [0, 1] probability to a byte; NaN maps to 0
fn probability_to_intensity(value: f32) -> u8 {
    ((value * 255.0) as i32).clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    #[test]
    fn test_encode_length_matches_target() {
        let image = solid(37, 11, [10, 20, 30]);
        let tensor =
            TensorCodec::encode_with(&image, 16, 8, &Normalization::centered()).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 8, 16]);
        assert_eq!(tensor.len(), 3 * 16 * 8);
    }

    #[test]
    fn test_encode_channel_planar_layout() {
        // 2x1 image: red pixel then blue pixel, no resize
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        let identity = Normalization {
            mean: [0.0; 3],
            std: [1.0; 3],
        };

        let tensor = TensorCodec::encode_with(&image, 2, 1, &identity).unwrap();
        let flat = tensor.as_slice().unwrap();
        assert_eq!(flat, &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_encode_applies_normalization() {
        let image = solid(4, 4, [255, 0, 51]);
        let tensor =
            TensorCodec::encode_with(&image, 4, 4, &Normalization::centered()).unwrap();
        assert!((tensor[[0, 0, 0, 0]] - 0.5).abs() < 1e-6);
        assert!((tensor[[0, 1, 3, 3]] + 0.5).abs() < 1e-6);
        assert!((tensor[[0, 2, 2, 1]] - (0.2 - 0.5)).abs() < 1e-6);

        let torch = Normalization::torchvision();
        let tensor = TensorCodec::encode_with(&image, 4, 4, &torch).unwrap();
        let expected_red = (1.0 - 0.485) / 0.229;
        assert!((tensor[[0, 0, 1, 1]] - expected_red).abs() < 1e-5);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let mut image = RgbaImage::new(13, 7);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgba([(x * 19) as u8, (y * 31) as u8, ((x + y) * 7) as u8, 255]);
        }
        let codec = TensorCodec::new(ModelGeometry::new(8, 8), Normalization::centered());
        assert_eq!(codec.encode(&image).unwrap(), codec.encode(&image).unwrap());
    }

    #[test]
    fn test_encode_rejects_empty_image() {
        let image = RgbaImage::new(0, 5);
        let err = TensorCodec::encode_with(&image, 4, 4, &Normalization::centered()).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidInput(_)));
    }

    #[test]
    fn test_decode_scales_and_clamps() {
        let output = [0.0, 0.5, 1.0, 1.7, -0.3, f32::NAN];
        let mask = TensorCodec::decode_with(&output, 3, 2).unwrap();
        assert_eq!(mask.kind, MaskKind::Grayscale);
        assert_eq!(mask.data, vec![0, 127, 255, 255, 0, 0]);
    }

    #[test]
    fn test_decode_row_major_indexing() {
        let output = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mask = TensorCodec::decode_with(&output, 3, 2).unwrap();
        assert_eq!(mask.get(1, 0), Some(255));
        assert_eq!(mask.get(2, 1), Some(255));
        assert_eq!(mask.get(0, 1), Some(0));
    }

    #[test]
    fn test_decode_short_buffer_is_out_of_bounds() {
        let output = [1.0; 3];
        let err = TensorCodec::decode_with(&output, 2, 2).unwrap_err();
        assert!(matches!(err, BgRemovalError::OutOfBounds { index: 3, len: 3 }));
    }

    #[test]
    fn test_decode_ignores_trailing_values() {
        let output = [1.0, 1.0, 1.0, 1.0, 0.25];
        let mask = TensorCodec::decode_with(&output, 2, 2).unwrap();
        assert_eq!(mask.data, vec![255; 4]);
    }

    #[test]
    fn test_encode_accepts_very_wide_image() {
        let image = solid(16385, 1, [255, 255, 255]);
        let tensor =
            TensorCodec::encode_with(&image, 4, 4, &Normalization::centered()).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
        assert!(tensor.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }
}
