//! Shape and dimension validation shared by the codec and compositor

use crate::error::{BgRemovalError, Result};

/// Validator for image dimensions and tensor lengths
pub struct ImageValidator;

impl ImageValidator {
    /// Reject images with no pixels; any non-zero size is accepted
    pub fn validate_image_dimensions(width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_input(format!(
                "Image must have non-zero dimensions, got {}x{}",
                width, height
            )));
        }
        Ok(())
    }

    /// Validate target (model) dimensions
    pub fn validate_target_dimensions(width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_config(format!(
                "Target size must be non-zero, got {}x{}",
                width, height
            )));
        }
        Ok(())
    }

    /// Check that a flat buffer holds enough values for `width * height` reads
    ///
    /// Returns the first index that would fall outside the buffer as an
    /// `OutOfBounds` error.
    pub fn validate_buffer_len(buffer_len: usize, width: u32, height: u32) -> Result<()> {
        let required = width as usize * height as usize;
        if required > buffer_len {
            return Err(BgRemovalError::out_of_bounds(buffer_len, buffer_len));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_dimensions() {
        assert!(ImageValidator::validate_image_dimensions(1, 1).is_ok());
        assert!(ImageValidator::validate_image_dimensions(0, 10).is_err());
        assert!(ImageValidator::validate_image_dimensions(10, 0).is_err());
        assert!(ImageValidator::validate_image_dimensions(20000, 10).is_ok());
        assert!(ImageValidator::validate_image_dimensions(1, u32::MAX).is_ok());
    }

    #[test]
    fn test_buffer_len() {
        assert!(ImageValidator::validate_buffer_len(4, 2, 2).is_ok());
        assert!(ImageValidator::validate_buffer_len(10, 2, 2).is_ok());
        let err = ImageValidator::validate_buffer_len(3, 2, 2).unwrap_err();
        assert!(matches!(
            err,
            BgRemovalError::OutOfBounds { index: 3, len: 3 }
        ));
    }
}
