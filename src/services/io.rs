//! Image file input/output
//!
//! Kept apart from the pipeline so the transforms stay pure and testable.

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content-based format detection when the extension is
    /// missing or wrong.
    ///
    /// ```rust,no_run
    /// use bgremove_lite::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(BgRemovalError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref).map_err(|io_err| {
                    BgRemovalError::file_io_error("read image data", path_ref, &io_err)
                })?;
                Self::load_from_bytes(&data)
            },
        }
    }

    /// Decode an image from raw bytes
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| {
            BgRemovalError::invalid_input(format!("Failed to decode image from bytes: {e}"))
        })
    }

    /// Save an RGBA image as PNG, creating parent directories
    pub fn save_png<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgRemovalError::file_io_error("create output directory", parent, &e)
            })?;
        }

        image.save_with_format(path_ref, image::ImageFormat::Png)?;
        log::debug!("Saved {}x{} PNG to {}", image.width(), image.height(), path_ref.display());
        Ok(())
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "tif" | "tiff"))
    }

    /// `<dir>/<stem>_nobg.png` next to the input
    #[must_use]
    pub fn default_output_path<P: AsRef<Path>>(input: P) -> PathBuf {
        let input = input.as_ref();
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        input.with_file_name(format!("{stem}_nobg.png"))
    }
}
