//! Bundled model asset access
//!
//! Model files ship in a read-only bundle directory and are copied once into
//! a writable files directory that the inference runtimes can open by path.
//! A request for an asset that already exists in the files directory is a
//! no-op: no re-copy and no integrity check.

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
};
use log::{debug, info};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Environment variable overriding the files directory
pub const CACHE_DIR_ENV: &str = "BGREMOVE_LITE_CACHE_DIR";

/// Bundle directory used when the configuration does not name one
pub const DEFAULT_BUNDLE_DIR: &str = "assets";

const COPY_BUFFER_SIZE: usize = 4 * 1024;

/// Copies bundled assets to a filesystem location on first request
#[derive(Debug)]
pub struct ModelAssets {
    bundle_dir: PathBuf,
    files_dir: PathBuf,
    copy_lock: Mutex<()>,
}

impl ModelAssets {
    #[must_use]
    pub fn new<B: Into<PathBuf>, F: Into<PathBuf>>(bundle_dir: B, files_dir: F) -> Self {
        Self {
            bundle_dir: bundle_dir.into(),
            files_dir: files_dir.into(),
            copy_lock: Mutex::new(()),
        }
    }

    /// Build from configuration, falling back to the platform cache directory
    pub fn from_config(config: &RemovalConfig) -> Result<Self> {
        let bundle_dir = config
            .bundle_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUNDLE_DIR));
        let files_dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => Self::default_files_dir()?,
        };
        Ok(Self::new(bundle_dir, files_dir))
    }

    /// XDG-compliant files directory
    ///
    /// - Linux/macOS: `~/.cache/bgremove-lite/models/`
    /// - Windows: `%LOCALAPPDATA%/bgremove-lite/models/`
    pub fn default_files_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join("bgremove-lite")
            .join("models"))
    }

    #[must_use]
    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    #[must_use]
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    /// Filesystem path of `name`, copying it out of the bundle if needed
    ///
    /// # Errors
    /// - `InvalidInput` for names that are empty or not a plain file name
    /// - `ModelLoad` if the bundle does not contain the asset
    /// - `Io` if the copy fails
    pub fn asset_file_path(&self, name: &str) -> Result<PathBuf> {
        Self::validate_asset_name(name)?;
        let target = self.files_dir.join(name);

        // Copies of the same asset must not interleave
        let _guard = self
            .copy_lock
            .lock()
            .map_err(|_| BgRemovalError::internal("Asset copy lock poisoned"))?;

        if target.exists() {
            debug!("Asset '{}' already present at {}", name, target.display());
            return Ok(target);
        }

        let source = self.bundle_dir.join(name);
        if !source.is_file() {
            return Err(BgRemovalError::model_load(format!(
                "Asset '{}' not found in bundle directory {}",
                name,
                self.bundle_dir.display()
            )));
        }

        fs::create_dir_all(&self.files_dir).map_err(|e| {
            BgRemovalError::file_io_error("create asset directory", &self.files_dir, &e)
        })?;

        let partial = self.files_dir.join(format!("{name}.partial"));
        let copied = Self::copy_file(&source, &partial)?;
        fs::rename(&partial, &target)
            .map_err(|e| BgRemovalError::file_io_error("finalize asset", &target, &e))?;

        info!(
            "Copied asset '{}' ({} bytes) to {}",
            name,
            copied,
            target.display()
        );
        Ok(target)
    }

    fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
        let input = fs::File::open(source)
            .map_err(|e| BgRemovalError::file_io_error("open bundled asset", source, &e))?;
        let output = fs::File::create(destination)
            .map_err(|e| BgRemovalError::file_io_error("create asset file", destination, &e))?;

        let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, input);
        let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, output);
        let copied = std::io::copy(&mut reader, &mut writer)
            .map_err(|e| BgRemovalError::file_io_error("copy asset", destination, &e))?;
        writer
            .flush()
            .map_err(|e| BgRemovalError::file_io_error("flush asset", destination, &e))?;
        Ok(copied)
    }

    fn validate_asset_name(name: &str) -> Result<()> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(BgRemovalError::invalid_input(format!(
                "Asset name '{name}' must be a plain file name"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bundle_with(name: &str, contents: &[u8]) -> TempDir {
        let bundle = TempDir::new().unwrap();
        fs::write(bundle.path().join(name), contents).unwrap();
        bundle
    }

    #[test]
    fn test_copies_asset_on_first_request() {
        let bundle = bundle_with("model.onnx", b"weights");
        let files = TempDir::new().unwrap();
        let assets = ModelAssets::new(bundle.path(), files.path().join("models"));

        let path = assets.asset_file_path("model.onnx").unwrap();
        assert_eq!(path, files.path().join("models").join("model.onnx"));
        assert_eq!(fs::read(&path).unwrap(), b"weights");
        assert!(!files.path().join("models").join("model.onnx.partial").exists());
    }

    #[test]
    fn test_second_request_does_not_recopy() {
        let bundle = bundle_with("model.onnx", b"v1");
        let files = TempDir::new().unwrap();
        let assets = ModelAssets::new(bundle.path(), files.path());

        let first = assets.asset_file_path("model.onnx").unwrap();
        fs::write(bundle.path().join("model.onnx"), b"v2").unwrap();
        let second = assets.asset_file_path("model.onnx").unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(&second).unwrap(), b"v1");
    }

    #[test]
    fn test_existing_file_is_trusted() {
        let bundle = TempDir::new().unwrap();
        let files = TempDir::new().unwrap();
        fs::write(files.path().join("model.pt"), b"already here").unwrap();
        let assets = ModelAssets::new(bundle.path(), files.path());

        let path = assets.asset_file_path("model.pt").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"already here");
    }

    #[test]
    fn test_missing_asset_is_model_load_error() {
        let bundle = TempDir::new().unwrap();
        let files = TempDir::new().unwrap();
        let assets = ModelAssets::new(bundle.path(), files.path());

        let err = assets.asset_file_path("model.onnx").unwrap_err();
        assert!(matches!(err, BgRemovalError::ModelLoad(_)));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let bundle = TempDir::new().unwrap();
        let assets = ModelAssets::new(bundle.path(), bundle.path());
        for name in ["", "../model.onnx", "nested/model.onnx", "/abs/model.onnx"] {
            let err = assets.asset_file_path(name).unwrap_err();
            assert!(matches!(err, BgRemovalError::InvalidInput(_)), "{name}");
        }
    }

    #[test]
    fn test_from_config_uses_explicit_dirs() {
        let config = RemovalConfig::builder()
            .bundle_dir("/bundle")
            .cache_dir("/files")
            .build()
            .unwrap();
        let assets = ModelAssets::from_config(&config).unwrap();
        assert_eq!(assets.bundle_dir(), Path::new("/bundle"));
        assert_eq!(assets.files_dir(), Path::new("/files"));
    }
}
