//! Settings loaded from TOML
//!
//! Defaults are compiled in from `config/fatura.toml`. An override file,
//! given explicitly or found at `<data_local_dir>/fatura/config/fatura.toml`,
//! replaces any keys it sets.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Default configuration embedded at compile time
const DEFAULT_CONFIG: &str = include_str!("../../../config/fatura.toml");

/// Import limits and batching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub max_upload_bytes: u64,
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
}

/// Cycle generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    pub months_ahead: u32,
}

/// Blob storage location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// `None` means the platform default
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub import: ImportSettings,
    pub cycles: CycleSettings,
    pub storage: StorageSettings,
    /// Override file actually read, if any
    pub source: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            import: ImportSettings {
                batch_size: 50,
                max_upload_bytes: 10 * 1024 * 1024,
                allowed_extensions: ["ofx", "qfx", "csv", "txt"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            cycles: CycleSettings { months_ahead: 3 },
            storage: StorageSettings { dir: None },
            source: None,
        }
    }
}

impl Settings {
    /// Load the embedded defaults plus the override file, if present
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();
        apply(&mut settings, DEFAULT_CONFIG)?;

        let path = match override_path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        if let Some(path) = path.filter(|p| p.exists()) {
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::Configuration(format!("Failed to read config {}: {}", path.display(), e))
            })?;
            apply(&mut settings, &content)?;
            debug!("Loaded settings override from {}", path.display());
            settings.source = Some(path);
        }

        Ok(settings)
    }

    /// Parse settings from TOML on top of the built-in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut settings = Self::default();
        apply(&mut settings, content)?;
        Ok(settings)
    }

    /// Where uploaded statements are kept
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|d| d.join("fatura").join("imports"))
            .ok_or_else(|| Error::Configuration("no platform data directory available".into()))
    }
}

impl ImportSettings {
    /// Enforce the upload size and extension limits before a file is stored
    pub fn validate_upload(&self, filename: &str, size: u64) -> Result<()> {
        if size > self.max_upload_bytes {
            return Err(Error::InvalidData(format!(
                "{} is {} bytes, larger than the {} byte limit",
                filename, size, self.max_upload_bytes
            )));
        }

        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !self.allowed_extensions.iter().any(|a| *a == ext) {
            return Err(Error::InvalidData(format!(
                "{} has an unsupported extension (allowed: {})",
                filename,
                self.allowed_extensions.join(", ")
            )));
        }

        Ok(())
    }
}

/// Default override location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("fatura").join("config").join("fatura.toml"))
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    import: Option<RawImport>,
    cycles: Option<RawCycles>,
    storage: Option<RawStorage>,
}

#[derive(Debug, Deserialize)]
struct RawImport {
    batch_size: Option<usize>,
    max_upload_bytes: Option<u64>,
    allowed_extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawCycles {
    months_ahead: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawStorage {
    dir: Option<String>,
}

fn apply(settings: &mut Settings, content: &str) -> Result<()> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Configuration(format!("Invalid config TOML: {}", e)))?;

    if let Some(import) = raw.import {
        if let Some(size) = import.batch_size {
            if size == 0 {
                return Err(Error::Configuration("import.batch_size must be at least 1".into()));
            }
            settings.import.batch_size = size;
        }
        if let Some(max) = import.max_upload_bytes {
            settings.import.max_upload_bytes = max;
        }
        if let Some(exts) = import.allowed_extensions {
            settings.import.allowed_extensions = exts
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect();
        }
    }

    if let Some(cycles) = raw.cycles {
        if let Some(months) = cycles.months_ahead {
            settings.cycles.months_ahead = months;
        }
    }

    if let Some(storage) = raw.storage {
        if let Some(dir) = storage.dir {
            settings.storage.dir = if dir.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let settings = Settings::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(settings.import.batch_size, 50);
        assert_eq!(settings.import.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.import.allowed_extensions, vec!["ofx", "qfx", "csv", "txt"]);
        assert_eq!(settings.cycles.months_ahead, 3);
        assert_eq!(settings.storage.dir, None);
    }

    #[test]
    fn test_override_file_replaces_only_given_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fatura.toml");
        fs::write(&path, "[import]\nbatch_size = 10\n\n[storage]\ndir = \"/var/fatura\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.import.batch_size, 10);
        assert_eq!(settings.import.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.storage_dir().unwrap(), PathBuf::from("/var/fatura"));
        assert_eq!(settings.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        assert!(matches!(
            Settings::from_toml("[import\nbatch_size = "),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Settings::from_toml("[import]\nbatch_size = 0\n"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_upload() {
        let settings = Settings::default();
        assert!(settings.import.validate_upload("extrato.OFX", 1024).is_ok());
        assert!(settings.import.validate_upload("fatura.csv", 0).is_ok());
        assert!(settings.import.validate_upload("virus.exe", 10).is_err());
        assert!(settings.import.validate_upload("noext", 10).is_err());
        assert!(settings
            .import
            .validate_upload("big.csv", 10 * 1024 * 1024 + 1)
            .is_err());
    }
}
