use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::format::CompressionFormat;
use crate::{HeifkitError, HeifkitResult};

/// Where to find libheif.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LibraryConfig {
    /// Explicit path to the shared library. When unset the platform's
    /// default library names are tried in order.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub format: CompressionFormat,
    /// 0..=100 for lossy, -1 for lossless, unset keeps the plugin default.
    pub quality: Option<i32>,
    /// Plugin-specific parameters passed through verbatim (e.g. `preset = "slow"`).
    pub params: BTreeMap<String, String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            format: CompressionFormat::Hevc,
            quality: None,
            params: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String, // used when RUST_LOG is unset
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HeifkitConfig {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HeifkitConfig {
    pub fn load_from_file(path: &Path) -> HeifkitResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> HeifkitResult<Self> {
        toml::from_str(contents).map_err(|e| HeifkitError::Config(e.to_string()))
    }

    pub fn save_to_file(&self, path: &Path) -> HeifkitResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| HeifkitError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = HeifkitConfig::from_toml("").unwrap();
        assert!(config.library.path.is_none());
        assert_eq!(config.encoder.format, CompressionFormat::Hevc);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = HeifkitConfig::from_toml(
            r#"
            [library]
            path = "/opt/libheif/lib/libheif.so.1"

            [encoder]
            format = "av1"
            quality = -1

            [encoder.params]
            speed = "6"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.library.path.as_deref(),
            Some(Path::new("/opt/libheif/lib/libheif.so.1"))
        );
        assert_eq!(config.encoder.format, CompressionFormat::Av1);
        assert_eq!(config.encoder.quality, Some(-1));
        assert_eq!(config.encoder.params.get("speed").map(String::as_str), Some("6"));
    }

    #[test]
    fn test_unknown_format_is_config_error() {
        let err = HeifkitConfig::from_toml("[encoder]\nformat = \"webp\"\n").unwrap_err();
        assert!(matches!(err, HeifkitError::Config(_)));
    }

    #[test]
    fn test_save_and_load() {
        let mut config = HeifkitConfig::default();
        config.encoder.quality = Some(80);
        config.logging.level = "debug".into();

        let path = std::env::temp_dir().join(format!(
            "heifkit_test_config_{}.toml",
            std::process::id()
        ));
        config.save_to_file(&path).unwrap();
        let loaded = HeifkitConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.encoder.quality, Some(80));
        assert_eq!(loaded.logging.level, "debug");

        let _ = std::fs::remove_file(&path);
    }
}
