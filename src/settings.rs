//! Configuration and settings management

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::imaging::{CompressionLevel, TargetFormat};

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub convert: ConvertSettings,
    #[serde(default)]
    pub resize: ResizeSettings,
    #[serde(default)]
    pub compress: CompressSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConvertSettings {
    #[serde(default = "default_format")]
    pub default_format: TargetFormat,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ResizeSettings {
    #[serde(default = "default_true")]
    pub maintain_aspect_ratio: bool,
    #[serde(default = "default_percentage")]
    pub default_percentage: u32,
}

impl Default for ResizeSettings {
    fn default() -> Self {
        Self {
            maintain_aspect_ratio: true,
            default_percentage: default_percentage(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct CompressSettings {
    #[serde(default)]
    pub level: CompressionLevel,
}

fn default_format() -> TargetFormat {
    TargetFormat::Png
}

fn default_true() -> bool {
    true
}

fn default_percentage() -> u32 {
    100
}

impl Settings {
    /// Load settings from a file, or return defaults if file doesn't exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))?;

        Ok(settings)
    }

    pub fn default_path() -> PathBuf {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sill-image-helper")
            .join("settings.toml")
    }
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.convert.default_format, TargetFormat::Png);
        assert!(settings.resize.maintain_aspect_ratio);
        assert_eq!(settings.resize.default_percentage, 100);
        assert_eq!(settings.compress.level, CompressionLevel::Best);
    }

    #[test]
    fn test_load_full_file() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.toml");
        std::fs::write(
            &settings_path,
            "[convert]\ndefault_format = \"webp\"\n\n\
             [resize]\nmaintain_aspect_ratio = false\ndefault_percentage = 50\n\n\
             [compress]\nlevel = \"fast\"\n",
        )
        .unwrap();

        let loaded = Settings::load(&settings_path).unwrap();
        assert_eq!(loaded.convert.default_format, TargetFormat::WebP);
        assert!(!loaded.resize.maintain_aspect_ratio);
        assert_eq!(loaded.resize.default_percentage, 50);
        assert_eq!(loaded.compress.level, CompressionLevel::Fast);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load(temp_dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.toml");
        std::fs::write(&settings_path, "[convert]\ndefault_format = \"jpeg\"\n").unwrap();

        let settings = Settings::load(&settings_path).unwrap();
        assert_eq!(settings.convert.default_format, TargetFormat::Jpeg);
        assert_eq!(settings.resize, ResizeSettings::default());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.toml");
        std::fs::write(&settings_path, "[convert]\ndefault_format = \"eps\"\n").unwrap();
        assert!(Settings::load(&settings_path).is_err());
    }
}
