//! Configuration management for the guidance pipeline
//!
//! One TOML file holds a section per pipeline stage. Every section is
//! validated before it reaches a component; components refuse invalid
//! sections on their own as well.

use crate::auto_capture::AutoCaptureConfig;
use crate::detection::DetectorConfig;
use crate::errors::GuideError;
use crate::governor::PerformanceConfig;
use crate::quality::QualityConfig;
use crate::roi::RoiConfig;
use crate::validation::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    pub detector: DetectorConfig,
    pub quality: QualityConfig,
    pub validation: ValidationConfig,
    pub auto_capture: AutoCaptureConfig,
    pub roi: RoiConfig,
    pub performance: PerformanceConfig,
}

impl GuideConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GuideError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| GuideError::ConfigIo(format!("Failed to read config file: {}", e)))?;

        let config: GuideConfig = toml::from_str(&contents)
            .map_err(|e| GuideError::ConfigIo(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), GuideError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                GuideError::ConfigIo(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| GuideError::ConfigIo(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| GuideError::ConfigIo(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("dermacapture.toml")
    }

    /// Load from default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), GuideError> {
        self.detector.validate()?;
        self.quality.validate()?;
        self.validation.validate()?;
        self.auto_capture.validate()?;
        self.roi.validate()?;
        self.performance.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GuideConfig::default();
        assert_eq!(config.validation.centering_tolerance, 50.0);
        assert_eq!(config.validation.min_confidence, 0.6);
        assert_eq!(config.auto_capture.countdown_start, 3);
        assert_eq!(config.roi.history_capacity, 10);
        assert_eq!(config.quality.saturated_fraction, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad = GuideConfig::default();
        bad.validation.max_mole_area_ratio = 0.1;
        assert!(matches!(bad.validate(), Err(GuideError::InvalidConfig(_))));

        let mut bad = GuideConfig::default();
        bad.performance.latency_window = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("dermacapture.toml");

        let mut config = GuideConfig::default();
        config.validation.centering_tolerance = 75.0;
        config.auto_capture.enabled = false;
        config.save_to_file(&config_path).unwrap();

        let loaded = GuideConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&GuideConfig::default()).unwrap();
        for section in [
            "[detector]",
            "[quality]",
            "[validation]",
            "[auto_capture]",
            "[roi]",
            "[performance]",
        ] {
            assert!(toml_string.contains(section), "missing {}", section);
        }
        assert!(toml_string.contains("centering_tolerance"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        let mut partial = toml::to_string_pretty(&GuideConfig::default().validation).unwrap();
        partial.insert_str(0, "[validation]\n");
        fs::write(&path, partial.replace("50.0", "40.0")).unwrap();

        let loaded = GuideConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.validation.centering_tolerance, 40.0);
        assert_eq!(loaded.auto_capture, AutoCaptureConfig::default());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[roi]\nthis is not toml").unwrap();
        assert!(matches!(
            GuideConfig::load_from_file(&path),
            Err(GuideError::ConfigIo(_))
        ));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = GuideConfig::load_from_file("nonexistent_file.toml");
        assert_eq!(result.unwrap(), GuideConfig::default());
    }
}
