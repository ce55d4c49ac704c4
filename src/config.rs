use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    backend::BackendPreference,
    error::{ConfigError, Result},
    fourcc::FourCC,
};

/// Main configuration for videoio
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture handle defaults
    pub capture: CaptureConfig,

    /// Writer handle defaults
    pub writer: WriterConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.capture.validate()?;
        self.writer.validate()?;
        Ok(())
    }
}

/// Capture handle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Backend to open sources with
    pub backend: BackendPreference,

    /// Longest a camera read may block before giving up (milliseconds)
    pub device_timeout_ms: u64,

    /// Number of driver buffers for live devices
    pub buffer_count: u32,

    /// Requested camera resolution
    pub camera_width: u32,
    pub camera_height: u32,

    /// Requested camera frame rate
    pub camera_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Any,
            device_timeout_ms: 10_000,
            buffer_count: 4,
            camera_width: 640,
            camera_height: 480,
            camera_fps: 30,
        }
    }
}

impl CaptureConfig {
    fn validate(&self) -> Result<()> {
        if self.device_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "capture.device_timeout_ms".to_string(),
                value: self.device_timeout_ms.to_string()
            }.into());
        }

        if self.buffer_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "capture.buffer_count".to_string(),
                value: self.buffer_count.to_string()
            }.into());
        }

        if self.camera_width == 0 || self.camera_height == 0 {
            return Err(ConfigError::InvalidValue {
                key: "capture.camera_resolution".to_string(),
                value: format!("{}x{}", self.camera_width, self.camera_height)
            }.into());
        }

        if self.camera_fps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "capture.camera_fps".to_string(),
                value: self.camera_fps.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Writer handle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Backend to open outputs with
    pub backend: BackendPreference,

    /// Codec used when the caller does not name one
    pub fourcc: FourCC,

    /// Frame rate used when the caller does not name one
    pub fps: f64,

    /// Initial encoder quality (1-100)
    pub quality: u8,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Any,
            fourcc: FourCC::MJPG,
            fps: 30.0,
            quality: 95,
        }
    }
}

impl WriterConfig {
    fn validate(&self) -> Result<()> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "writer.fps".to_string(),
                value: self.fps.to_string()
            }.into());
        }

        if !(1..=100).contains(&self.quality) {
            return Err(ConfigError::InvalidValue {
                key: "writer.quality".to_string(),
                value: self.quality.to_string()
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("videoio.toml");

        let mut original_config = Config::default();
        original_config.writer.fourcc = FourCC::MPNG;
        original_config.capture.backend = BackendPreference::Avi;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[writer]\nquality = 50\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.writer.quality, 50);
        assert_eq!(config.writer.fourcc, FourCC::MJPG);
        assert_eq!(config.capture, CaptureConfig::default());
    }

    #[test]
    fn test_invalid_writer_config() {
        let mut config = Config::default();
        config.writer.quality = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.writer.fps = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_capture_config() {
        let mut config = Config::default();
        config.capture.buffer_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_fourcc_fails_parse() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        std::fs::write(&file_path, "[writer]\nfourcc = \"MJPEG\"\n").unwrap();

        assert!(matches!(
            Config::from_file(&file_path),
            Err(crate::error::VideoIoError::Config(ConfigError::ParseFailed { .. }))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/definitely/not/here.toml"),
            Err(crate::error::VideoIoError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
