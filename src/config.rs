//! Configuration management for the posture-coach client

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Analysis service connection
    #[serde(default)]
    pub server: ServerConfig,

    /// Capture device configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Frame encoder configuration
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Preview / display configuration
    #[serde(default)]
    pub display: DisplayConfig,

    /// Session defaults
    #[serde(default)]
    pub session: SessionConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the analysis service, e.g. `http://127.0.0.1:10000`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (ms)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Which capture backend feeds the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureBackend {
    /// Physical webcam (requires the `webcam` feature)
    #[default]
    Camera,
    /// Loop a still image from disk
    Still,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub backend: CaptureBackend,

    /// Camera index passed to the capture backend
    #[serde(default)]
    pub device_index: u32,

    /// Requested frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Requested frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Prefer the user-facing camera when the platform can tell
    #[serde(default = "default_true")]
    pub front_facing: bool,

    /// Image used by the `still` backend
    #[serde(default)]
    pub still_image: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Lossy quality factor in (0, 1]
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Directory receiving the rendered preview frame
    #[serde(default = "default_preview_directory_option")]
    pub output_directory: Option<PathBuf>,

    /// Frame loop cadence, tracks the display refresh rate. `0` disables pacing
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Exercise selected on launch
    #[serde(default = "default_exercise")]
    pub default_exercise: String,

    /// Emit a warning every N consecutive frame failures
    #[serde(default = "default_failure_log_every")]
    pub failure_log_every: u32,
}

// Default value functions
fn default_base_url() -> String {
    "http://127.0.0.1:10000".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_true() -> bool {
    true
}

fn default_jpeg_quality() -> f32 {
    0.8
}

fn default_preview_directory() -> PathBuf {
    std::env::temp_dir().join("posture-coach-preview")
}

fn default_preview_directory_option() -> Option<PathBuf> {
    Some(default_preview_directory())
}

fn default_refresh_hz() -> u32 {
    60
}

fn default_exercise() -> String {
    "Shoulder Raise".to_string()
}

fn default_failure_log_every() -> u32 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::default(),
            device_index: 0,
            width: default_width(),
            height: default_height(),
            front_facing: true,
            still_image: None,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            output_directory: Some(default_preview_directory()),
            refresh_hz: default_refresh_hz(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_exercise: default_exercise(),
            failure_log_every: default_failure_log_every(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            capture: CaptureConfig::default(),
            encoder: EncoderConfig::default(),
            display: DisplayConfig::default(),
            session: SessionConfig::default(),
            config_path: None,
        }
    }
}

impl EncoderConfig {
    /// Quality factor mapped onto the 1..=100 JPEG scale
    pub fn jpeg_quality_percent(&self) -> u8 {
        let quality = if self.jpeg_quality.is_finite() && self.jpeg_quality > 0.0 {
            self.jpeg_quality.min(1.0)
        } else {
            default_jpeg_quality()
        };
        ((quality * 100.0).round() as u8).clamp(1, 100)
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(config_path)
    }

    /// Load configuration from an explicit path, writing defaults if missing
    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config = Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            Ok(config)
        } else {
            let config = Config {
                config_path: Some(config_path),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "posture-coach", "client")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Directory receiving preview frames
    pub fn preview_directory(&self) -> PathBuf {
        self.display
            .output_directory
            .clone()
            .unwrap_or_else(default_preview_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:10000");
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.capture.height, 480);
        assert!(config.capture.front_facing);
        assert_eq!(config.capture.backend, CaptureBackend::Camera);
        assert_eq!(config.display.refresh_hz, 60);
        assert_eq!(config.session.default_exercise, "Shoulder Raise");
        assert_eq!(config.encoder.jpeg_quality_percent(), 80);
    }

    #[test]
    fn test_partial_sections_override() {
        let config = Config::from_toml(
            r#"
            [server]
            base_url = "http://coach.local:8080"

            [capture]
            backend = "still"
            still_image = "/tmp/pose.jpg"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.base_url, "http://coach.local:8080");
        assert_eq!(config.server.request_timeout_ms, 10_000);
        assert_eq!(config.capture.backend, CaptureBackend::Still);
        assert_eq!(config.capture.still_image, Some(PathBuf::from("/tmp/pose.jpg")));
        assert_eq!(config.capture.width, 640);
    }

    #[test]
    fn test_jpeg_quality_is_clamped() {
        let mut encoder = EncoderConfig { jpeg_quality: 3.0 };
        assert_eq!(encoder.jpeg_quality_percent(), 100);

        encoder.jpeg_quality = -1.0;
        assert_eq!(encoder.jpeg_quality_percent(), 80);

        encoder.jpeg_quality = 0.001;
        assert_eq!(encoder.jpeg_quality_percent(), 1);
    }

    #[test]
    fn test_load_from_writes_defaults() {
        let dir = std::env::temp_dir().join(format!(
            "posture-coach-config-test-{}",
            std::process::id()
        ));
        let path = dir.join("config.toml");
        let _ = std::fs::remove_file(&path);

        let config = Config::load_from(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_path().unwrap(), path);

        let reloaded = Config::load_from(path.clone()).unwrap();
        assert_eq!(reloaded.server.base_url, config.server.base_url);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
