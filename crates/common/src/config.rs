//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directories searched when a clip reference no longer points at a file.
    pub storage: StorageConfig,

    /// Default export parameters.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Candidate directories for clip lookup, in search order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Managed clip storage owned by the application.
    pub managed_dir: PathBuf,

    /// User documents directory.
    pub documents_dir: PathBuf,

    /// Cache directory (clips restored from another storage tier land here).
    pub caches_dir: PathBuf,

    /// Temporary directory.
    pub temp_dir: PathBuf,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Output frame rate.
    pub fps: u32,

    /// Video bitrate in kbps.
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Audio sample rate used for generated silence and resampling.
    pub audio_sample_rate: u32,

    /// Interval between progress samples while transcoding.
    pub progress_interval_ms: u64,

    /// Caption font size as a fraction of the render height.
    pub caption_font_ratio: f64,

    /// Font file for captions. Unset lets ffmpeg pick one via fontconfig.
    pub caption_font_file: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "slotreel=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl StorageConfig {
    /// Search directories in resolution order.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.managed_dir.clone(),
            self.documents_dir.clone(),
            self.caches_dir.clone(),
            self.temp_dir.clone(),
        ]
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            managed_dir: data_home().join("slotreel").join("clips"),
            documents_dir: home.join("Documents"),
            caches_dir: std::env::var("XDG_CACHE_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join(".cache"))
                .join("slotreel"),
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            video_bitrate_kbps: 8000,
            audio_bitrate_kbps: 192,
            audio_sample_rate: 48000,
            progress_interval_ms: 200,
            caption_font_ratio: 0.05,
            caption_font_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("slotreel").join("config.json")
}

fn data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"))
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}
