//! Reel manifest and export configuration types.
//!
//! A manifest is the JSON document the command-line tool reads: the template
//! slots, the clip catalog, captions, optional background audio, and export
//! settings. The assembly core itself only ever sees the plain values.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::caption::Caption;
use crate::clip::ClipAssignment;
use crate::template::{Slot, TemplateTimeline};

/// Top-level reel manifest (`reel.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReelManifest {
    /// Schema version.
    pub version: String,

    /// Human-readable reel name.
    pub name: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Template slots. Empty means legacy concatenation.
    #[serde(default)]
    pub slots: Vec<Slot>,

    /// Recorded clips.
    #[serde(default)]
    pub clips: Vec<ClipAssignment>,

    /// Caption overlays.
    #[serde(default)]
    pub captions: Vec<Caption>,

    /// Optional background music.
    #[serde(default)]
    pub background_audio: Option<BackgroundAudioRef>,

    /// Export configuration.
    #[serde(default)]
    pub export: ExportConfig,
}

/// Background audio source and its constant gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundAudioRef {
    /// Path, `file://` URI, or bare file name.
    pub source: String,

    /// Linear gain in `[0.0, 1.0]`.
    #[serde(default = "default_gain")]
    pub gain: f64,
}

fn default_gain() -> f64 {
    1.0
}

/// Export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output format.
    pub format: ExportFormat,

    /// Output frame rate.
    pub fps: u32,

    /// Output width. `None` keeps the canonical size of the first clip.
    pub width: Option<u32>,

    /// Output height. `None` keeps the canonical size of the first clip.
    pub height: Option<u32>,

    /// Video bitrate in kbps.
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Mp4H264,
            fps: 30,
            width: None,
            height: None,
            video_bitrate_kbps: 8000,
            audio_bitrate_kbps: 192,
        }
    }
}

/// Output container/codec profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    #[serde(rename = "mp4-h264")]
    Mp4H264,
    #[serde(rename = "mp4-h265")]
    Mp4H265,
    Gif,
    Webm,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp4H264 | ExportFormat::Mp4H265 => "mp4",
            ExportFormat::Gif => "gif",
            ExportFormat::Webm => "webm",
        }
    }

    /// Whether the container can carry audio tracks at all.
    pub fn carries_audio(self) -> bool {
        !matches!(self, ExportFormat::Gif)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Mp4H264 => "mp4-h264",
            ExportFormat::Mp4H265 => "mp4-h265",
            ExportFormat::Gif => "gif",
            ExportFormat::Webm => "webm",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4-h264" | "mp4" | "h264" => Ok(ExportFormat::Mp4H264),
            "mp4-h265" | "h265" | "hevc" => Ok(ExportFormat::Mp4H265),
            "gif" => Ok(ExportFormat::Gif),
            "webm" => Ok(ExportFormat::Webm),
            other => Err(ProjectError::ValidationError {
                message: format!("Unknown format: {other}. Use: mp4-h264, mp4-h265, gif, webm"),
            }),
        }
    }
}

/// A manifest together with the directory it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedReel {
    /// Directory containing the manifest; relative clip sources resolve here first.
    pub root: PathBuf,

    /// Path of the manifest file itself.
    pub manifest_path: PathBuf,

    pub manifest: ReelManifest,
}

impl ReelManifest {
    /// Create an empty manifest with defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            slots: vec![],
            clips: vec![],
            captions: vec![],
            background_audio: None,
            export: ExportConfig::default(),
        }
    }

    pub fn template(&self) -> TemplateTimeline {
        TemplateTimeline::from_slots(self.slots.iter().cloned())
    }

    /// Structural problems that upstream tooling should have prevented.
    ///
    /// An empty result means the manifest is usable. Missing media is not
    /// checked here; that needs the asset resolver.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];

        for slot in &self.slots {
            if !slot.start_secs.is_finite() || !slot.end_secs.is_finite() {
                errors.push(format!("Slot {} has a non-finite time bound", slot.order));
            } else if slot.end_secs < slot.start_secs {
                errors.push(format!(
                    "Slot {} ends before it starts ({} < {})",
                    slot.order, slot.end_secs, slot.start_secs
                ));
            }
        }

        let template = self.template();
        for clip in &self.clips {
            if clip.source.trim().is_empty() {
                errors.push(format!("Clip {} has an empty source", clip.id));
            }
            if clip.trim_start_secs < 0.0 {
                errors.push(format!("Clip {} has a negative trim start", clip.id));
            }
            if let Some(order) = clip.assigned_slot_order {
                if !template.is_empty() && template.slot_by_order(order).is_none() {
                    errors.push(format!(
                        "Clip {} is assigned to unknown slot {order}",
                        clip.id
                    ));
                }
            }
        }

        for caption in &self.captions {
            if !caption.has_valid_position() {
                errors.push(format!(
                    "Caption {} position ({}, {}) is outside [0, 1]",
                    caption.id, caption.position_x_ratio, caption.position_y_ratio
                ));
            }
        }

        if let Some(bgm) = &self.background_audio {
            if !(0.0..=1.0).contains(&bgm.gain) {
                errors.push(format!(
                    "Background audio gain {} is outside [0, 1]",
                    bgm.gain
                ));
            }
        }

        errors
    }
}

impl LoadedReel {
    /// Load a manifest from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let manifest_path = path.as_ref().to_path_buf();

        let json = std::fs::read_to_string(&manifest_path).map_err(|e| ProjectError::IoError {
            path: manifest_path.clone(),
            source: e,
        })?;

        let manifest: ReelManifest =
            serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
                path: manifest_path.clone(),
                source: e,
            })?;

        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self {
            root,
            manifest_path,
            manifest,
        })
    }

    /// Write the manifest back to its file.
    pub fn save(&self) -> Result<(), ProjectError> {
        if let Some(parent) = self.manifest_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&self.manifest).map_err(|e| {
            ProjectError::ParseError {
                path: self.manifest_path.clone(),
                source: e,
            }
        })?;
        std::fs::write(&self.manifest_path, json).map_err(|e| ProjectError::IoError {
            path: self.manifest_path.clone(),
            source: e,
        })
    }

    /// Create a new manifest file at `path`.
    pub fn create(path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self, ProjectError> {
        let manifest_path = path.as_ref().to_path_buf();
        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let loaded = Self {
            root,
            manifest_path,
            manifest: ReelManifest::new(name),
        };
        loaded.save()?;
        Ok(loaded)
    }
}

/// Errors that can occur when working with reel manifests.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid manifest: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_creation() {
        let manifest = ReelManifest::new("Trip");
        assert_eq!(manifest.name, "Trip");
        assert_eq!(manifest.version, "1.0");
        assert_eq!(manifest.export.format, ExportFormat::Mp4H264);
        assert!(manifest.validate().is_empty());
    }

    #[test]
    fn test_manifest_create_and_load() {
        let dir = std::env::temp_dir().join("slotreel_test_manifest");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("reel.json");

        let mut created = LoadedReel::create(&path, "Integration Test").unwrap();
        created.manifest.slots.push(Slot::new(0, 0.0, 5.0, "Intro"));
        created.save().unwrap();

        let loaded = LoadedReel::load(&path).unwrap();
        assert_eq!(loaded.manifest.name, "Integration Test");
        assert_eq!(loaded.manifest.slots.len(), 1);
        assert_eq!(loaded.root, dir);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_minimal_manifest_uses_defaults() {
        let manifest: ReelManifest = serde_json::from_str(
            r#"{"version": "1.0", "name": "m", "created_at": "2024-01-01T00:00:00Z",
                "background_audio": {"source": "song.m4a"}}"#,
        )
        .unwrap();
        assert!(manifest.slots.is_empty());
        assert_eq!(manifest.export.fps, 30);
        assert!((manifest.background_audio.unwrap().gain - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_reports_structural_problems() {
        let mut manifest = ReelManifest::new("bad");
        manifest.slots.push(Slot::new(0, 5.0, 2.0, "inverted"));
        manifest
            .clips
            .push(ClipAssignment::new("c1", Some(7), "c1.mov", 3.0));
        manifest
            .captions
            .push(Caption::new("cap", 0.0, 1.0, "hi").at_position(-0.1, 0.5));
        manifest.background_audio = Some(BackgroundAudioRef {
            source: "bgm.m4a".to_string(),
            gain: 1.5,
        });

        let errors = manifest.validate();
        assert!(errors.iter().any(|e| e.contains("ends before it starts")));
        assert!(errors.iter().any(|e| e.contains("unknown slot 7")));
        assert!(errors.iter().any(|e| e.contains("outside [0, 1]")));
        assert!(errors.iter().any(|e| e.contains("gain")));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("mp4-h264".parse::<ExportFormat>().unwrap(), ExportFormat::Mp4H264);
        assert_eq!("WEBM".parse::<ExportFormat>().unwrap(), ExportFormat::Webm);
        assert!("avi".parse::<ExportFormat>().is_err());
        assert!(!ExportFormat::Gif.carries_audio());
        assert_eq!(ExportFormat::Mp4H265.extension(), "mp4");
    }

    #[test]
    fn test_format_serialization() {
        let json = serde_json::to_string(&ExportFormat::Mp4H265).unwrap();
        assert_eq!(json, "\"mp4-h265\"");
    }
}
