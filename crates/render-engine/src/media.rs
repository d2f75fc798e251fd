//! Local media handles and header probing.
//!
//! A [`LocalMediaHandle`] is a readable file on disk. A [`MediaProbe`] turns
//! one into a [`MediaAsset`]: duration, video geometry and orientation, and
//! whether there is an audio stream. The default probe shells out to
//! `ffprobe`; tests substitute an in-memory implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use slotreel_project_model::MediaTime;

/// A media file known to exist locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalMediaHandle {
    path: PathBuf,
}

impl LocalMediaHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round each dimension down to an even value (encoders reject odd sizes).
    pub fn even(self) -> Self {
        Self {
            width: (self.width - self.width % 2).max(2),
            height: (self.height - self.height % 2).max(2),
        }
    }
}

/// 2-D affine transform mapping natural (stored) pixels to display pixels.
///
/// Layout follows the usual `[a b; c d] + (tx, ty)` convention:
/// `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl OrientationTransform {
    pub const IDENTITY: OrientationTransform = OrientationTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Clockwise quarter-turn rotation for a frame of `natural` size, with the
    /// translation that keeps the rotated frame in the positive quadrant.
    /// Angles are snapped to the nearest multiple of 90°.
    pub fn from_rotation_degrees(degrees: i32, natural: PixelSize) -> Self {
        let w = natural.width as f64;
        let h = natural.height as f64;
        match normalize_quarter_turn(degrees) {
            90 => Self {
                a: 0.0,
                b: 1.0,
                c: -1.0,
                d: 0.0,
                tx: h,
                ty: 0.0,
            },
            180 => Self {
                a: -1.0,
                b: 0.0,
                c: 0.0,
                d: -1.0,
                tx: w,
                ty: h,
            },
            270 => Self {
                a: 0.0,
                b: -1.0,
                c: 1.0,
                d: 0.0,
                tx: 0.0,
                ty: w,
            },
            _ => Self::IDENTITY,
        }
    }

    /// Clockwise rotation in degrees, one of 0, 90, 180, 270.
    pub fn rotation_degrees(&self) -> i32 {
        let radians = self.b.atan2(self.a);
        normalize_quarter_turn(radians.to_degrees().round() as i32)
    }

    pub fn is_quarter_turn(&self) -> bool {
        matches!(self.rotation_degrees(), 90 | 270)
    }

    /// Display size of a frame with the given natural size.
    pub fn display_size(&self, natural: PixelSize) -> PixelSize {
        if self.is_quarter_turn() {
            PixelSize::new(natural.height, natural.width)
        } else {
            natural
        }
    }
}

impl Default for OrientationTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn normalize_quarter_turn(degrees: i32) -> i32 {
    let snapped = ((degrees as f64 / 90.0).round() as i32) * 90;
    snapped.rem_euclid(360)
}

/// Geometry of a file's primary video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoTrackInfo {
    pub natural_size: PixelSize,
    pub transform: OrientationTransform,
}

/// A probed, readable media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub handle: LocalMediaHandle,

    /// Container duration as reported by the probe. May be zero, NaN or
    /// infinite for broken files; callers decide how strict to be.
    pub duration_secs: f64,

    pub video: Option<VideoTrackInfo>,

    pub has_audio: bool,
}

impl MediaAsset {
    /// Duration in media time; invalid durations become zero.
    pub fn duration(&self) -> MediaTime {
        MediaTime::from_secs(self.duration_secs)
    }

    pub fn has_valid_duration(&self) -> bool {
        self.duration_secs.is_finite() && self.duration_secs > 0.0
    }

    pub fn name(&self) -> String {
        self.handle.file_name()
    }
}

/// Errors from loading media headers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MediaError {
    #[error("Probe tool unavailable: {reason}")]
    ToolUnavailable { reason: String },

    #[error("Unreadable media {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// Loads media headers for a resolved handle.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn load(&self, handle: &LocalMediaHandle) -> Result<MediaAsset, MediaError>;
}

/// [`MediaProbe`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: String,
}

impl FfprobeProbe {
    pub fn new() -> Self {
        Self {
            binary: "ffprobe".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check if the probe binary is on `PATH`.
    pub fn is_available(&self) -> bool {
        crate::ffmpeg::command_exists(&self.binary)
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn load(&self, handle: &LocalMediaHandle) -> Result<MediaAsset, MediaError> {
        let output = tokio::process::Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(handle.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MediaError::ToolUnavailable {
                reason: format!("failed to run {}: {e}", self.binary),
            })?;

        if !output.status.success() {
            return Err(MediaError::Unreadable {
                path: handle.path().to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let asset = parse_ffprobe_json(handle.clone(), &raw)?;
        tracing::debug!(
            path = %handle.path().display(),
            duration_secs = asset.duration_secs,
            has_video = asset.video.is_some(),
            has_audio = asset.has_audio,
            "Probed media"
        );
        Ok(asset)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_ffprobe_json(handle: LocalMediaHandle, raw: &str) -> Result<MediaAsset, MediaError> {
    let parsed: FfprobeOutput = serde_json::from_str(raw).map_err(|e| MediaError::Unreadable {
        path: handle.path().to_path_buf(),
        reason: format!("invalid ffprobe output: {e}"),
    })?;

    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let video = video_stream.and_then(|stream| {
        let natural = PixelSize::new(stream.width?, stream.height?);
        if natural.width == 0 || natural.height == 0 {
            return None;
        }
        Some(VideoTrackInfo {
            natural_size: natural,
            transform: OrientationTransform::from_rotation_degrees(
                stream_rotation_cw(stream),
                natural,
            ),
        })
    });

    // Container duration first, longest stream as fallback.
    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            parsed
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
                .reduce(f64::max)
        })
        .unwrap_or(f64::NAN);

    Ok(MediaAsset {
        handle,
        duration_secs,
        video,
        has_audio,
    })
}

/// Clockwise display rotation of a stream.
///
/// The legacy `rotate` tag is clockwise; the display-matrix side data is
/// counter-clockwise.
fn stream_rotation_cw(stream: &FfprobeStream) -> i32 {
    if let Some(tag) = stream.tags.get("rotate").and_then(|r| r.parse::<f64>().ok()) {
        return tag.round() as i32;
    }
    stream
        .side_data_list
        .iter()
        .find_map(|side| side.rotation)
        .map(|ccw| -(ccw.round() as i32))
        .unwrap_or(0)
}
