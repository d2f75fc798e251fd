//! FFmpeg transcode backend.
//!
//! The composition is translated into one `-filter_complex` graph:
//!
//! ```text
//! media segment  ── trim ─ tpad ─ scale/pad to canonical size ───┐
//! empty segment  ── color (black) ───────────────────────────────┼─ concat ─ rotate ─ fit ─ drawtext… ─ [vout]
//!                                                                │
//! media audio    ── atrim ─ apad ─────┐                          │
//! empty audio    ── anullsrc ─ atrim ─┼─ concat ─┬─ amix ─ [aout]
//! background     ── atrim ─ volume ───────────────┘
//! ```
//!
//! Each media segment is padded and cut to its exact timeline length, so a
//! stream shorter than its container cannot pull later segments earlier.
//! Sources are opened with `-noautorotate` so every frame arrives in its
//! stored orientation; the canonical orientation is applied once after
//! concatenation.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use slotreel_project_model::{ExportConfig, ExportFormat, MediaTime};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::oneshot;

use crate::composition::{Track, TrackSegment, VolumeRamp};
use crate::error::ExportError;
use crate::export::{PreparedExport, ProgressCell, TranscodeBackend, TranscodeJob, TranscodeOutcome};
use crate::media::PixelSize;
use crate::overlay::CaptionOverlay;

/// Frame rate used for GIF output regardless of the configured fps.
const GIF_FPS: u32 = 15;

/// Lines of ffmpeg stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Arguments for one ffmpeg run.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodePlan {
    pub args: Vec<String>,
    pub filter_graph: String,
    pub expected_duration: MediaTime,
}

/// Transcodes with the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: String,
    font_file: Option<PathBuf>,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            font_file: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Font for captions. Without one, drawtext asks fontconfig.
    pub fn with_font_file(mut self, font_file: impl Into<PathBuf>) -> Self {
        self.font_file = Some(font_file.into());
        self
    }

    /// Translate a prepared export into ffmpeg arguments.
    pub fn build_plan(&self, export: &PreparedExport, output: &Path) -> Result<TranscodePlan, ExportError> {
        let result = &export.composition;
        let video = result.video().ok_or_else(|| ExportError::ExportSessionFailed {
            reason: "composition has no video track".to_string(),
        })?;
        let carries_audio = export.config.format.carries_audio();
        let program_audio = result.audio().filter(|_| carries_audio);
        let background = export
            .background
            .as_ref()
            .filter(|_| carries_audio)
            .and_then(|bg| result.composition.track(bg.track));

        let mut inputs = InputTable::default();
        let mut graph = FilterGraph::default();

        let natural = result
            .canonical
            .map(|c| c.natural_size.even())
            .unwrap_or(export.render_size);
        let fps = output_fps(&export.config);

        // video
        let mut labels = Vec::with_capacity(video.segments().len());
        for (i, segment) in video.segments().iter().enumerate() {
            let label = format!("v{i}");
            let chain = match segment {
                TrackSegment::Media { asset, source, .. } => {
                    let input = inputs.index_of(asset.handle.path());
                    // hold the last frame if the stream ends before the container
                    let len = fmt_secs(source.duration);
                    format!(
                        "[{input}:v]trim=start={}:end={},setpts=PTS-STARTPTS,tpad=stop_mode=clone:stop_duration={len},trim=duration={len},{},setsar=1,fps={fps},format=yuv420p",
                        fmt_secs(source.start),
                        fmt_secs(source.end()),
                        fit_filter(natural),
                    )
                }
                TrackSegment::Empty { duration, .. } => format!(
                    "color=c=black:s={}x{}:r={fps}:d={},format=yuv420p",
                    natural.width,
                    natural.height,
                    fmt_secs(*duration),
                ),
            };
            graph.push(chain, &label);
            labels.push(label);
        }
        let concat_in: String = labels.iter().map(|l| format!("[{l}]")).collect();
        graph.push(format!("{concat_in}concat=n={}:v=1:a=0", labels.len()), "vcat");

        let mut post = vec![];
        if let Some(rotate) = result.canonical.and_then(|c| rotation_filter(c.transform.rotation_degrees())) {
            post.push(rotate.to_string());
        }
        post.push(fit_filter(export.render_size.even()));
        for overlay in &export.overlays {
            post.extend(drawtext_filters(overlay, self.font_file.as_deref()));
        }
        if export.config.format == ExportFormat::Gif {
            graph.push(format!("[vcat]{}", post.join(",")), "vpre");
            graph.push(
                format!("[vpre]fps={GIF_FPS},split[g0][g1];[g0]palettegen[pal];[g1][pal]paletteuse"),
                "vout",
            );
        } else {
            graph.push(format!("[vcat]{}", post.join(",")), "vout");
        }

        // audio
        let sample_rate = export.audio_sample_rate;
        let audio_out = match program_audio {
            Some(track) => {
                let program = audio_concat(track, "p", &mut inputs, &mut graph, sample_rate);
                match background {
                    Some(bg_track) => {
                        let bg = audio_concat(bg_track, "b", &mut inputs, &mut graph, sample_rate);
                        let bg_gain = volume_filter(bg_track.volume_ramps());
                        graph.push(format!("[{bg}]{bg_gain}"), "bgain");
                        graph.push(
                            format!("[{program}][bgain]amix=inputs=2:duration=first:dropout_transition=0:normalize=0"),
                            "aout",
                        );
                        Some("aout".to_string())
                    }
                    None => Some(program),
                }
            }
            None => None,
        };

        let filter_graph = graph.render();
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];
        for path in &inputs.paths {
            args.push("-noautorotate".into());
            args.push("-i".into());
            args.push(path.display().to_string());
        }
        args.push("-filter_complex".into());
        args.push(filter_graph.clone());
        args.push("-map".into());
        args.push("[vout]".into());
        match &audio_out {
            Some(label) => {
                args.push("-map".into());
                args.push(format!("[{label}]"));
            }
            None => args.push("-an".into()),
        }
        args.extend(codec_args_for_config(&export.config));
        args.push("-t".into());
        args.push(fmt_secs(export.duration()));
        args.extend(["-progress", "pipe:1", "-nostats"].map(String::from));
        args.push(output.display().to_string());

        tracing::debug!(
            inputs = inputs.paths.len(),
            filter_len = filter_graph.len(),
            overlays = export.overlays.len(),
            has_audio = audio_out.is_some(),
            "ffmpeg plan built"
        );

        Ok(TranscodePlan {
            args,
            filter_graph,
            expected_duration: export.duration(),
        })
    }
}

impl TranscodeBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn start(&self, export: &PreparedExport, output: &Path) -> Result<TranscodeJob, ExportError> {
        let plan = self.build_plan(export, output)?;
        tracing::debug!(args = ?plan.args, "Running ffmpeg");

        let mut child = tokio::process::Command::new(&self.binary)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExportError::ExportSessionFailed {
                reason: format!("failed to start {}: {e}", self.binary),
            })?;

        tracing::info!(
            pid = child.id(),
            args_len = plan.args.len(),
            duration = %plan.expected_duration,
            "ffmpeg process started"
        );

        let stdout = child.stdout.take().ok_or_else(|| ExportError::ExportSessionFailed {
            reason: "failed to capture ffmpeg stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ExportError::ExportSessionFailed {
            reason: "failed to capture ffmpeg stderr".to_string(),
        })?;

        let progress = ProgressCell::new();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(
            child,
            stdout,
            stderr,
            progress.clone(),
            cancel_rx,
            plan.expected_duration,
        ));
        Ok(TranscodeJob::new(progress, Some(cancel_tx), task))
    }
}

async fn supervise(
    mut child: tokio::process::Child,
    stdout: tokio::process::ChildStdout,
    stderr: tokio::process::ChildStderr,
    progress: ProgressCell,
    mut cancel_rx: oneshot::Receiver<()>,
    expected: MediaTime,
) -> TranscodeOutcome {
    // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
    let stderr_task = tokio::spawn(async move {
        let mut output = String::new();
        match BufReader::new(stderr).read_to_string(&mut output).await {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    });

    let expected_secs = expected.as_secs_f64();
    let mut lines = BufReader::new(stdout).lines();
    let mut state = ProgressState::default();
    let mut cancel_open = true;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some((key, value)) = line.trim().split_once('=') {
                        state.update(key, value);
                        if key == "progress" {
                            progress.set(state.fraction(expected_secs));
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "Failed reading ffmpeg progress");
                    break;
                }
            },
            signal = &mut cancel_rx, if cancel_open => {
                if signal.is_ok() {
                    tracing::info!("Killing ffmpeg");
                    if let Err(err) = child.kill().await {
                        tracing::warn!(error = %err, "Failed to kill ffmpeg");
                    }
                    stderr_task.abort();
                    return TranscodeOutcome::Cancelled;
                }
                cancel_open = false;
            }
        }
    }

    let status = child.wait().await;
    let stderr_output = stderr_task
        .await
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    match status {
        Ok(status) if status.success() => {
            progress.set(1.0);
            TranscodeOutcome::Completed
        }
        Ok(status) => TranscodeOutcome::Failed(format!(
            "ffmpeg exited with {status}: {}",
            stderr_tail(&stderr_output)
        )),
        Err(err) => TranscodeOutcome::Unknown(format!("failed to wait on ffmpeg: {err}")),
    }
}

/// Distinct source files in first-use order.
#[derive(Debug, Default)]
struct InputTable {
    paths: Vec<PathBuf>,
}

impl InputTable {
    fn index_of(&mut self, path: &Path) -> usize {
        match self.paths.iter().position(|p| p == path) {
            Some(index) => index,
            None => {
                self.paths.push(path.to_path_buf());
                self.paths.len() - 1
            }
        }
    }
}

#[derive(Debug, Default)]
struct FilterGraph {
    chains: Vec<String>,
}

impl FilterGraph {
    fn push(&mut self, chain: String, output_label: &str) {
        self.chains.push(format!("{chain}[{output_label}]"));
    }

    fn render(&self) -> String {
        self.chains.join(";")
    }
}

/// Concatenate one audio track into `[{prefix}cat]`, returning the label.
fn audio_concat(
    track: &Track,
    prefix: &str,
    inputs: &mut InputTable,
    graph: &mut FilterGraph,
    sample_rate: u32,
) -> String {
    let format = format!("aformat=sample_rates={sample_rate}:channel_layouts=stereo");
    let mut labels = Vec::with_capacity(track.segments().len());
    for (i, segment) in track.segments().iter().enumerate() {
        let label = format!("{prefix}{i}");
        let chain = match segment {
            TrackSegment::Media { asset, source, .. } => {
                let input = inputs.index_of(asset.handle.path());
                // pad with silence so a short audio stream cannot shift later segments
                format!(
                    "[{input}:a]atrim=start={}:end={},asetpts=PTS-STARTPTS,{format},apad,atrim=duration={}",
                    fmt_secs(source.start),
                    fmt_secs(source.end()),
                    fmt_secs(source.duration),
                )
            }
            TrackSegment::Empty { duration, .. } => format!(
                "anullsrc=r={sample_rate}:cl=stereo,atrim=duration={},{format}",
                fmt_secs(*duration)
            ),
        };
        graph.push(chain, &label);
        labels.push(label);
    }

    let out = format!("{prefix}cat");
    if labels.len() == 1 {
        graph.push(format!("[{}]anull", labels[0]), &out);
    } else {
        let concat_in: String = labels.iter().map(|l| format!("[{l}]")).collect();
        graph.push(format!("{concat_in}concat=n={}:v=0:a=1", labels.len()), &out);
    }
    out
}

/// Gain filter for a track's volume ramps. Constant gain when the ramps are
/// flat, a piecewise-linear expression otherwise.
fn volume_filter(ramps: &[VolumeRamp]) -> String {
    match ramps {
        [] => "volume=1".to_string(),
        [ramp] if ramp.start_volume == ramp.end_volume => format!("volume={:.4}", ramp.start_volume),
        _ => {
            let mut expr = String::from("1");
            for ramp in ramps.iter().rev() {
                let start = ramp.range.start.as_secs_f64();
                let end = ramp.range.end().as_secs_f64();
                let span = (end - start).max(f64::EPSILON);
                expr = format!(
                    "if(between(t,{start:.4},{end:.4}),{:.4}+({:.4})*(t-{start:.4})/{span:.4},{expr})",
                    ramp.start_volume,
                    ramp.end_volume - ramp.start_volume,
                );
            }
            format!("volume='{expr}':eval=frame")
        }
    }
}

fn fit_filter(size: PixelSize) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = size.width,
        h = size.height
    )
}

fn rotation_filter(clockwise_degrees: i32) -> Option<&'static str> {
    match clockwise_degrees {
        90 => Some("transpose=clock"),
        180 => Some("hflip,vflip"),
        270 => Some("transpose=cclock"),
        _ => None,
    }
}

fn drawtext_filters(overlay: &CaptionOverlay, font_file: Option<&Path>) -> Vec<String> {
    let center_x = overlay.frame.x + overlay.frame.width / 2.0;
    let enable = format!(
        "gte(t,{})*lt(t,{})",
        fmt_secs(overlay.start),
        fmt_secs(overlay.end)
    );
    let font = font_file
        .map(|path| format!("fontfile='{}':", escape_drawtext(&path.display().to_string())))
        .unwrap_or_default();

    overlay
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let y = overlay.frame.y + i as f64 * overlay.line_height;
            format!(
                "drawtext={font}expansion=none:text='{}':fontsize={:.0}:fontcolor=white:borderw=2:bordercolor=black@0.6:x={center_x:.1}-text_w/2:y={y:.1}:enable='{enable}'",
                escape_drawtext(line),
                overlay.font_size,
            )
        })
        .collect()
}

/// Make text safe inside a single-quoted drawtext option.
fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push('\u{2019}'),
            ':' => out.push_str("\\:"),
            '%' => out.push_str("\\%"),
            _ => out.push(ch),
        }
    }
    out
}

/// Seconds with up to microsecond precision and no trailing zeros.
fn fmt_secs(time: MediaTime) -> String {
    let raw = format!("{:.6}", time.as_secs_f64());
    let trimmed = raw.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn output_fps(config: &ExportConfig) -> u32 {
    match config.format {
        ExportFormat::Gif => GIF_FPS,
        _ => config.fps.clamp(1, 120),
    }
}

fn codec_args_for_config(config: &ExportConfig) -> Vec<String> {
    let video_bitrate = format!("{}k", config.video_bitrate_kbps.max(500));
    let audio_bitrate = format!("{}k", config.audio_bitrate_kbps.max(64));
    let fps = output_fps(config).to_string();
    let (vb, ab, fps) = (video_bitrate.as_str(), audio_bitrate.as_str(), fps.as_str());

    let args = match config.format {
        ExportFormat::Mp4H264 => vec![
            "-c:v", "libx264", "-preset", "medium", "-profile:v", "high", "-pix_fmt", "yuv420p",
            "-r", fps, "-b:v", vb, "-c:a", "aac", "-b:a", ab, "-movflags", "+faststart",
        ],
        ExportFormat::Mp4H265 => vec![
            "-c:v", "libx265", "-preset", "medium", "-tag:v", "hvc1", "-pix_fmt", "yuv420p",
            "-r", fps, "-b:v", vb, "-c:a", "aac", "-b:a", ab, "-movflags", "+faststart",
        ],
        ExportFormat::Gif => vec!["-loop", "0"],
        ExportFormat::Webm => vec![
            "-c:v", "libvpx-vp9", "-r", fps, "-b:v", vb, "-c:a", "libopus", "-b:a", ab,
        ],
    };
    args.into_iter().map(str::to_string).collect()
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

pub(crate) fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Accumulates `-progress` key/value output.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both keys
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<f64>() {
                    self.out_time_secs = (us / 1_000_000.0).max(0.0);
                }
            }
            "progress" => {
                self.complete = value.trim() == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_secs: f64) -> f64 {
        if self.complete {
            return 1.0;
        }
        if expected_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_secs).clamp(0.0, 1.0)
    }
}
