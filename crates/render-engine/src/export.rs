//! Export pipeline.
//!
//! `Idle → Preparing → Running → {Completed | Failed | Cancelled}`.
//!
//! Preparing assembles the timeline, lays out caption overlays and mixes in
//! background audio. Running hands the result to a [`TranscodeBackend`] and
//! samples its progress on a fixed interval from a separate polling task
//! until the transcode finishes or the caller cancels.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use slotreel_common::config::ExportDefaults;
use slotreel_project_model::{
    BackgroundAudioRef, Caption, ClipAssignment, ExportConfig, MediaTime, ReelManifest, Slot,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::assembler::{AssembleOptions, TimelineAssembler};
use crate::composition::{CompositionResult, TrackBudget};
use crate::error::ExportError;
use crate::media::{MediaProbe, PixelSize};
use crate::mixer::{BackgroundAudioMixer, MixedBackground};
use crate::overlay::{build_caption_overlays, CaptionOverlay, CaptionStyle};
use crate::resolver::AssetResolver;

/// Frame size used when no clip could be inserted and none is configured.
pub const FALLBACK_RENDER_SIZE: PixelSize = PixelSize {
    width: 1920,
    height: 1080,
};

/// Everything needed to export one reel.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub clips: Vec<ClipAssignment>,
    pub slots: Vec<Slot>,
    pub captions: Vec<Caption>,
    pub background_audio: Option<BackgroundAudioRef>,
    pub output_path: PathBuf,
    pub config: ExportConfig,

    /// Abort on unusable clips when there is no template.
    pub strict: bool,
}

impl ExportRequest {
    pub fn from_manifest(manifest: &ReelManifest, output_path: impl Into<PathBuf>) -> Self {
        Self {
            clips: manifest.clips.clone(),
            slots: manifest.slots.clone(),
            captions: manifest.captions.clone(),
            background_audio: manifest.background_audio.clone(),
            output_path: output_path.into(),
            config: manifest.export.clone(),
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Stages of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Idle,
    Preparing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExportStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportStage::Completed | ExportStage::Failed | ExportStage::Cancelled
        )
    }
}

/// Export progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportProgress {
    /// Fraction done, `[0.0, 1.0]`, never decreasing within one export.
    pub progress: f64,

    pub stage: ExportStage,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,
}

/// Progress callback for exports.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Lock-free shared progress fraction written by a transcode and read by
/// the poller.
#[derive(Debug, Clone, Default)]
pub struct ProgressCell(Arc<AtomicU64>);

impl ProgressCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.0.store(fraction.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// A fully prepared export, ready for a backend.
#[derive(Debug, Clone)]
pub struct PreparedExport {
    pub composition: CompositionResult,
    pub overlays: Vec<CaptionOverlay>,
    pub background: Option<MixedBackground>,
    /// Output frame size in display orientation.
    pub render_size: PixelSize,
    pub config: ExportConfig,
    pub audio_sample_rate: u32,
}

impl PreparedExport {
    pub fn duration(&self) -> MediaTime {
        self.composition.total_duration
    }
}

/// How a transcode ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    Completed,
    Failed(String),
    Cancelled,
    /// Anything the backend could not classify.
    Unknown(String),
}

/// A running transcode.
pub struct TranscodeJob {
    progress: ProgressCell,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<TranscodeOutcome>,
}

impl TranscodeJob {
    /// `cancel` is `None` for backends that cannot stop mid-way.
    pub fn new(
        progress: ProgressCell,
        cancel: Option<oneshot::Sender<()>>,
        task: JoinHandle<TranscodeOutcome>,
    ) -> Self {
        Self {
            progress,
            cancel,
            task,
        }
    }
}

/// Trait for transcode backends.
pub trait TranscodeBackend: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Start transcoding `export` into `output`. Must be called from within
    /// a Tokio runtime.
    fn start(&self, export: &PreparedExport, output: &Path) -> Result<TranscodeJob, ExportError>;
}

/// Tunables for the pipeline itself.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub progress_interval: Duration,
    pub caption_style: CaptionStyle,
    pub audio_sample_rate: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from_defaults(&ExportDefaults::default())
    }
}

impl ExportSettings {
    pub fn from_defaults(defaults: &ExportDefaults) -> Self {
        Self {
            progress_interval: Duration::from_millis(defaults.progress_interval_ms.max(10)),
            caption_style: CaptionStyle::default().with_font_ratio(defaults.caption_font_ratio),
            audio_sample_rate: defaults.audio_sample_rate,
        }
    }
}

/// Fans progress out to the caller while keeping it non-decreasing.
#[derive(Clone)]
struct ProgressReporter {
    sink: Option<ProgressCallback>,
    high_water: ProgressCell,
    started: Instant,
}

impl ProgressReporter {
    fn new(sink: Option<ProgressCallback>) -> Self {
        Self {
            sink,
            high_water: ProgressCell::new(),
            started: Instant::now(),
        }
    }

    fn report(&self, stage: ExportStage, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0).max(self.high_water.get());
        self.high_water.set(fraction);

        let elapsed = self.started.elapsed().as_secs_f64();
        let eta_secs = match stage {
            ExportStage::Running if fraction > 0.0 => ((elapsed / fraction) - elapsed).max(0.0),
            _ => 0.0,
        };

        if let Some(sink) = &self.sink {
            sink(ExportProgress {
                progress: fraction,
                stage,
                eta_secs,
            });
        }
    }

    fn current(&self) -> f64 {
        self.high_water.get()
    }
}

/// Drives an export from request to finished file.
pub struct ExportPipeline<'a> {
    resolver: &'a AssetResolver,
    probe: &'a dyn MediaProbe,
    backend: &'a dyn TranscodeBackend,
    settings: ExportSettings,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(
        resolver: &'a AssetResolver,
        probe: &'a dyn MediaProbe,
        backend: &'a dyn TranscodeBackend,
    ) -> Self {
        Self {
            resolver,
            probe,
            backend,
            settings: ExportSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ExportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the composition, overlays and background audio for `request`.
    pub async fn prepare(&self, request: &ExportRequest) -> Result<PreparedExport, ExportError> {
        let format = request.config.format;
        let assembler = TimelineAssembler::new(self.resolver, self.probe)
            .with_budget(TrackBudget::for_format(format));
        let options = AssembleOptions {
            require_audio_track: format.carries_audio(),
            strict: request.strict,
        };
        let mut composition = assembler
            .assemble(&request.clips, &request.slots, options)
            .await?;

        if composition.total_duration.is_zero() {
            return Err(ExportError::CompositionFailed {
                reason: "nothing to export: the timeline is empty".to_string(),
            });
        }

        let base = composition
            .canonical
            .map(|canonical| canonical.render_size())
            .unwrap_or(FALLBACK_RENDER_SIZE);
        let render_size = render_size_for(&request.config, base);

        let overlays = build_caption_overlays(
            &request.captions,
            render_size,
            composition.total_duration,
            &self.settings.caption_style,
        );

        let background = match &request.background_audio {
            Some(bg) if format.carries_audio() => {
                BackgroundAudioMixer::new(self.resolver, self.probe)
                    .mix(&mut composition.composition, bg)
                    .await
            }
            Some(_) => {
                tracing::info!(format = format.as_str(), "Format has no audio; background audio ignored");
                None
            }
            None => None,
        };

        Ok(PreparedExport {
            composition,
            overlays,
            background,
            render_size,
            config: request.config.clone(),
            audio_sample_rate: self.settings.audio_sample_rate,
        })
    }

    /// Export `request` to `request.output_path`.
    ///
    /// Setting `cancel` stops progress reporting, asks the backend to stop
    /// if it can, and yields [`ExportError::Cancelled`] once the transcode
    /// has wound down.
    pub async fn export(
        &self,
        request: &ExportRequest,
        progress: Option<ProgressCallback>,
        cancel: Arc<AtomicBool>,
    ) -> Result<PathBuf, ExportError> {
        let reporter = ProgressReporter::new(progress);
        tracing::info!(
            output = %request.output_path.display(),
            format = request.config.format.as_str(),
            backend = self.backend.name(),
            "Starting export"
        );
        reporter.report(ExportStage::Preparing, 0.0);

        let result = self.run(request, &reporter, &cancel).await;
        match &result {
            Ok(path) => {
                reporter.report(ExportStage::Completed, 1.0);
                tracing::info!(
                    output = %path.display(),
                    elapsed_secs = reporter.started.elapsed().as_secs_f64(),
                    "Export complete"
                );
            }
            Err(ExportError::Cancelled) => {
                reporter.report(ExportStage::Cancelled, reporter.current());
                remove_partial_output(&request.output_path).await;
                tracing::info!("Export cancelled");
            }
            Err(err) => {
                reporter.report(ExportStage::Failed, reporter.current());
                tracing::error!(error = %err, "Export failed");
            }
        }
        result
    }

    async fn run(
        &self,
        request: &ExportRequest,
        reporter: &ProgressReporter,
        cancel: &Arc<AtomicBool>,
    ) -> Result<PathBuf, ExportError> {
        if !self.backend.is_available() {
            return Err(ExportError::NoBackend {
                reason: format!("{} is not available", self.backend.name()),
            });
        }

        let prepared = self.prepare(request).await?;
        if cancel.load(Ordering::SeqCst) {
            return Err(ExportError::Cancelled);
        }

        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut job = self.backend.start(&prepared, &request.output_path)?;
        reporter.report(ExportStage::Running, 0.0);

        let poller = tokio::spawn(poll_progress(
            job.progress.clone(),
            job.cancel.take(),
            reporter.clone(),
            Arc::clone(cancel),
            self.settings.progress_interval,
        ));

        let outcome = (&mut job.task).await;
        poller.abort();
        let _ = poller.await;

        let outcome = outcome.unwrap_or_else(|err| {
            TranscodeOutcome::Unknown(format!("transcode task ended abnormally: {err}"))
        });

        if cancel.load(Ordering::SeqCst) {
            return Err(ExportError::Cancelled);
        }

        match outcome {
            TranscodeOutcome::Completed => Ok(request.output_path.clone()),
            TranscodeOutcome::Failed(reason) => Err(ExportError::ExportFailed { reason }),
            TranscodeOutcome::Cancelled => Err(ExportError::ExportFailed {
                reason: "unexpected transcode status: cancelled".to_string(),
            }),
            TranscodeOutcome::Unknown(status) => Err(ExportError::ExportFailed {
                reason: format!("unexpected transcode status: {status}"),
            }),
        }
    }
}

/// Output size: explicit config wins; a single configured dimension keeps
/// the base aspect ratio.
fn render_size_for(config: &ExportConfig, base: PixelSize) -> PixelSize {
    let scaled = |num: u32, from: u32, to: u32| -> u32 {
        ((num as u64 * to as u64) / from.max(1) as u64) as u32
    };
    let size = match (config.width, config.height) {
        (Some(w), Some(h)) => PixelSize::new(w, h),
        (Some(w), None) => PixelSize::new(w, scaled(base.height, base.width, w)),
        (None, Some(h)) => PixelSize::new(scaled(base.width, base.height, h), h),
        (None, None) => base,
    };
    size.even()
}

async fn poll_progress(
    cell: ProgressCell,
    mut stop: Option<oneshot::Sender<()>>,
    reporter: ProgressReporter,
    cancel: Arc<AtomicBool>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if cancel.load(Ordering::SeqCst) {
            match stop.take() {
                Some(tx) => {
                    tracing::info!("Cancellation requested; stopping transcode");
                    let _ = tx.send(());
                }
                None => {
                    tracing::info!("Cancellation requested; waiting for transcode to finish");
                }
            }
            return;
        }
        reporter.report(ExportStage::Running, cell.get());
    }
}

async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "Failed to remove partial output"),
    }
}
