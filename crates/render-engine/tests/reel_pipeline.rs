use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use slotreel_common::logging::init_default_logging;
use slotreel_project_model::{ClipAssignment, ExportFormat, LoadedReel, MediaTime, TimeRange};
use slotreel_render_engine::{
    AssembleOptions, AssetResolver, ExportError, ExportPipeline, ExportProgress, ExportRequest,
    ExportSettings, ExportStage, LocalMediaHandle, MediaAsset, MediaError, MediaProbe,
    OrientationTransform, PixelSize, PreparedExport, ProgressCallback, ProgressCell, SlotFill,
    TimelineAssembler, TranscodeBackend, TranscodeJob, TranscodeOutcome, TrackSegment,
    VideoTrackInfo,
};
use tokio::sync::oneshot;

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("sample-reel")
}

fn load_fixture_reel() -> LoadedReel {
    LoadedReel::load(fixture_root().join("reel.json")).expect("fixture reel should load")
}

fn fixture_resolver() -> AssetResolver {
    let root = fixture_root();
    AssetResolver::new(vec![root.join("clips"), root.join("music")]).with_leading_dir(root)
}

/// Media headers looked up by file name.
struct FakeProbe {
    assets: HashMap<&'static str, (f64, Option<i32>, bool)>,
}

impl FakeProbe {
    fn sample() -> Self {
        let mut assets = HashMap::new();
        assets.insert("a.mov", (5.0, Some(90), true));
        assets.insert("c.mov", (3.0, Some(0), false));
        assets.insert("theme.m4a", (95.0, None, true));
        Self { assets }
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn load(&self, handle: &LocalMediaHandle) -> Result<MediaAsset, MediaError> {
        let name = handle.file_name();
        let (duration_secs, rotation, has_audio) =
            self.assets
                .get(name.as_str())
                .copied()
                .ok_or_else(|| MediaError::Unreadable {
                    path: handle.path().to_path_buf(),
                    reason: "not in fake table".to_string(),
                })?;
        let natural = PixelSize::new(1920, 1080);
        Ok(MediaAsset {
            handle: handle.clone(),
            duration_secs,
            video: rotation.map(|degrees| VideoTrackInfo {
                natural_size: natural,
                transform: OrientationTransform::from_rotation_degrees(degrees, natural),
            }),
            has_audio,
        })
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Script {
    /// Advance progress in steps, then complete.
    Complete,
    /// Report some progress, then fail.
    Fail,
    /// Run until told to stop.
    UntilCancelled,
    /// Ignore cancellation and finish normally after a while.
    Uncancellable,
    /// Claim to have been cancelled although nobody asked.
    SpuriousCancel,
    /// End in a state the backend cannot classify.
    Unclassified,
}

/// Backend that plays out a script instead of transcoding.
struct ScriptedBackend {
    script: Script,
    available: bool,
    prepared: Mutex<Option<PreparedExport>>,
}

impl ScriptedBackend {
    fn new(script: Script) -> Self {
        Self {
            script,
            available: true,
            prepared: Mutex::new(None),
        }
    }
}

impl TranscodeBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&self, export: &PreparedExport, _output: &Path) -> Result<TranscodeJob, ExportError> {
        *self.prepared.lock().unwrap() = Some(export.clone());

        let progress = ProgressCell::new();
        let cell = progress.clone();
        let (tx, mut rx) = oneshot::channel::<()>();
        let script = self.script;
        let task = tokio::spawn(async move {
            match script {
                Script::Complete => {
                    for step in 1..=5 {
                        cell.set(step as f64 * 0.15);
                        tokio::time::sleep(Duration::from_millis(15)).await;
                    }
                    TranscodeOutcome::Completed
                }
                Script::Fail => {
                    cell.set(0.4);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    TranscodeOutcome::Failed("encoder exploded".to_string())
                }
                Script::UntilCancelled => {
                    cell.set(0.2);
                    let _ = (&mut rx).await;
                    TranscodeOutcome::Cancelled
                }
                Script::Uncancellable => {
                    cell.set(0.5);
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    TranscodeOutcome::Completed
                }
                Script::SpuriousCancel => {
                    cell.set(0.3);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    TranscodeOutcome::Cancelled
                }
                Script::Unclassified => {
                    cell.set(0.6);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    TranscodeOutcome::Unknown("signal 9".to_string())
                }
            }
        });

        let cancel = (script != Script::Uncancellable).then_some(tx);
        Ok(TranscodeJob::new(progress, cancel, task))
    }
}

fn fast_settings() -> ExportSettings {
    ExportSettings {
        progress_interval: Duration::from_millis(5),
        ..ExportSettings::default()
    }
}

fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<ExportProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let callback: ProgressCallback = Arc::new(move |p: ExportProgress| {
        sink_seen.lock().unwrap().push(p);
    });
    (callback, seen)
}

fn output_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("slotreel_pipeline_tests")
        .join(format!("{name}.mp4"))
}

#[tokio::test]
async fn fixture_reel_assembles_to_template_length() {
    init_default_logging();
    let reel = load_fixture_reel();
    assert!(reel.manifest.validate().is_empty());

    let resolver = fixture_resolver();
    let probe = FakeProbe::sample();
    let assembler = TimelineAssembler::new(&resolver, &probe);
    let result = assembler
        .assemble(
            &reel.manifest.clips,
            &reel.manifest.slots,
            AssembleOptions {
                require_audio_track: true,
                strict: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.total_duration, MediaTime::from_secs(20.0));
    assert_eq!(result.target_asset_count, 2);
    assert_eq!(result.resolved_asset_count, 2);
    assert_eq!(result.inserted_asset_count, 2);

    let fills: Vec<SlotFill> = result.slot_reports.iter().map(|r| r.fill).collect();
    assert_eq!(
        fills,
        vec![SlotFill::Filled, SlotFill::Unassigned, SlotFill::Partial]
    );
    assert_eq!(result.degraded_slots().count(), 2);

    // the retake assigned to slot 0 loses to the first clip
    match &result.video().unwrap().segments()[0] {
        TrackSegment::Media { asset, source, .. } => {
            assert_eq!(asset.name(), "a.mov");
            assert_eq!(*source, TimeRange::new(MediaTime::ZERO, MediaTime::from_secs(5.0)));
        }
        other => panic!("unexpected first segment {other:?}"),
    }

    // a.mov is portrait; that orientation sticks for the whole reel
    assert_eq!(
        result.canonical.unwrap().render_size(),
        PixelSize::new(1080, 1920)
    );

    // c.mov has no audio; its slot is silent but still timed
    let audio = result.audio().unwrap();
    assert_eq!(audio.duration(), MediaTime::from_secs(20.0));
    let window = TimeRange::from_bounds(MediaTime::from_secs(15.0), MediaTime::from_secs(20.0));
    assert_eq!(audio.media_time_within(window), MediaTime::ZERO);
}

#[tokio::test]
async fn export_reports_monotonic_progress_and_completes() {
    let reel = load_fixture_reel();
    let resolver = fixture_resolver();
    let probe = FakeProbe::sample();
    let backend = ScriptedBackend::new(Script::Complete);
    let pipeline = ExportPipeline::new(&resolver, &probe, &backend).with_settings(fast_settings());

    let output = output_path("complete");
    let request = ExportRequest::from_manifest(&reel.manifest, &output);
    let (callback, seen) = recorder();
    let path = pipeline
        .export(&request, Some(callback), Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();
    assert_eq!(path, output);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first().map(|p| p.stage), Some(ExportStage::Preparing));
    let last = seen.last().unwrap();
    assert_eq!(last.stage, ExportStage::Completed);
    assert_eq!(last.progress, 1.0);
    assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));
    assert!(seen.iter().all(|p| (0.0..=1.0).contains(&p.progress)));

    let prepared = backend.prepared.lock().unwrap().clone().unwrap();
    assert_eq!(prepared.render_size, PixelSize::new(1080, 1920));
    assert_eq!(prepared.overlays.len(), 2);
    let background = prepared.background.expect("background audio should be mixed");
    assert_eq!(background.gain, 0.35);
    assert_eq!(background.source_range.duration, MediaTime::from_secs(20.0));
}

#[tokio::test]
async fn gif_export_drops_audio_and_background() {
    let mut reel = load_fixture_reel();
    reel.manifest.export.format = ExportFormat::Gif;
    reel.manifest.export.width = Some(540);

    let resolver = fixture_resolver();
    let probe = FakeProbe::sample();
    let backend = ScriptedBackend::new(Script::Complete);
    let pipeline = ExportPipeline::new(&resolver, &probe, &backend).with_settings(fast_settings());

    let request = ExportRequest::from_manifest(&reel.manifest, output_path("gif"));
    pipeline
        .export(&request, None, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    let prepared = backend.prepared.lock().unwrap().clone().unwrap();
    assert!(prepared.composition.audio_track.is_none());
    assert!(prepared.background.is_none());
    assert_eq!(prepared.render_size, PixelSize::new(540, 960));
}

#[tokio::test]
async fn transcode_failure_surfaces_reason() {
    let reel = load_fixture_reel();
    let resolver = fixture_resolver();
    let probe = FakeProbe::sample();
    let backend = ScriptedBackend::new(Script::Fail);
    let pipeline = ExportPipeline::new(&resolver, &probe, &backend).with_settings(fast_settings());

    let request = ExportRequest::from_manifest(&reel.manifest, output_path("fail"));
    let (callback, seen) = recorder();
    let err = pipeline
        .export(&request, Some(callback), Arc::new(AtomicBool::new(false)))
        .await
        .unwrap_err();
    match err {
        ExportError::ExportFailed { reason } => assert_eq!(reason, "encoder exploded"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        seen.lock().unwrap().last().map(|p| p.stage),
        Some(ExportStage::Failed)
    );
}

#[tokio::test]
async fn non_completed_status_without_cancel_is_a_failure() {
    let reel = load_fixture_reel();
    let resolver = fixture_resolver();
    let probe = FakeProbe::sample();

    for (script, status) in [
        (Script::SpuriousCancel, "cancelled"),
        (Script::Unclassified, "signal 9"),
    ] {
        let backend = ScriptedBackend::new(script);
        let pipeline =
            ExportPipeline::new(&resolver, &probe, &backend).with_settings(fast_settings());
        let request = ExportRequest::from_manifest(&reel.manifest, output_path(status));
        let (callback, seen) = recorder();
        let err = pipeline
            .export(&request, Some(callback), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap_err();
        match err {
            ExportError::ExportFailed { reason } => {
                assert!(reason.contains("unexpected transcode status"), "{reason}");
                assert!(reason.contains(status), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            seen.lock().unwrap().last().map(|p| p.stage),
            Some(ExportStage::Failed)
        );
    }
}

#[tokio::test]
async fn cancellation_stops_a_cancellable_transcode() {
    let reel = load_fixture_reel();
    let resolver = fixture_resolver();
    let probe = FakeProbe::sample();
    let backend = ScriptedBackend::new(Script::UntilCancelled);
    let pipeline = ExportPipeline::new(&resolver, &probe, &backend).with_settings(fast_settings());

    let cancel = Arc::new(AtomicBool::new(false));
    let trigger = Arc::clone(&cancel);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let callback: ProgressCallback = Arc::new(move |p: ExportProgress| {
        if p.stage == ExportStage::Running && p.progress > 0.0 {
            trigger.store(true, Ordering::SeqCst);
        }
        sink_seen.lock().unwrap().push(p.stage);
    });

    let request = ExportRequest::from_manifest(&reel.manifest, output_path("cancel"));
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.export(&request, Some(callback), cancel),
    )
    .await
    .expect("cancelled export should finish promptly")
    .unwrap_err();

    assert!(matches!(err, ExportError::Cancelled));
    assert_eq!(
        seen.lock().unwrap().last().copied(),
        Some(ExportStage::Cancelled)
    );
}

#[tokio::test]
async fn cancellation_waits_for_uncancellable_transcode() {
    let reel = load_fixture_reel();
    let resolver = fixture_resolver();
    let probe = FakeProbe::sample();
    let backend = ScriptedBackend::new(Script::Uncancellable);
    let pipeline = ExportPipeline::new(&resolver, &probe, &backend).with_settings(fast_settings());

    let cancel = Arc::new(AtomicBool::new(false));
    let trigger = Arc::clone(&cancel);
    let callback: ProgressCallback = Arc::new(move |p: ExportProgress| {
        if p.stage == ExportStage::Running && p.progress > 0.0 {
            trigger.store(true, Ordering::SeqCst);
        }
    });

    let request = ExportRequest::from_manifest(&reel.manifest, output_path("uncancellable"));
    let err = pipeline
        .export(&request, Some(callback), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Cancelled));
}

#[tokio::test]
async fn strict_legacy_export_names_missing_asset() {
    let resolver = fixture_resolver();
    let probe = FakeProbe::sample();
    let backend = ScriptedBackend::new(Script::Complete);
    let pipeline = ExportPipeline::new(&resolver, &probe, &backend).with_settings(fast_settings());

    let mut request = ExportRequest::from_manifest(
        &slotreel_project_model::ReelManifest::new("legacy"),
        output_path("strict"),
    )
    .strict(true);
    request.clips = vec![
        ClipAssignment::new("a", Some(0), "clips/a.mov", 2.0),
        ClipAssignment::new("gone", Some(1), "clips/gone.mov", 2.0),
    ];

    let err = pipeline
        .export(&request, None, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap_err();
    match err {
        ExportError::AssetLoadFailed { asset_name, .. } => assert_eq!(asset_name, "gone.mov"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(backend.prepared.lock().unwrap().is_none());
}

#[tokio::test]
async fn empty_timeline_and_missing_backend_fail_early() {
    let resolver = fixture_resolver();
    let probe = FakeProbe::sample();

    let backend = ScriptedBackend::new(Script::Complete);
    let pipeline = ExportPipeline::new(&resolver, &probe, &backend);
    let request = ExportRequest::from_manifest(
        &slotreel_project_model::ReelManifest::new("empty"),
        output_path("empty"),
    );
    let err = pipeline
        .export(&request, None, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::CompositionFailed { .. }));

    let mut offline = ScriptedBackend::new(Script::Complete);
    offline.available = false;
    let pipeline = ExportPipeline::new(&resolver, &probe, &offline);
    let err = pipeline
        .export(&request, None, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::NoBackend { .. }));
}
