//! Export a reel to video.

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use slotreel_common::config::AppConfig;
use slotreel_common::error::SlotreelError;
use slotreel_project_model::ExportFormat;
use slotreel_render_engine::{
    ExportPipeline, ExportProgress, ExportRequest, ExportSettings, ExportStage,
    FfmpegBackend, FfprobeProbe, ProgressCallback,
};

use super::{load_reel, resolver_for};

pub async fn run(
    path: PathBuf,
    output: Option<PathBuf>,
    format: Option<String>,
    strict: bool,
    dry_run: bool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    println!("Exporting reel at: {}", path.display());

    let mut reel = load_reel(&path)?;
    if let Some(format) = format {
        reel.manifest.export.format = ExportFormat::from_str(&format)
            .map_err(|e| SlotreelError::project(e.to_string()))?;
    }
    let export_format = reel.manifest.export.format;

    let output_path = output.unwrap_or_else(|| {
        reel.root
            .join("exports")
            .join(format!("reel.{}", export_format.extension()))
    });

    println!("  Output: {}", output_path.display());
    println!("  Format: {}", export_format.as_str());

    let resolver = resolver_for(&reel, config);
    let probe = FfprobeProbe::new();
    let backend = match &config.export.caption_font_file {
        Some(font) => FfmpegBackend::new().with_font_file(font),
        None => FfmpegBackend::new(),
    };
    let pipeline = ExportPipeline::new(&resolver, &probe, &backend)
        .with_settings(ExportSettings::from_defaults(&config.export));
    let request = ExportRequest::from_manifest(&reel.manifest, &output_path).strict(strict);

    if dry_run {
        let prepared = pipeline.prepare(&request).await.map_err(SlotreelError::from)?;
        let plan = backend
            .build_plan(&prepared, &output_path)
            .map_err(SlotreelError::from)?;
        println!(
            "  Resolution: {}x{}",
            prepared.render_size.width, prepared.render_size.height
        );
        println!("  Duration: {}", prepared.duration());
        println!();
        let quoted: Vec<String> = plan.args.iter().map(|a| shell_quote(a)).collect();
        println!("ffmpeg {}", quoted.join(" "));
        return Ok(());
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let ctrl_c_flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling export...");
            ctrl_c_flag.store(true, Ordering::SeqCst);
        }
    });

    let progress_cb: ProgressCallback = Arc::new(|p: ExportProgress| {
        let stage = match p.stage {
            ExportStage::Idle => "idle",
            ExportStage::Preparing => "preparing",
            ExportStage::Running => "encoding",
            ExportStage::Completed => "done",
            ExportStage::Failed => "failed",
            ExportStage::Cancelled => "cancelled",
        };
        print!(
            "\r  Progress: {:>5.1}% [{stage}] ETA: {:.0}s   ",
            p.progress * 100.0,
            p.eta_secs,
        );
        let _ = std::io::stdout().flush();
    });

    match pipeline
        .export(&request, Some(progress_cb), cancel)
        .await
        .map_err(SlotreelError::from)
    {
        Ok(path) => {
            println!("\nExport complete: {}", path.display());
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("\nExport cancelled.");
            Ok(())
        }
        Err(e) => {
            println!();
            Err(e.into())
        }
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@".contains(c));
    if plain && !arg.is_empty() {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
