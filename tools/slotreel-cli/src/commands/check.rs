//! Check system capabilities.

use slotreel_common::config::AppConfig;
use slotreel_render_engine::{FfmpegBackend, FfprobeProbe, TranscodeBackend};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Slotreel System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = FfmpegBackend::new();
    let ffmpeg_ok = ffmpeg.is_available();
    if ffmpeg_ok {
        println!("[OK] ffmpeg found (export backend)");
    } else {
        println!("[FAIL] ffmpeg not found in PATH (required for export)");
    }

    let ffprobe_ok = FfprobeProbe::new().is_available();
    if ffprobe_ok {
        println!("[OK] ffprobe found (media probing)");
    } else {
        println!("[FAIL] ffprobe not found in PATH (required to read clips)");
    }

    println!();
    println!("Clip search directories:");
    for dir in config.storage.search_dirs() {
        let marker = if dir.is_dir() { "OK" } else { "--" };
        println!("  [{marker}] {}", dir.display());
    }

    println!();
    if ffmpeg_ok && ffprobe_ok {
        println!("All required tools are available. Slotreel is ready.");
    } else {
        println!("Some required tools are missing. Install ffmpeg (which ships ffprobe).");
    }

    Ok(())
}
