//! Initialize a new reel manifest.

use std::path::PathBuf;

use slotreel_common::config::AppConfig;
use slotreel_common::error::SlotreelError;
use slotreel_project_model::{LoadedReel, Slot};

pub fn run(name: String, output: PathBuf, config: &AppConfig) -> anyhow::Result<()> {
    let reel_dir = output.join(&name);
    let manifest_path = reel_dir.join("reel.json");
    if manifest_path.exists() {
        anyhow::bail!("{} already exists", manifest_path.display());
    }
    println!("Creating reel '{}' at {}", name, reel_dir.display());

    let mut reel = LoadedReel::create(&manifest_path, &name)
        .map_err(|e| SlotreelError::project(format!("failed to create reel: {e}")))?;

    // three-part skeleton to edit by hand
    reel.manifest.slots = vec![
        Slot::new(0, 0.0, 3.0, "Opening"),
        Slot::new(1, 3.0, 9.0, "Main"),
        Slot::new(2, 9.0, 12.0, "Closing"),
    ];
    reel.manifest.export.fps = config.export.fps;
    reel.manifest.export.video_bitrate_kbps = config.export.video_bitrate_kbps;
    reel.manifest.export.audio_bitrate_kbps = config.export.audio_bitrate_kbps;
    reel.save()
        .map_err(|e| SlotreelError::project(format!("failed to write reel: {e}")))?;
    std::fs::create_dir_all(reel_dir.join("clips"))?;

    println!("Reel created successfully:");
    println!("  Manifest: {}", reel.manifest_path.display());
    println!("  Slots: {}", reel.manifest.slots.len());
    println!("  Export: {} @ {}fps", reel.manifest.export.format.as_str(), reel.manifest.export.fps);
    println!();
    println!("Directory structure:");
    println!("  {}/", name);
    println!("  ├── reel.json    (slots, clips, captions, export settings)");
    println!("  └── clips/       (recorded clips; relative sources resolve here)");

    Ok(())
}
