//! Validate a reel manifest and its clip sources.

use std::path::PathBuf;

use slotreel_common::config::AppConfig;

use super::{load_reel, resolver_for};

pub fn run(path: PathBuf, config: &AppConfig) -> anyhow::Result<()> {
    println!("Validating reel at: {}", path.display());

    let reel = load_reel(&path)?;
    let resolver = resolver_for(&reel, config);

    println!("  Name: {}", reel.manifest.name);
    println!("  Slots: {}", reel.manifest.slots.len());
    println!("  Clips: {}", reel.manifest.clips.len());

    let mut issues = reel.manifest.validate();

    for clip in &reel.manifest.clips {
        if let Err(e) = resolver.resolve(&clip.source) {
            issues.push(format!("Clip {}: {e}", clip.id));
        }
    }
    if let Some(bgm) = &reel.manifest.background_audio {
        if let Err(e) = resolver.resolve(&bgm.source) {
            issues.push(format!("Background audio: {e} (export continues without it)"));
        }
    }

    if issues.is_empty() {
        println!("  Sources: All present");
        println!("\nReel is valid.");
    } else {
        println!("\nValidation issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        println!(
            "\n{} issue(s) found. Missing clips will export as blank slots.",
            issues.len()
        );
    }

    Ok(())
}
