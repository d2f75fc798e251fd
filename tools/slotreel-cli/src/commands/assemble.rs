//! Assemble a reel's timeline and report how well each slot is covered.

use std::path::PathBuf;

use slotreel_common::config::AppConfig;
use slotreel_common::error::SlotreelError;
use slotreel_render_engine::{AssembleOptions, FfprobeProbe, SlotFill, TimelineAssembler};

use super::{load_reel, resolver_for};

pub async fn run(path: PathBuf, strict: bool, json: bool, config: &AppConfig) -> anyhow::Result<()> {
    let reel = load_reel(&path)?;
    let resolver = resolver_for(&reel, config);
    let probe = FfprobeProbe::new();
    let assembler = TimelineAssembler::new(&resolver, &probe);

    let options = AssembleOptions {
        require_audio_track: false,
        strict,
    };
    let result = assembler
        .assemble(&reel.manifest.clips, &reel.manifest.slots, options)
        .await
        .map_err(SlotreelError::from)?;

    if json {
        let slots: Vec<serde_json::Value> = result
            .slot_reports
            .iter()
            .map(|r| {
                serde_json::json!({
                    "order": r.order,
                    "description": r.description,
                    "start_secs": r.range.start.as_secs_f64(),
                    "duration_secs": r.range.duration.as_secs_f64(),
                    "clip_id": r.clip_id,
                    "inserted_secs": r.inserted.as_secs_f64(),
                    "fill": fill_label(r.fill),
                })
            })
            .collect();
        let report = serde_json::json!({
            "total_duration_secs": result.total_duration.as_secs_f64(),
            "target_asset_count": result.target_asset_count,
            "resolved_asset_count": result.resolved_asset_count,
            "inserted_asset_count": result.inserted_asset_count,
            "render_size": result.canonical.map(|c| {
                let size = c.render_size();
                [size.width, size.height]
            }),
            "rotation_degrees": result.canonical.map(|c| c.transform.rotation_degrees()),
            "slots": slots,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Assembled: {}", reel.manifest.name);
    println!("  Duration: {}", result.total_duration);
    println!(
        "  Clips: {} targeted, {} resolved, {} inserted",
        result.target_asset_count, result.resolved_asset_count, result.inserted_asset_count
    );
    match result.canonical {
        Some(canonical) => {
            let size = canonical.render_size();
            println!(
                "  Frame: {}x{} (rotation {}°)",
                size.width,
                size.height,
                canonical.transform.rotation_degrees()
            );
        }
        None => println!("  Frame: no clip inserted"),
    }

    if !result.slot_reports.is_empty() {
        println!();
        println!("Slots:");
        for report in &result.slot_reports {
            println!(
                "  #{:<3} {:>8} + {:<8} {:<11} {:<8} {}",
                report.order,
                report.range.start.to_string(),
                report.range.duration.to_string(),
                fill_label(report.fill),
                report.inserted.to_string(),
                report.description
            );
        }
    }

    let degraded = result.degraded_slots().count();
    if !result.inserted_any {
        println!("\nNo footage could be placed; the reel would be entirely blank.");
    } else if degraded > 0 {
        println!("\n{degraded} slot(s) are blank or only partially covered.");
    } else if !result.slot_reports.is_empty() {
        println!("\nEvery slot is fully covered.");
    }

    Ok(())
}

fn fill_label(fill: SlotFill) -> &'static str {
    match fill {
        SlotFill::Filled => "filled",
        SlotFill::Partial => "partial",
        SlotFill::Unavailable => "unavailable",
        SlotFill::Unassigned => "unassigned",
    }
}
