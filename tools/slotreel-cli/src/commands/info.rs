//! Show reel information.

use std::path::PathBuf;

use super::load_reel;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let reel = load_reel(&path)?;
    let m = &reel.manifest;
    let template = m.template();

    println!("Reel: {}", m.name);
    println!("  Version: {}", m.version);
    println!("  Created: {}", m.created_at);
    println!();

    if template.is_empty() {
        println!("Template: none (clips are concatenated in slot order)");
    } else {
        println!(
            "Template: {} slot(s), {}",
            template.len(),
            template.total_duration()
        );
        for slot in template.slots() {
            let clip = m
                .clips
                .iter()
                .find(|c| c.assigned_slot_order == Some(slot.order));
            let range = slot.range();
            println!(
                "  #{:<3} {:>8} - {:>8}  {:<30} {}",
                slot.order,
                range.start.to_string(),
                range.end().to_string(),
                slot.description,
                clip.map(|c| c.display_name())
                    .unwrap_or_else(|| "(empty)".to_string())
            );
        }
    }
    println!();

    let placed = m.clips.iter().filter(|c| c.assigned_slot_order.is_some()).count();
    println!("Clips: {} ({} placed, {} stock)", m.clips.len(), placed, m.clips.len() - placed);
    for clip in &m.clips {
        let order = clip
            .assigned_slot_order
            .map(|o| format!("#{o}"))
            .unwrap_or_else(|| "stock".to_string());
        let slot = clip
            .assigned_slot_order
            .and_then(|o| template.slot_by_order(o))
            .map(|s| s.description.as_str())
            .unwrap_or("");
        println!(
            "  {:<12} {:<6} {:.2}s (trim {:.2}s)  {}  {}",
            clip.id, order, clip.nominal_duration_secs, clip.trim_start_secs, clip.source, slot
        );
    }
    println!();

    println!("Captions: {}", m.captions.len());
    for caption in &m.captions {
        println!(
            "  {:>6.2}s – {:>6.2}s at ({:.2}, {:.2})  {:?}",
            caption.start_secs,
            caption.end_secs,
            caption.position_x_ratio,
            caption.position_y_ratio,
            caption.text
        );
    }
    println!();

    match &m.background_audio {
        Some(bgm) => println!("Background audio: {} (gain {:.2})", bgm.source, bgm.gain),
        None => println!("Background audio: none"),
    }
    println!();

    println!("Export config:");
    println!("  Format: {}", m.export.format.as_str());
    let size = match (m.export.width, m.export.height) {
        (None, None) => "first clip".to_string(),
        (w, h) => format!(
            "{}x{}",
            w.map(|v| v.to_string()).unwrap_or_else(|| "auto".into()),
            h.map(|v| v.to_string()).unwrap_or_else(|| "auto".into())
        ),
    };
    println!("  Output: {size} @ {}fps", m.export.fps);
    println!(
        "  Bitrate: video {}kbps, audio {}kbps",
        m.export.video_bitrate_kbps, m.export.audio_bitrate_kbps
    );

    Ok(())
}
