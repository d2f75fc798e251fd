//! Timeline assembly.
//!
//! Turns clip assignments and template slots into a [`Composition`] with one
//! video track and, when the target allows it, one program audio track.
//!
//! Two modes:
//! - **Templated** (slots present): the template's timing is authoritative.
//!   Each slot occupies exactly `end - start` on the output no matter what
//!   footage is available; shortfalls become blank video and silence.
//! - **Legacy** (no slots): placed clips are concatenated in slot-order
//!   order, each contributing its nominal duration capped by what the source
//!   actually has after trimming.

use std::collections::HashMap;
use std::sync::Arc;

use slotreel_project_model::{select_slot_clips, ClipAssignment, MediaTime, Slot, TemplateTimeline, TimeRange};

use crate::composition::{
    CanonicalOrientation, Composition, CompositionResult, SlotFill, SlotReport, Track, TrackBudget,
    TrackId, TrackKind,
};
use crate::error::AssemblyError;
use crate::media::{MediaAsset, MediaProbe};
use crate::resolver::AssetResolver;

/// Minimum contribution of a clip in legacy mode, in seconds.
pub const LEGACY_MIN_CLIP_SECS: f64 = 0.1;

/// Per-call assembly switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Fail when no audio track can be allocated.
    pub require_audio_track: bool,

    /// Legacy mode only: abort on the first unusable clip.
    pub strict: bool,
}

/// Builds compositions from clips and slots.
///
/// Holds no state between calls; concurrent `assemble` calls on the same
/// assembler are independent.
pub struct TimelineAssembler<'a> {
    resolver: &'a AssetResolver,
    probe: &'a dyn MediaProbe,
    budget: TrackBudget,
}

impl<'a> TimelineAssembler<'a> {
    pub fn new(resolver: &'a AssetResolver, probe: &'a dyn MediaProbe) -> Self {
        Self {
            resolver,
            probe,
            budget: TrackBudget::default(),
        }
    }

    pub fn with_budget(mut self, budget: TrackBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Assemble `clips` against `slots`.
    ///
    /// An empty `slots` list selects legacy concatenation.
    pub async fn assemble(
        &self,
        clips: &[ClipAssignment],
        slots: &[Slot],
        options: AssembleOptions,
    ) -> Result<CompositionResult, AssemblyError> {
        let mut builder = TrackBuilder::allocate(self.budget, options.require_audio_track)?;
        let selected = select_slot_clips(clips);

        if slots.is_empty() {
            self.assemble_legacy(&mut builder, &selected, options.strict).await?;
        } else {
            let template = TemplateTimeline::from_slots(slots.iter().cloned());
            self.assemble_templated(&mut builder, &selected, &template).await?;
        }

        let result = builder.finish();
        tracing::info!(
            mode = if slots.is_empty() { "legacy" } else { "templated" },
            total_duration = %result.total_duration,
            target = result.target_asset_count,
            resolved = result.resolved_asset_count,
            inserted = result.inserted_asset_count,
            has_audio_track = result.audio_track.is_some(),
            "Timeline assembled"
        );
        Ok(result)
    }

    async fn assemble_templated(
        &self,
        builder: &mut TrackBuilder,
        clips: &[&ClipAssignment],
        template: &TemplateTimeline,
    ) -> Result<(), AssemblyError> {
        let by_order: HashMap<i32, &ClipAssignment> = clips
            .iter()
            .filter_map(|clip| clip.assigned_slot_order.map(|order| (order, *clip)))
            .collect();

        let mut cursor = MediaTime::ZERO;
        for slot in template.slots() {
            if slot.start() > cursor {
                builder.insert_gap(cursor, slot.start() - cursor)?;
                cursor = slot.start();
            }

            let slot_duration = slot.duration();
            if slot_duration.is_zero() {
                tracing::debug!(order = slot.order, "Skipping zero-length slot");
                continue;
            }

            let clip = by_order.get(&slot.order).copied();
            let mut inserted = MediaTime::ZERO;
            let mut fill = SlotFill::Unassigned;

            if let Some(clip) = clip {
                builder.target_asset_count += 1;
                fill = SlotFill::Unavailable;
                match self.load(clip).await {
                    Ok(asset) => {
                        builder.resolved_asset_count += 1;
                        let available = asset.duration() - clip.trim_start();
                        let clip_len = slot_duration.min(available);
                        if !clip_len.is_zero() {
                            let source = TimeRange::new(clip.trim_start(), clip_len);
                            match builder.insert_clip(&asset, source, cursor) {
                                Ok(()) => inserted = clip_len,
                                Err(err) => tracing::warn!(
                                    order = slot.order,
                                    error = %err,
                                    "Clip could not be inserted; slot left blank"
                                ),
                            }
                        } else {
                            tracing::warn!(
                                order = slot.order,
                                clip = %clip.display_name(),
                                "Clip has no footage after trim; slot left blank"
                            );
                        }
                    }
                    Err(err) => tracing::warn!(
                        order = slot.order,
                        error = %err,
                        "Clip unavailable; slot left blank"
                    ),
                }
            }

            if inserted < slot_duration {
                builder.insert_gap(cursor + inserted, slot_duration - inserted)?;
            }
            if !inserted.is_zero() {
                fill = if inserted < slot_duration {
                    SlotFill::Partial
                } else {
                    SlotFill::Filled
                };
            }

            builder.slot_reports.push(SlotReport {
                order: slot.order,
                description: slot.description.clone(),
                range: TimeRange::new(cursor, slot_duration),
                clip_id: clip.map(|c| c.id.clone()),
                inserted,
                fill,
            });
            cursor += slot_duration;
        }

        let total = template.total_duration();
        if total > cursor {
            builder.insert_gap(cursor, total - cursor)?;
        }
        Ok(())
    }

    async fn assemble_legacy(
        &self,
        builder: &mut TrackBuilder,
        clips: &[&ClipAssignment],
        strict: bool,
    ) -> Result<(), AssemblyError> {
        let mut cursor = MediaTime::ZERO;
        for clip in clips {
            builder.target_asset_count += 1;
            match self.place_legacy_clip(builder, clip, cursor).await {
                Ok(inserted) => cursor += inserted,
                Err(err) if strict => return Err(err),
                Err(err) => {
                    tracing::warn!(clip = %clip.id, error = %err, "Skipping clip");
                }
            }
        }
        Ok(())
    }

    async fn place_legacy_clip(
        &self,
        builder: &mut TrackBuilder,
        clip: &ClipAssignment,
        cursor: MediaTime,
    ) -> Result<MediaTime, AssemblyError> {
        let asset = self.load(clip).await?;
        builder.resolved_asset_count += 1;

        if !asset.has_valid_duration() {
            return Err(AssemblyError::InvalidDuration {
                asset: clip.display_name(),
                duration_secs: asset.duration_secs,
            });
        }

        let trim_start = clip.trim_start();
        let duration = asset.duration();
        if trim_start >= duration {
            return Err(AssemblyError::TrimOutOfRange {
                asset: clip.display_name(),
                trim_start_secs: clip.trim_start_secs,
                duration_secs: asset.duration_secs,
            });
        }

        let available = duration - trim_start;
        let wanted = MediaTime::from_secs(clip.nominal_duration_secs.max(LEGACY_MIN_CLIP_SECS));
        let clip_len = wanted.min(available);
        builder.insert_clip(&asset, TimeRange::new(trim_start, clip_len), cursor)?;
        Ok(clip_len)
    }

    /// Resolve and probe a clip's source.
    async fn load(&self, clip: &ClipAssignment) -> Result<Arc<MediaAsset>, AssemblyError> {
        let not_found = || AssemblyError::AssetNotFound {
            asset: clip.display_name(),
        };

        let handle = self.resolver.resolve(&clip.source).map_err(|err| {
            tracing::debug!(clip = %clip.id, error = %err, "Resolve failed");
            not_found()
        })?;
        let asset = self.probe.load(&handle).await.map_err(|err| {
            tracing::debug!(clip = %clip.id, error = %err, "Probe failed");
            not_found()
        })?;
        Ok(Arc::new(asset))
    }
}

/// Mutable state of one assembly call.
struct TrackBuilder {
    composition: Composition,
    video: TrackId,
    audio: Option<TrackId>,
    canonical: Option<CanonicalOrientation>,
    target_asset_count: usize,
    resolved_asset_count: usize,
    inserted_asset_count: usize,
    slot_reports: Vec<SlotReport>,
}

impl TrackBuilder {
    fn allocate(budget: TrackBudget, require_audio: bool) -> Result<Self, AssemblyError> {
        let mut composition = Composition::new(budget);
        let video = composition.add_track(TrackKind::Video)?;
        let audio = match composition.add_track(TrackKind::Audio) {
            Ok(id) => Some(id),
            Err(err) if require_audio => return Err(err),
            Err(_) => {
                tracing::debug!("No audio track available for this target");
                None
            }
        };

        Ok(Self {
            composition,
            video,
            audio,
            canonical: None,
            target_asset_count: 0,
            resolved_asset_count: 0,
            inserted_asset_count: 0,
            slot_reports: vec![],
        })
    }

    /// Blank video and silence on every program track.
    fn insert_gap(&mut self, at: MediaTime, duration: MediaTime) -> Result<(), AssemblyError> {
        for id in [Some(self.video), self.audio].into_iter().flatten() {
            if let Some(track) = self.composition.track_mut(id) {
                track.insert_empty(at, duration)?;
            }
        }
        Ok(())
    }

    /// Insert a clip's video, plus its audio or silence.
    ///
    /// Validates against every affected track before touching any of them,
    /// so a failed insertion leaves the composition unchanged.
    fn insert_clip(
        &mut self,
        asset: &Arc<MediaAsset>,
        source: TimeRange,
        at: MediaTime,
    ) -> Result<(), AssemblyError> {
        let video_info = asset.video.ok_or_else(|| AssemblyError::Insertion {
            asset: asset.name(),
            reason: "no video stream".to_string(),
        })?;

        let video_track = self.track(self.video)?;
        video_track.validate_media(asset, source)?;
        let audio_from_clip = match self.audio {
            Some(id) if asset.has_audio => {
                self.track(id)?.validate_media(asset, source)?;
                true
            }
            _ => false,
        };

        self.track_mut(self.video)?.insert_media(asset, source, at)?;
        if let Some(id) = self.audio {
            let track = self.track_mut(id)?;
            if audio_from_clip {
                track.insert_media(asset, source, at)?;
            } else {
                track.insert_empty(at, source.duration)?;
            }
        }

        if self.canonical.is_none() {
            tracing::debug!(
                asset = %asset.name(),
                rotation = video_info.transform.rotation_degrees(),
                width = video_info.natural_size.width,
                height = video_info.natural_size.height,
                "Captured canonical orientation"
            );
            self.canonical = Some(video_info.into());
        }
        self.inserted_asset_count += 1;
        Ok(())
    }

    fn track(&self, id: TrackId) -> Result<&Track, AssemblyError> {
        let kind = self.kind_of(id);
        self.composition
            .track(id)
            .ok_or(AssemblyError::TrackAllocation { kind })
    }

    fn track_mut(&mut self, id: TrackId) -> Result<&mut Track, AssemblyError> {
        let kind = self.kind_of(id);
        self.composition
            .track_mut(id)
            .ok_or(AssemblyError::TrackAllocation { kind })
    }

    fn kind_of(&self, id: TrackId) -> TrackKind {
        if self.audio == Some(id) {
            TrackKind::Audio
        } else {
            TrackKind::Video
        }
    }

    fn finish(self) -> CompositionResult {
        let total_duration = self.composition.duration();
        CompositionResult {
            composition: self.composition,
            video_track: self.video,
            audio_track: self.audio,
            target_asset_count: self.target_asset_count,
            resolved_asset_count: self.resolved_asset_count,
            inserted_asset_count: self.inserted_asset_count,
            inserted_any: self.inserted_asset_count > 0,
            total_duration,
            canonical: self.canonical,
            slot_reports: self.slot_reports,
        }
    }
}
