//! Composition model: parallel tracks of media and blank segments.
//!
//! A composition is pure data. Tracks are append-only: each insertion lands
//! at the current end of its track, and any gap before it is filled with an
//! empty segment so a track always covers `[0, duration)` contiguously.

use std::fmt;
use std::sync::Arc;

use slotreel_project_model::{ExportFormat, MediaTime, TimeRange};

use crate::error::AssemblyError;
use crate::media::{MediaAsset, OrientationTransform, PixelSize, VideoTrackInfo};

/// Media type carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// Index of a track within its composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub usize);

/// How many tracks of each kind the output target can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackBudget {
    pub video: usize,
    pub audio: usize,
}

impl TrackBudget {
    /// One video track, plus program and background audio where the
    /// container supports audio.
    pub fn for_format(format: ExportFormat) -> Self {
        Self {
            video: 1,
            audio: if format.carries_audio() { 2 } else { 0 },
        }
    }

    fn limit(&self, kind: TrackKind) -> usize {
        match kind {
            TrackKind::Video => self.video,
            TrackKind::Audio => self.audio,
        }
    }
}

impl Default for TrackBudget {
    fn default() -> Self {
        Self::for_format(ExportFormat::default())
    }
}

/// One contiguous piece of a track.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSegment {
    /// `source` range of `asset`, placed at `at` on the output timeline.
    Media {
        asset: Arc<MediaAsset>,
        source: TimeRange,
        at: MediaTime,
    },
    /// Blank video or silence.
    Empty { at: MediaTime, duration: MediaTime },
}

impl TrackSegment {
    pub fn at(&self) -> MediaTime {
        match self {
            TrackSegment::Media { at, .. } | TrackSegment::Empty { at, .. } => *at,
        }
    }

    pub fn duration(&self) -> MediaTime {
        match self {
            TrackSegment::Media { source, .. } => source.duration,
            TrackSegment::Empty { duration, .. } => *duration,
        }
    }

    /// Where this segment sits on the output timeline.
    pub fn timeline_range(&self) -> TimeRange {
        TimeRange::new(self.at(), self.duration())
    }

    pub fn is_empty_range(&self) -> bool {
        matches!(self, TrackSegment::Empty { .. })
    }
}

/// A constant or linear gain change over part of an audio track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeRamp {
    pub range: TimeRange,
    pub start_volume: f64,
    pub end_volume: f64,
}

/// A single media track.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    id: TrackId,
    kind: TrackKind,
    segments: Vec<TrackSegment>,
    volume_ramps: Vec<VolumeRamp>,
}

impl Track {
    fn new(id: TrackId, kind: TrackKind) -> Self {
        Self {
            id,
            kind,
            segments: vec![],
            volume_ramps: vec![],
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn segments(&self) -> &[TrackSegment] {
        &self.segments
    }

    pub fn volume_ramps(&self) -> &[VolumeRamp] {
        &self.volume_ramps
    }

    /// End of the last segment.
    pub fn duration(&self) -> MediaTime {
        self.segments
            .last()
            .map(|segment| segment.timeline_range().end())
            .unwrap_or(MediaTime::ZERO)
    }

    /// Total length of media (non-empty) segments inside `window`.
    pub fn media_time_within(&self, window: TimeRange) -> MediaTime {
        self.segments
            .iter()
            .filter(|segment| !segment.is_empty_range())
            .map(|segment| {
                let range = segment.timeline_range();
                let start = range.start.max(window.start);
                let end = range.end().min(window.end());
                end - start
            })
            .sum()
    }

    /// Check that `source` of `asset` can go into this track.
    pub fn validate_media(&self, asset: &MediaAsset, source: TimeRange) -> Result<(), AssemblyError> {
        validate_media_for(self.kind, asset, source)
    }

    /// Insert `source` of `asset` at `at`, padding any gap before it.
    pub fn insert_media(
        &mut self,
        asset: &Arc<MediaAsset>,
        source: TimeRange,
        at: MediaTime,
    ) -> Result<(), AssemblyError> {
        self.validate_media(asset, source)?;
        self.check_append_position(&asset.name(), at)?;
        self.pad_to(at);
        tracing::debug!(
            track = %self.kind,
            asset = %asset.name(),
            at = %at,
            source_start = %source.start,
            duration = %source.duration,
            "Inserted media segment"
        );
        self.segments.push(TrackSegment::Media {
            asset: Arc::clone(asset),
            source,
            at,
        });
        Ok(())
    }

    /// Insert a blank range at `at`. Zero durations are ignored.
    pub fn insert_empty(&mut self, at: MediaTime, duration: MediaTime) -> Result<(), AssemblyError> {
        if duration.is_zero() {
            return Ok(());
        }
        self.check_append_position("empty range", at)?;
        self.pad_to(at);
        self.push_empty(at, duration);
        Ok(())
    }

    pub fn add_volume_ramp(&mut self, ramp: VolumeRamp) {
        self.volume_ramps.push(ramp);
    }

    fn check_append_position(&self, what: &str, at: MediaTime) -> Result<(), AssemblyError> {
        let end = self.duration();
        if at < end {
            return Err(AssemblyError::Insertion {
                asset: what.to_string(),
                reason: format!("insertion at {at} overlaps track end {end}"),
            });
        }
        Ok(())
    }

    fn pad_to(&mut self, at: MediaTime) {
        let end = self.duration();
        if at > end {
            self.push_empty(end, at - end);
        }
    }

    fn push_empty(&mut self, at: MediaTime, duration: MediaTime) {
        // merge with a preceding blank so gaps stay one segment
        if let Some(TrackSegment::Empty {
            at: prev_at,
            duration: prev_duration,
        }) = self.segments.last_mut()
        {
            if *prev_at + *prev_duration == at {
                *prev_duration += duration;
                return;
            }
        }
        self.segments.push(TrackSegment::Empty { at, duration });
    }
}

/// Check that `source` of `asset` could go into a track of `kind`, without
/// needing the track to exist yet.
pub fn validate_media_for(
    kind: TrackKind,
    asset: &MediaAsset,
    source: TimeRange,
) -> Result<(), AssemblyError> {
    let insertion_error = |reason: String| AssemblyError::Insertion {
        asset: asset.name(),
        reason,
    };

    let has_media = match kind {
        TrackKind::Video => asset.video.is_some(),
        TrackKind::Audio => asset.has_audio,
    };
    if !has_media {
        return Err(insertion_error(format!("no {kind} stream")));
    }
    if source.is_empty() {
        return Err(insertion_error("empty source range".to_string()));
    }
    if source.end() > asset.duration() {
        return Err(insertion_error(format!(
            "source range ends at {} but asset is {} long",
            source.end(),
            asset.duration()
        )));
    }
    Ok(())
}

/// A set of parallel tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    tracks: Vec<Track>,
    budget: TrackBudget,
}

impl Composition {
    pub fn new(budget: TrackBudget) -> Self {
        Self {
            tracks: vec![],
            budget,
        }
    }

    /// Allocate a new track, failing when the budget for `kind` is used up.
    pub fn add_track(&mut self, kind: TrackKind) -> Result<TrackId, AssemblyError> {
        let in_use = self.tracks.iter().filter(|t| t.kind == kind).count();
        if in_use >= self.budget.limit(kind) {
            return Err(AssemblyError::TrackAllocation { kind });
        }
        let id = TrackId(self.tracks.len());
        self.tracks.push(Track::new(id, kind));
        Ok(id)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(id.0)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(id.0)
    }

    /// Longest track.
    pub fn duration(&self) -> MediaTime {
        self.tracks
            .iter()
            .map(Track::duration)
            .max()
            .unwrap_or(MediaTime::ZERO)
    }
}

/// Orientation and pixel size adopted for the whole output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalOrientation {
    pub transform: OrientationTransform,
    pub natural_size: PixelSize,
}

impl CanonicalOrientation {
    /// Size of the output frame after applying the transform.
    pub fn render_size(&self) -> PixelSize {
        self.transform.display_size(self.natural_size)
    }
}

impl From<VideoTrackInfo> for CanonicalOrientation {
    fn from(info: VideoTrackInfo) -> Self {
        Self {
            transform: info.transform,
            natural_size: info.natural_size,
        }
    }
}

/// How well a template slot was filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFill {
    /// Clip covers the whole slot.
    Filled,
    /// Clip shorter than the slot; the remainder is blank.
    Partial,
    /// A clip is assigned but could not be resolved or inserted.
    Unavailable,
    /// No clip is assigned to the slot.
    Unassigned,
}

/// Per-slot outcome of templated assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotReport {
    pub order: i32,
    pub description: String,
    pub range: TimeRange,
    pub clip_id: Option<String>,
    pub inserted: MediaTime,
    pub fill: SlotFill,
}

impl SlotReport {
    pub fn is_degraded(&self) -> bool {
        self.fill != SlotFill::Filled
    }
}

/// Output of one assembly call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionResult {
    pub composition: Composition,
    pub video_track: TrackId,
    pub audio_track: Option<TrackId>,
    pub target_asset_count: usize,
    pub resolved_asset_count: usize,
    pub inserted_asset_count: usize,
    pub inserted_any: bool,
    pub total_duration: MediaTime,
    pub canonical: Option<CanonicalOrientation>,
    /// One entry per non-empty slot, in template order. Empty in legacy mode.
    pub slot_reports: Vec<SlotReport>,
}

impl CompositionResult {
    pub fn canonical_transform(&self) -> Option<OrientationTransform> {
        self.canonical.map(|c| c.transform)
    }

    pub fn canonical_size(&self) -> Option<PixelSize> {
        self.canonical.map(|c| c.natural_size)
    }

    pub fn video(&self) -> Option<&Track> {
        self.composition.track(self.video_track)
    }

    pub fn audio(&self) -> Option<&Track> {
        self.audio_track.and_then(|id| self.composition.track(id))
    }

    pub fn degraded_slots(&self) -> impl Iterator<Item = &SlotReport> {
        self.slot_reports.iter().filter(|r| r.is_degraded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::LocalMediaHandle;

    fn asset(secs: f64, video: bool, audio: bool) -> Arc<MediaAsset> {
        Arc::new(MediaAsset {
            handle: LocalMediaHandle::new("/clips/x.mov"),
            duration_secs: secs,
            video: video.then_some(VideoTrackInfo {
                natural_size: PixelSize::new(1920, 1080),
                transform: OrientationTransform::IDENTITY,
            }),
            has_audio: audio,
        })
    }

    fn t(secs: f64) -> MediaTime {
        MediaTime::from_secs(secs)
    }

    #[test]
    fn test_budget_limits_allocation() {
        let mut composition = Composition::new(TrackBudget::for_format(ExportFormat::Gif));
        assert!(composition.add_track(TrackKind::Video).is_ok());
        assert_eq!(
            composition.add_track(TrackKind::Audio),
            Err(AssemblyError::TrackAllocation {
                kind: TrackKind::Audio
            })
        );
        assert!(composition.add_track(TrackKind::Video).is_err());
    }

    #[test]
    fn test_insert_pads_gap_before_media() {
        let mut composition = Composition::new(TrackBudget::default());
        let id = composition.add_track(TrackKind::Video).unwrap();
        let track = composition.track_mut(id).unwrap();

        let clip = asset(10.0, true, true);
        track
            .insert_media(&clip, TimeRange::new(t(1.0), t(3.0)), t(2.0))
            .unwrap();

        assert_eq!(track.segments().len(), 2);
        assert_eq!(
            track.segments()[0],
            TrackSegment::Empty {
                at: MediaTime::ZERO,
                duration: t(2.0)
            }
        );
        assert_eq!(track.duration(), t(5.0));
    }

    #[test]
    fn test_adjacent_empty_ranges_merge() {
        let mut composition = Composition::new(TrackBudget::default());
        let id = composition.add_track(TrackKind::Audio).unwrap();
        let track = composition.track_mut(id).unwrap();
        track.insert_empty(MediaTime::ZERO, t(2.0)).unwrap();
        track.insert_empty(t(2.0), t(3.0)).unwrap();
        track.insert_empty(t(5.0), MediaTime::ZERO).unwrap();
        assert_eq!(track.segments().len(), 1);
        assert_eq!(track.duration(), t(5.0));
    }

    #[test]
    fn test_insert_rejects_overlap_and_bad_ranges() {
        let mut composition = Composition::new(TrackBudget::default());
        let id = composition.add_track(TrackKind::Video).unwrap();
        let track = composition.track_mut(id).unwrap();
        let clip = asset(4.0, true, false);

        track
            .insert_media(&clip, TimeRange::new(MediaTime::ZERO, t(4.0)), MediaTime::ZERO)
            .unwrap();
        assert!(track
            .insert_media(&clip, TimeRange::new(MediaTime::ZERO, t(1.0)), t(3.0))
            .is_err());
        assert!(track
            .insert_media(&clip, TimeRange::new(t(2.0), t(3.0)), t(4.0))
            .is_err());

        let audio_only = asset(4.0, false, true);
        let err = track
            .insert_media(&audio_only, TimeRange::new(MediaTime::ZERO, t(1.0)), t(4.0))
            .unwrap_err();
        assert!(err.to_string().contains("no video stream"));
    }

    #[test]
    fn test_media_time_within_window() {
        let mut composition = Composition::new(TrackBudget::default());
        let id = composition.add_track(TrackKind::Video).unwrap();
        let track = composition.track_mut(id).unwrap();
        let clip = asset(10.0, true, false);
        track
            .insert_media(&clip, TimeRange::new(MediaTime::ZERO, t(3.0)), t(15.0))
            .unwrap();
        track.insert_empty(t(18.0), t(2.0)).unwrap();

        let window = TimeRange::from_bounds(t(15.0), t(20.0));
        assert_eq!(track.media_time_within(window), t(3.0));
        let earlier = TimeRange::from_bounds(t(5.0), t(15.0));
        assert_eq!(track.media_time_within(earlier), MediaTime::ZERO);
    }

    #[test]
    fn test_canonical_render_size_swaps_for_portrait() {
        let natural = PixelSize::new(1920, 1080);
        let canonical = CanonicalOrientation {
            transform: OrientationTransform::from_rotation_degrees(90, natural),
            natural_size: natural,
        };
        assert_eq!(canonical.render_size(), PixelSize::new(1080, 1920));
    }
}
