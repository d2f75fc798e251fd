//! Background audio mixing.
//!
//! Background music is best-effort: any failure to find or load it is
//! reported as a [`MixError`] internally and turned into "no background
//! track" for the caller.

use std::sync::Arc;

use slotreel_project_model::{BackgroundAudioRef, MediaTime, TimeRange};

use crate::composition::{validate_media_for, Composition, TrackId, TrackKind, VolumeRamp};
use crate::error::AssemblyError;
use crate::media::{MediaError, MediaProbe};
use crate::resolver::{AssetResolver, ResolveError};

/// Why background audio was left out.
#[derive(Debug, thiserror::Error)]
pub enum MixError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("{0} has no audio stream")]
    NoAudio(String),

    #[error("{0} has no usable duration")]
    NoDuration(String),

    #[error("composition is empty")]
    EmptyComposition,

    #[error(transparent)]
    Track(#[from] AssemblyError),
}

/// Background audio that made it into the composition.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedBackground {
    pub track: TrackId,
    pub source_range: TimeRange,
    pub gain: f64,
}

/// Adds a gain-adjusted background track to a composition.
pub struct BackgroundAudioMixer<'a> {
    resolver: &'a AssetResolver,
    probe: &'a dyn MediaProbe,
}

impl<'a> BackgroundAudioMixer<'a> {
    pub fn new(resolver: &'a AssetResolver, probe: &'a dyn MediaProbe) -> Self {
        Self { resolver, probe }
    }

    /// Mix `background` into `composition`, or leave it untouched.
    pub async fn mix(
        &self,
        composition: &mut Composition,
        background: &BackgroundAudioRef,
    ) -> Option<MixedBackground> {
        match self.try_mix(composition, background).await {
            Ok(mixed) => {
                tracing::info!(
                    source = %background.source,
                    duration = %mixed.source_range.duration,
                    gain = mixed.gain,
                    "Background audio mixed"
                );
                Some(mixed)
            }
            Err(err) => {
                tracing::warn!(
                    source = %background.source,
                    error = %err,
                    "Background audio skipped"
                );
                None
            }
        }
    }

    async fn try_mix(
        &self,
        composition: &mut Composition,
        background: &BackgroundAudioRef,
    ) -> Result<MixedBackground, MixError> {
        let handle = self.resolver.resolve(&background.source)?;
        let asset = Arc::new(self.probe.load(&handle).await?);

        if !asset.has_audio {
            return Err(MixError::NoAudio(asset.name()));
        }
        if !asset.has_valid_duration() {
            return Err(MixError::NoDuration(asset.name()));
        }

        let program = composition.duration();
        if program.is_zero() {
            return Err(MixError::EmptyComposition);
        }

        let length = asset.duration().min(program);
        if length.is_zero() {
            return Err(MixError::NoDuration(asset.name()));
        }
        let source_range = TimeRange::new(MediaTime::ZERO, length);
        // nothing below may fail once the track exists
        validate_media_for(TrackKind::Audio, &asset, source_range)?;
        let gain = if background.gain.is_finite() {
            background.gain.clamp(0.0, 1.0)
        } else {
            1.0
        };

        let id = composition.add_track(TrackKind::Audio)?;
        let track = composition
            .track_mut(id)
            .ok_or(AssemblyError::TrackAllocation {
                kind: TrackKind::Audio,
            })?;
        track.insert_media(&asset, source_range, MediaTime::ZERO)?;
        track.add_volume_ramp(VolumeRamp {
            range: source_range,
            start_volume: gain,
            end_volume: gain,
        });

        Ok(MixedBackground {
            track: id,
            source_range,
            gain,
        })
    }
}
