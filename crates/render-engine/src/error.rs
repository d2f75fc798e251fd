//! Error types for assembly and export.

use slotreel_common::error::SlotreelError;

use crate::composition::TrackKind;

/// Errors raised while building a composition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssemblyError {
    #[error("Unable to allocate a {kind} track")]
    TrackAllocation { kind: TrackKind },

    #[error("Asset not found: {asset}")]
    AssetNotFound { asset: String },

    #[error("Asset {asset} has an invalid duration ({duration_secs}s)")]
    InvalidDuration { asset: String, duration_secs: f64 },

    #[error("Trim start {trim_start_secs}s is beyond the end of {asset} ({duration_secs}s)")]
    TrimOutOfRange {
        asset: String,
        trim_start_secs: f64,
        duration_secs: f64,
    },

    #[error("Failed to insert {asset}: {reason}")]
    Insertion { asset: String, reason: String },
}

impl AssemblyError {
    /// The asset this error is about, if any.
    pub fn asset(&self) -> Option<&str> {
        match self {
            AssemblyError::TrackAllocation { .. } => None,
            AssemblyError::AssetNotFound { asset }
            | AssemblyError::InvalidDuration { asset, .. }
            | AssemblyError::TrimOutOfRange { asset, .. }
            | AssemblyError::Insertion { asset, .. } => Some(asset),
        }
    }
}

/// Errors surfaced by the export pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Composition failed: {reason}")]
    CompositionFailed { reason: String },

    #[error("Could not load {asset_name}: {source}")]
    AssetLoadFailed {
        asset_name: String,
        #[source]
        source: AssemblyError,
    },

    #[error("Export session failed: {reason}")]
    ExportSessionFailed { reason: String },

    #[error("Export failed: {reason}")]
    ExportFailed { reason: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error("No transcode backend available: {reason}")]
    NoBackend { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<AssemblyError> for ExportError {
    fn from(err: AssemblyError) -> Self {
        match err.asset() {
            Some(asset) => ExportError::AssetLoadFailed {
                asset_name: asset.to_string(),
                source: err,
            },
            None => ExportError::CompositionFailed {
                reason: err.to_string(),
            },
        }
    }
}

impl From<ExportError> for SlotreelError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Cancelled => SlotreelError::Cancelled,
            ExportError::Io(io) => SlotreelError::Io(io),
            ExportError::NoBackend { reason } => SlotreelError::unsupported(reason),
            assembly @ (ExportError::AssetLoadFailed { .. } | ExportError::CompositionFailed { .. }) => {
                SlotreelError::assembly(assembly.to_string())
            }
            other => SlotreelError::render(other.to_string()),
        }
    }
}

impl From<AssemblyError> for SlotreelError {
    fn from(err: AssemblyError) -> Self {
        SlotreelError::assembly(err.to_string())
    }
}
