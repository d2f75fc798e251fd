//! Recorded clip references.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::time::MediaTime;

/// A recorded clip, optionally placed into a template slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipAssignment {
    /// Opaque identifier from the clip catalog.
    pub id: String,

    /// Slot this clip fills. `None` marks an unplaced (stock) clip.
    #[serde(default)]
    pub assigned_slot_order: Option<i32>,

    /// Filesystem path, `file://` URI, or bare file name.
    pub source: String,

    /// Duration recorded by the catalog (seconds). The media file is
    /// authoritative; this is a hint used by legacy concatenation.
    #[serde(default)]
    pub nominal_duration_secs: f64,

    /// Offset into the source where playback starts (seconds).
    #[serde(default)]
    pub trim_start_secs: f64,
}

impl ClipAssignment {
    pub fn new(
        id: impl Into<String>,
        assigned_slot_order: Option<i32>,
        source: impl Into<String>,
        nominal_duration_secs: f64,
    ) -> Self {
        Self {
            id: id.into(),
            assigned_slot_order,
            source: source.into(),
            nominal_duration_secs,
            trim_start_secs: 0.0,
        }
    }

    pub fn with_trim_start(mut self, trim_start_secs: f64) -> Self {
        self.trim_start_secs = trim_start_secs;
        self
    }

    pub fn trim_start(&self) -> MediaTime {
        MediaTime::from_secs(self.trim_start_secs)
    }

    /// Human-readable name for error messages: the decoded source file name.
    pub fn display_name(&self) -> String {
        source_path(&self.source)
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_else(|| self.source.trim().to_string())
    }
}

/// Local path named by a clip or audio reference.
///
/// `file://` URIs are decoded (including the `localhost` host form). A
/// reference without a URL scheme is taken as a path. Other URL schemes name
/// no local file.
pub fn source_path(source_ref: &str) -> Option<PathBuf> {
    let trimmed = source_ref.trim();
    if trimmed.is_empty() {
        return None;
    }
    match url::Url::parse(trimmed) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        // "take:2.mov" parses as an opaque URL but is really a file name
        Ok(url) if url.cannot_be_a_base() => Some(PathBuf::from(trimmed)),
        Ok(_) => None,
        Err(_) => Some(PathBuf::from(trimmed)),
    }
}

/// Placed clips in ascending slot order, one per slot.
///
/// Unplaced clips are dropped. When several clips claim the same slot the
/// first one in input order wins.
pub fn select_slot_clips(clips: &[ClipAssignment]) -> Vec<&ClipAssignment> {
    let mut placed: Vec<(i32, &ClipAssignment)> = clips
        .iter()
        .filter_map(|clip| clip.assigned_slot_order.map(|order| (order, clip)))
        .collect();
    // stable: equal orders keep input order
    placed.sort_by_key(|(order, _)| *order);
    placed.dedup_by_key(|(order, _)| *order);
    placed.into_iter().map(|(_, clip)| clip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_clip_per_slot_wins() {
        let clips = vec![
            ClipAssignment::new("b", Some(1), "b.mov", 4.0),
            ClipAssignment::new("a1", Some(0), "a1.mov", 5.0),
            ClipAssignment::new("stock", None, "stock.mov", 9.0),
            ClipAssignment::new("a2", Some(0), "a2.mov", 5.0),
        ];
        let selected = select_slot_clips(&clips);
        let ids: Vec<&str> = selected.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b"]);
    }

    #[test]
    fn test_display_name_strips_directories() {
        let clip = ClipAssignment::new("x", Some(0), "file:///var/clips/take-3.mov", 1.0);
        assert_eq!(clip.display_name(), "take-3.mov");
        let bare = ClipAssignment::new("y", Some(0), "take-4.mov", 1.0);
        assert_eq!(bare.display_name(), "take-4.mov");
    }

    #[test]
    fn test_display_name_decodes_uri_escapes() {
        let clip = ClipAssignment::new("x", Some(0), "file:///var/clips/my%20clip.mov", 1.0);
        assert_eq!(clip.display_name(), "my clip.mov");
    }

    #[test]
    fn test_source_path_forms() {
        assert_eq!(
            source_path("file:///var/clips/a%20b.mov"),
            Some(PathBuf::from("/var/clips/a b.mov"))
        );
        assert_eq!(
            source_path("file://localhost/var/clips/a.mov"),
            Some(PathBuf::from("/var/clips/a.mov"))
        );
        assert_eq!(source_path("clips/a.mov"), Some(PathBuf::from("clips/a.mov")));
        assert_eq!(source_path("/abs/a.mov"), Some(PathBuf::from("/abs/a.mov")));
        assert_eq!(source_path("take:2.mov"), Some(PathBuf::from("take:2.mov")));
        assert_eq!(source_path("https://example.com/a.mov"), None);
        assert_eq!(source_path("file://remote-host/a.mov"), None);
        assert_eq!(source_path("  "), None);
    }

    #[test]
    fn test_optional_fields_default() {
        let clip: ClipAssignment =
            serde_json::from_str(r#"{"id": "c", "source": "c.mov"}"#).unwrap();
        assert_eq!(clip.assigned_slot_order, None);
        assert_eq!(clip.trim_start(), MediaTime::ZERO);
    }
}
