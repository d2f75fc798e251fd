//! Time-boxed caption records.

use serde::{Deserialize, Serialize};

use crate::time::MediaTime;

/// A text caption shown over the composed video for a time window.
///
/// Captions are non-overlapping by construction upstream; nothing here
/// re-checks that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub id: String,

    pub start_secs: f64,

    pub end_secs: f64,

    pub text: String,

    /// Horizontal anchor, `0.0` = left edge, `1.0` = right edge.
    #[serde(default = "centered")]
    pub position_x_ratio: f64,

    /// Vertical anchor, `0.0` = top edge, `1.0` = bottom edge.
    #[serde(default = "lower_third")]
    pub position_y_ratio: f64,
}

fn centered() -> f64 {
    0.5
}

fn lower_third() -> f64 {
    0.8
}

impl Caption {
    pub fn new(
        id: impl Into<String>,
        start_secs: f64,
        end_secs: f64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            start_secs,
            end_secs,
            text: text.into(),
            position_x_ratio: centered(),
            position_y_ratio: lower_third(),
        }
    }

    pub fn at_position(mut self, x_ratio: f64, y_ratio: f64) -> Self {
        self.position_x_ratio = x_ratio;
        self.position_y_ratio = y_ratio;
        self
    }

    pub fn start(&self) -> MediaTime {
        MediaTime::from_secs(self.start_secs)
    }

    pub fn end(&self) -> MediaTime {
        MediaTime::from_secs(self.end_secs)
    }

    /// Whether both position ratios lie within `[0, 1]`.
    pub fn has_valid_position(&self) -> bool {
        (0.0..=1.0).contains(&self.position_x_ratio) && (0.0..=1.0).contains(&self.position_y_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_position_is_lower_center() {
        let caption: Caption = serde_json::from_str(
            r#"{"id": "c1", "start_secs": 1.0, "end_secs": 2.0, "text": "hi"}"#,
        )
        .unwrap();
        assert!((caption.position_x_ratio - 0.5).abs() < 1e-9);
        assert!((caption.position_y_ratio - 0.8).abs() < 1e-9);
        assert!(caption.has_valid_position());
    }

    #[test]
    fn test_out_of_range_position_detected() {
        let caption = Caption::new("c", 0.0, 1.0, "x").at_position(1.2, 0.5);
        assert!(!caption.has_valid_position());
    }
}
