//! Caption overlay instructions.
//!
//! Each caption becomes a positioned text box with a step-function opacity:
//! hidden before its window, fully visible inside it, hidden after. There
//! are no fades, so visibility at any timestamp is exact.

use slotreel_project_model::{Caption, MediaTime};

use crate::media::PixelSize;

/// Text metrics used to size caption boxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionStyle {
    /// Font size as a fraction of the render height.
    pub font_ratio: f64,

    /// Average glyph advance as a fraction of the font size.
    pub char_width_ratio: f64,

    /// Line pitch as a multiple of the font size.
    pub line_height: f64,

    /// Maximum box width as a fraction of the render width.
    pub max_width_ratio: f64,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_ratio: 0.05,
            char_width_ratio: 0.55,
            line_height: 1.3,
            max_width_ratio: 0.9,
        }
    }
}

impl CaptionStyle {
    pub fn with_font_ratio(mut self, font_ratio: f64) -> Self {
        self.font_ratio = font_ratio;
        self
    }

    fn font_size(&self, render: PixelSize) -> f64 {
        (render.height as f64 * self.font_ratio).max(1.0)
    }
}

/// Instantaneous opacity change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacityStep {
    pub at: MediaTime,
    pub opacity: f64,
}

/// Pixel-space rectangle, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl OverlayRect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// One caption, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionOverlay {
    pub caption_id: String,
    pub lines: Vec<String>,
    pub font_size: f64,
    pub line_height: f64,
    pub frame: OverlayRect,
    pub start: MediaTime,
    pub end: MediaTime,
    /// Opacity changes in time order. Opacity holds until the next step.
    pub steps: Vec<OpacityStep>,
}

impl CaptionOverlay {
    pub fn is_visible_at(&self, time: MediaTime) -> bool {
        self.opacity_at(time) > 0.0
    }

    pub fn opacity_at(&self, time: MediaTime) -> f64 {
        self.steps
            .iter()
            .take_while(|step| step.at <= time)
            .last()
            .map(|step| step.opacity)
            .unwrap_or(0.0)
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Build overlays for `captions` over a `render_size` frame lasting
/// `total_duration`.
///
/// Caption windows are clamped to `[0, total_duration]`; captions left with
/// empty text or an empty window are dropped. Output is ordered by start.
pub fn build_caption_overlays(
    captions: &[Caption],
    render_size: PixelSize,
    total_duration: MediaTime,
    style: &CaptionStyle,
) -> Vec<CaptionOverlay> {
    let mut overlays: Vec<CaptionOverlay> = captions
        .iter()
        .filter_map(|caption| build_one(caption, render_size, total_duration, style))
        .collect();
    overlays.sort_by_key(|overlay| overlay.start);
    tracing::debug!(
        captions = captions.len(),
        overlays = overlays.len(),
        "Built caption overlays"
    );
    overlays
}

fn build_one(
    caption: &Caption,
    render: PixelSize,
    total: MediaTime,
    style: &CaptionStyle,
) -> Option<CaptionOverlay> {
    let text = caption.text.trim();
    if text.is_empty() {
        return None;
    }

    let start = caption.start().min(total);
    let end = caption.end().min(total);
    if start >= end {
        return None;
    }

    let font_size = style.font_size(render);
    let char_width = font_size * style.char_width_ratio;
    let max_width = render.width as f64 * style.max_width_ratio;
    let max_chars = ((max_width / char_width).floor() as usize).max(1);
    let lines = wrap_words(text, max_chars);

    let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let width = (longest as f64 * char_width).min(render.width as f64);
    let height = (lines.len() as f64 * font_size * style.line_height).min(render.height as f64);

    let frame = OverlayRect {
        x: place(caption.position_x_ratio, render.width as f64, width),
        y: place(caption.position_y_ratio, render.height as f64, height),
        width,
        height,
    };

    let mut steps = Vec::with_capacity(3);
    if !start.is_zero() {
        steps.push(OpacityStep {
            at: MediaTime::ZERO,
            opacity: 0.0,
        });
    }
    steps.push(OpacityStep {
        at: start,
        opacity: 1.0,
    });
    steps.push(OpacityStep {
        at: end,
        opacity: 0.0,
    });

    Some(CaptionOverlay {
        caption_id: caption.id.clone(),
        lines,
        font_size,
        line_height: font_size * style.line_height,
        frame,
        start,
        end,
        steps,
    })
}

/// Top-left coordinate of a box of `extent` centered on `ratio * span`,
/// clamped so the box stays inside `[0, span]`.
fn place(ratio: f64, span: f64, extent: f64) -> f64 {
    let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.5 };
    let centered = ratio * span - extent / 2.0;
    centered.clamp(0.0, (span - extent).max(0.0))
}

/// Greedy word wrap. Words longer than a line are split.
fn wrap_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = vec![];
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HD: PixelSize = PixelSize {
        width: 1920,
        height: 1080,
    };

    fn t(secs: f64) -> MediaTime {
        MediaTime::from_secs(secs)
    }

    #[test]
    fn test_visibility_is_a_step_function() {
        let captions = vec![Caption::new("c1", 2.0, 4.0, "Hello")];
        let overlays = build_caption_overlays(&captions, HD, t(10.0), &CaptionStyle::default());
        let overlay = &overlays[0];

        assert!(!overlay.is_visible_at(t(0.0)));
        assert!(!overlay.is_visible_at(MediaTime::from_ticks(t(2.0).ticks() - 1)));
        assert!(overlay.is_visible_at(t(2.0)));
        assert!(overlay.is_visible_at(MediaTime::from_ticks(t(4.0).ticks() - 1)));
        assert!(!overlay.is_visible_at(t(4.0)));
        assert_eq!(overlay.steps.len(), 3);
    }

    #[test]
    fn test_caption_at_zero_has_no_leading_step() {
        let captions = vec![Caption::new("c1", 0.0, 1.0, "Hi")];
        let overlays = build_caption_overlays(&captions, HD, t(10.0), &CaptionStyle::default());
        assert_eq!(overlays[0].steps.len(), 2);
        assert!(overlays[0].is_visible_at(MediaTime::ZERO));
    }

    #[test]
    fn test_windows_clamped_and_invalid_dropped() {
        let captions = vec![
            Caption::new("tail", 8.0, 30.0, "runs past the end"),
            Caption::new("after", 12.0, 14.0, "entirely after"),
            Caption::new("blank", 1.0, 2.0, "   "),
            Caption::new("inverted", 5.0, 3.0, "backwards"),
        ];
        let overlays = build_caption_overlays(&captions, HD, t(10.0), &CaptionStyle::default());
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].caption_id, "tail");
        assert_eq!(overlays[0].end, t(10.0));
    }

    #[test]
    fn test_edge_positions_stay_in_frame() {
        let captions = vec![
            Caption::new("tl", 0.0, 1.0, "top left corner").at_position(0.0, 0.0),
            Caption::new("br", 1.0, 2.0, "bottom right corner").at_position(1.0, 1.0),
        ];
        let overlays = build_caption_overlays(&captions, HD, t(5.0), &CaptionStyle::default());
        let tl = overlays[0].frame;
        let br = overlays[1].frame;
        assert_eq!((tl.x, tl.y), (0.0, 0.0));
        assert!((br.right() - 1920.0).abs() < 1e-9);
        assert!((br.bottom() - 1080.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_text_wraps() {
        let text = "a caption that is much too long to fit on a single line of a narrow portrait frame";
        let captions = vec![Caption::new("long", 0.0, 1.0, text)];
        let portrait = PixelSize::new(720, 1280);
        let overlays = build_caption_overlays(&captions, portrait, t(2.0), &CaptionStyle::default());
        assert!(overlays[0].lines.len() > 1);
        assert!(overlays[0].frame.width <= 720.0 * 0.9);
    }

    #[test]
    fn test_wrap_splits_oversized_words() {
        assert_eq!(wrap_words("abcdefgh ij", 3), vec!["abc", "def", "gh", "ij"]);
        assert_eq!(wrap_words("one two\nthree", 20), vec!["one two", "three"]);
    }

    #[test]
    fn test_overlays_sorted_by_start() {
        let captions = vec![
            Caption::new("b", 5.0, 6.0, "second"),
            Caption::new("a", 1.0, 2.0, "first"),
        ];
        let overlays = build_caption_overlays(&captions, HD, t(10.0), &CaptionStyle::default());
        let ids: Vec<&str> = overlays.iter().map(|o| o.caption_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    proptest! {
        #[test]
        fn prop_box_never_leaves_frame(
            x in -0.5f64..1.5,
            y in -0.5f64..1.5,
            words in prop::collection::vec("[a-z]{1,15}", 1..30),
            width in 64u32..4000,
            height in 64u32..4000,
        ) {
            let caption = Caption::new("p", 0.0, 1.0, words.join(" ")).at_position(x, y);
            let render = PixelSize::new(width, height);
            let overlays = build_caption_overlays(&[caption], render, t(1.0), &CaptionStyle::default());
            let frame = overlays[0].frame;
            prop_assert!(frame.x >= 0.0 && frame.y >= 0.0);
            prop_assert!(frame.right() <= width as f64 + 1e-9);
            prop_assert!(frame.bottom() <= height as f64 + 1e-9);
        }
    }
}
