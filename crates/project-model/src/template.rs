//! Template timeline: the fixed slot layout a reel must match.

use serde::{Deserialize, Serialize};

use crate::time::{MediaTime, TimeRange};

/// A named, time-bounded placeholder a clip may fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot number clips refer to via `assigned_slot_order`.
    pub order: i32,

    /// Start of the slot on the output timeline (seconds).
    pub start_secs: f64,

    /// End of the slot on the output timeline (seconds).
    pub end_secs: f64,

    /// What the slot is meant to show.
    #[serde(default)]
    pub description: String,
}

impl Slot {
    pub fn new(order: i32, start_secs: f64, end_secs: f64, description: impl Into<String>) -> Self {
        Self {
            order,
            start_secs,
            end_secs,
            description: description.into(),
        }
    }

    pub fn start(&self) -> MediaTime {
        MediaTime::from_secs(self.start_secs)
    }

    pub fn end(&self) -> MediaTime {
        MediaTime::from_secs(self.end_secs)
    }

    /// Wall-clock length of the slot, zero when `end <= start`.
    pub fn duration(&self) -> MediaTime {
        self.end() - self.start()
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::from_bounds(self.start(), self.end())
    }
}

/// Slots sorted by `(start, order)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateTimeline {
    slots: Vec<Slot>,
}

impl TemplateTimeline {
    /// Sort the given slots into playback order. The sort is stable, so slots
    /// with equal start and order keep their input order.
    pub fn from_slots(slots: impl IntoIterator<Item = Slot>) -> Self {
        let mut slots: Vec<Slot> = slots.into_iter().collect();
        slots.sort_by(|a, b| {
            a.start()
                .cmp(&b.start())
                .then_with(|| a.order.cmp(&b.order))
        });
        Self { slots }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `max(end)` over all slots; zero for an empty template.
    pub fn total_duration(&self) -> MediaTime {
        self.slots
            .iter()
            .map(Slot::end)
            .max()
            .unwrap_or(MediaTime::ZERO)
    }

    pub fn slot_by_order(&self, order: i32) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.order == order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_sorted_by_start_then_order() {
        let timeline = TemplateTimeline::from_slots(vec![
            Slot::new(2, 15.0, 20.0, "C"),
            Slot::new(1, 5.0, 15.0, "B"),
            Slot::new(0, 0.0, 5.0, "A"),
            Slot::new(-1, 5.0, 6.0, "B'"),
        ]);
        let orders: Vec<i32> = timeline.slots().iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, -1, 1, 2]);
    }

    #[test]
    fn test_total_duration_is_max_end() {
        let timeline = TemplateTimeline::from_slots(vec![
            Slot::new(0, 0.0, 25.0, "long"),
            Slot::new(1, 5.0, 10.0, "short"),
        ]);
        assert_eq!(timeline.total_duration(), MediaTime::from_secs(25.0));
        assert_eq!(TemplateTimeline::default().total_duration(), MediaTime::ZERO);
    }

    #[test]
    fn test_inverted_slot_has_zero_duration() {
        let slot = Slot::new(0, 8.0, 3.0, "broken");
        assert!(slot.duration().is_zero());
        assert!(slot.range().is_empty());
    }

    #[test]
    fn test_slot_by_order_ignores_playback_position() {
        let timeline = TemplateTimeline::from_slots(vec![
            Slot::new(7, 10.0, 12.0, "late"),
            Slot::new(3, 0.0, 4.0, "early"),
        ]);
        assert_eq!(timeline.slot_by_order(7).map(|s| s.description.as_str()), Some("late"));
        assert_eq!(
            timeline.slot_by_order(3).map(Slot::range),
            Some(TimeRange::new(MediaTime::ZERO, MediaTime::from_secs(4.0)))
        );
        assert!(timeline.slot_by_order(1).is_none());
    }

    #[test]
    fn test_description_defaults_when_missing() {
        let slot: Slot =
            serde_json::from_str(r#"{"order": 3, "start_secs": 1.0, "end_secs": 2.0}"#).unwrap();
        assert_eq!(slot.description, "");
        assert_eq!(slot.duration(), MediaTime::from_secs(1.0));
    }
}
