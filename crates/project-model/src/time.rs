//! Tick-based media time.
//!
//! Every timestamp is an integer number of ticks at [`MediaTime::TIMESCALE`]
//! ticks per second. 600 divides evenly by 24, 25, 30, 50 and 60, so common
//! frame durations are exact and repeated insertion never drifts.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// A non-negative media timestamp or duration.
///
/// Serialized as floating-point seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct MediaTime {
    ticks: i64,
}

impl MediaTime {
    /// Ticks per second.
    pub const TIMESCALE: i64 = 600;

    pub const ZERO: MediaTime = MediaTime { ticks: 0 };

    /// Build from seconds, rounding to the nearest tick.
    ///
    /// Negative, NaN and infinite inputs clamp to zero.
    pub fn from_secs(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        let ticks = (secs * Self::TIMESCALE as f64).round();
        if ticks >= i64::MAX as f64 {
            return Self { ticks: i64::MAX };
        }
        Self {
            ticks: ticks as i64,
        }
    }

    pub fn from_ticks(ticks: i64) -> Self {
        Self {
            ticks: ticks.max(0),
        }
    }

    pub fn ticks(self) -> i64 {
        self.ticks
    }

    pub fn as_secs_f64(self) -> f64 {
        self.ticks as f64 / Self::TIMESCALE as f64
    }

    pub fn is_zero(self) -> bool {
        self.ticks == 0
    }

    /// Difference clamped at zero (`self - other` when positive).
    pub fn saturating_sub(self, other: MediaTime) -> MediaTime {
        Self {
            ticks: (self.ticks - other.ticks).max(0),
        }
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime {
            ticks: self.ticks.saturating_add(rhs.ticks),
        }
    }
}

impl AddAssign for MediaTime {
    fn add_assign(&mut self, rhs: MediaTime) {
        *self = *self + rhs;
    }
}

/// Saturates at zero; media time is never negative.
impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        self.saturating_sub(rhs)
    }
}

impl std::iter::Sum for MediaTime {
    fn sum<I: Iterator<Item = MediaTime>>(iter: I) -> MediaTime {
        iter.fold(MediaTime::ZERO, Add::add)
    }
}

impl From<f64> for MediaTime {
    fn from(secs: f64) -> Self {
        MediaTime::from_secs(secs)
    }
}

impl From<MediaTime> for f64 {
    fn from(time: MediaTime) -> Self {
        time.as_secs_f64()
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

/// A half-open range `[start, start + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: MediaTime,
    pub duration: MediaTime,
}

impl TimeRange {
    pub fn new(start: MediaTime, duration: MediaTime) -> Self {
        Self { start, duration }
    }

    /// Range between two timestamps; empty when `end <= start`.
    pub fn from_bounds(start: MediaTime, end: MediaTime) -> Self {
        Self {
            start,
            duration: end - start,
        }
    }

    pub fn end(&self) -> MediaTime {
        self.start + self.duration
    }

    pub fn is_empty(&self) -> bool {
        self.duration.is_zero()
    }

    pub fn contains(&self, time: MediaTime) -> bool {
        time >= self.start && time < self.end()
    }
}
