//! Animation time and validity intervals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Point in animation time, in ticks.
pub type TimePoint = i32;

/// Ticks per second of animation time.
pub const TICKS_PER_SECOND: TimePoint = 4800;

/// Smallest representable time; also marks the empty interval.
pub const TIME_NEGATIVE_INFINITY: TimePoint = TimePoint::MIN;

/// Largest representable time.
pub const TIME_POSITIVE_INFINITY: TimePoint = TimePoint::MAX;

pub fn time_to_seconds(time: TimePoint) -> f64 {
    time as f64 / TICKS_PER_SECOND as f64
}

pub fn time_from_seconds(seconds: f64) -> TimePoint {
    (seconds * TICKS_PER_SECOND as f64).round() as TimePoint
}

/// Closed interval `[start, end]` of animation time.
///
/// An interval is empty when `end` is negative infinity or `start > end`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    start: TimePoint,
    end: TimePoint,
}

impl TimeInterval {
    pub const fn new(start: TimePoint, end: TimePoint) -> Self {
        Self { start, end }
    }

    /// Interval containing only `time`.
    pub const fn instant(time: TimePoint) -> Self {
        Self {
            start: time,
            end: time,
        }
    }

    pub const fn infinite() -> Self {
        Self {
            start: TIME_NEGATIVE_INFINITY,
            end: TIME_POSITIVE_INFINITY,
        }
    }

    pub const fn empty() -> Self {
        Self {
            start: TIME_NEGATIVE_INFINITY,
            end: TIME_NEGATIVE_INFINITY,
        }
    }

    pub fn start(&self) -> TimePoint {
        self.start
    }

    pub fn end(&self) -> TimePoint {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == TIME_NEGATIVE_INFINITY || self.start > self.end
    }

    pub fn is_infinite(&self) -> bool {
        self.start == TIME_NEGATIVE_INFINITY && self.end == TIME_POSITIVE_INFINITY
    }

    pub fn contains(&self, time: TimePoint) -> bool {
        !self.is_empty() && self.start <= time && time <= self.end
    }

    /// Whether the two intervals share at least one time point.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.start <= other.end && other.start <= self.end
    }

    /// Shrink to the intersection with `other`.
    pub fn intersect(&mut self, other: &TimeInterval) {
        *self = self.intersection(other);
    }

    pub fn intersection(&self, other: &TimeInterval) -> TimeInterval {
        if !self.overlaps(other) {
            return TimeInterval::empty();
        }
        TimeInterval::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Smallest interval containing both.
    pub fn hull(&self, other: &TimeInterval) -> TimeInterval {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        TimeInterval::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Largest contiguous part of `self` that does not overlap `changed`.
    ///
    /// When `changed` splits `self` in two, the longer side is kept.
    pub fn excluding(&self, changed: &TimeInterval) -> TimeInterval {
        if !self.overlaps(changed) {
            return *self;
        }
        let before = if changed.start > self.start {
            TimeInterval::new(self.start, changed.start - 1)
        } else {
            TimeInterval::empty()
        };
        let after = if changed.end < self.end {
            TimeInterval::new(changed.end + 1, self.end)
        } else {
            TimeInterval::empty()
        };
        match (before.is_empty(), after.is_empty()) {
            (true, true) => TimeInterval::empty(),
            (false, true) => before,
            (true, false) => after,
            (false, false) => {
                if before.duration() >= after.duration() {
                    before
                } else {
                    after
                }
            }
        }
    }

    /// Length in ticks, saturating for infinite intervals.
    pub fn duration(&self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        self.end as i64 - self.start as i64
    }
}

impl Default for TimeInterval {
    fn default() -> Self {
        TimeInterval::empty()
    }
}

impl fmt::Debug for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "[empty]");
        }
        let bound = |t: TimePoint| match t {
            TIME_NEGATIVE_INFINITY => "-inf".to_string(),
            TIME_POSITIVE_INFINITY => "+inf".to_string(),
            t => t.to_string(),
        };
        write!(f, "[{}, {}]", bound(self.start), bound(self.end))
    }
}
