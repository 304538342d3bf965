use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`
/// intersect with positive length. Back-to-back intervals do not overlap.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

pub fn duration_minutes(start: NaiveTime, end: NaiveTime) -> i64 {
    end.signed_duration_since(start).num_minutes()
}

/// Wall-clock interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        duration_minutes(self.start, self.end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Gaps of at least `min_minutes` inside `window` that no `busy` range covers.
/// `busy` may be unsorted and may overlap or stick out of the window; the
/// result is sorted by start.
pub fn free_gaps(window: TimeRange, busy: &[TimeRange], min_minutes: i64) -> Vec<TimeRange> {
    let mut clipped: Vec<TimeRange> = busy
        .iter()
        .map(|b| TimeRange::new(b.start.max(window.start), b.end.min(window.end)))
        .filter(|b| !b.is_empty())
        .collect();
    clipped.sort();

    let mut gaps = Vec::new();
    let mut cursor = window.start;

    for b in clipped {
        if b.start > cursor {
            gaps.push(TimeRange::new(cursor, b.start));
        }
        cursor = cursor.max(b.end);
    }
    if cursor < window.end {
        gaps.push(TimeRange::new(cursor, window.end));
    }

    gaps.retain(|g| g.duration_minutes() >= min_minutes);
    gaps
}
