//! Time-of-day windowing

use chrono::NaiveTime;

/// Clock-time filter applied in the reference zone
///
/// With both bounds and `start <= end` the window is an inclusive range.
/// With `start > end` it wraps midnight and keeps `t >= start || t <= end`.
/// A single bound is a one-sided cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDayWindow {
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
}

impl TimeOfDayWindow {
    /// Build a window, `None` when neither bound is set
    pub fn new(start: Option<NaiveTime>, end: Option<NaiveTime>) -> Option<Self> {
        if start.is_none() && end.is_none() {
            None
        } else {
            Some(Self { start, end })
        }
    }

    /// Parse optional `HH:MM[:SS]` bounds; blank strings count as absent
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Option<Self>, String> {
        let start = parse_bound(start, "startTimeOfDay")?;
        let end = parse_bound(end, "endTimeOfDay")?;
        Ok(Self::new(start, end))
    }

    /// Whether the window wraps past midnight
    pub fn wraps_midnight(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
    }

    /// Check a local clock time against the window
    pub fn contains(&self, time: &NaiveTime) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start <= end => *time >= start && *time <= end,
            (Some(start), Some(end)) => *time >= start || *time <= end,
            (Some(start), None) => *time >= start,
            (None, Some(end)) => *time <= end,
            (None, None) => true,
        }
    }
}

/// Parse `HH:MM:SS` or `HH:MM`
pub fn parse_time_of_day(input: &str) -> Option<NaiveTime> {
    let input = input.trim();
    NaiveTime::parse_from_str(input, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .ok()
}

fn parse_bound(raw: Option<&str>, field: &str) -> Result<Option<NaiveTime>, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => parse_time_of_day(s)
            .map(Some)
            .ok_or_else(|| format!("Invalid {}: expected HH:MM or HH:MM:SS, got '{}'", field, s)),
    }
}
