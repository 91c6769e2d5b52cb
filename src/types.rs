//! Core data types used throughout the hub

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, SubsecRound, TimeZone,
    Utc,
};
use serde::{Deserialize, Serialize};

/// A raw reading as written by the ingestion collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Topic the reading belongs to
    pub topic: String,
    /// Instant the reading was recorded
    pub timestamp: DateTime<Utc>,
    /// Payload exactly as received
    pub raw_value: String,
}

impl Reading {
    /// Create a new reading
    pub fn new(
        topic: impl Into<String>,
        timestamp: DateTime<Utc>,
        raw_value: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            timestamp,
            raw_value: raw_value.into(),
        }
    }

    /// Normalize into a second-precision timestamp and numeric value.
    ///
    /// Returns `None` when the payload is not numeric.
    pub fn normalize(&self) -> Option<NormalizedReading> {
        let value = self.raw_value.trim().parse::<f64>().ok()?;
        if !value.is_finite() {
            return None;
        }
        Some(NormalizedReading {
            timestamp: self.timestamp.trunc_subsecs(0),
            value,
        })
    }
}

/// Reading reduced to what reports and predictions consume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReading {
    /// Timestamp truncated to whole seconds
    #[serde(with = "iso_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Numeric value
    pub value: f64,
}

/// Raw reading as served by the realtime endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl From<&Reading> for MessageView {
    fn from(reading: &Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            message: reading.raw_value.clone(),
        }
    }
}

/// A named time-series channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// Record identifier
    pub id: String,
    /// Unique topic name
    pub topic: String,
    /// Device the topic is attached to
    pub device: String,
    /// Human readable label (the only mutable field)
    pub label: String,
    /// Creation instant
    pub created_at: DateTime<Utc>,
}

impl Topic {
    /// Create a new topic record with a fresh id
    pub fn new(
        topic: impl Into<String>,
        device: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            device: device.into(),
            label: label.into(),
            created_at: Utc::now(),
        }
    }
}

/// Topic filter for metadata lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    /// Every topic record
    All,
    /// Exact topic name
    Name(String),
    /// Record id
    Id(String),
}

impl TopicFilter {
    /// Check if a topic record matches this filter
    pub fn matches(&self, topic: &Topic) -> bool {
        match self {
            TopicFilter::All => true,
            TopicFilter::Name(name) => &topic.topic == name,
            TopicFilter::Id(id) => &topic.id == id,
        }
    }
}

/// Inclusive time range for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start instant (inclusive)
    pub start: DateTime<Utc>,
    /// End instant (inclusive)
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range ending now and spanning `duration`
    pub fn last(duration: chrono::Duration) -> Self {
        let end = Utc::now();
        Self::new(end - duration, end)
    }

    /// Check if an instant falls within this range
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        *timestamp >= self.start && *timestamp <= self.end
    }

    /// Length of the range
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// Ordering of store results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Oldest first
    Ascending,
    /// Newest first
    Descending,
}

/// Fitted linear trend for a topic
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendModel {
    pub slope: f64,
    pub intercept: f64,
    pub step_seconds: i64,
    pub sample_count: usize,
    pub computed_at: DateTime<Utc>,
}

/// Which end of a day a bare date resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBound {
    Start,
    End,
}

/// Fixed reference zone used for calendar days and clock times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceZone {
    offset: FixedOffset,
}

impl ReferenceZone {
    /// Build a zone from a UTC offset in minutes (e.g. 330 for UTC+05:30).
    ///
    /// Returns `None` for offsets outside ±24h.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }

    /// UTC itself
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Local clock time of an instant
    pub fn local_time(&self, ts: &DateTime<Utc>) -> NaiveTime {
        ts.with_timezone(&self.offset).time()
    }

    /// Local calendar day of an instant
    pub fn local_date(&self, ts: &DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset).date_naive()
    }

    /// Interpret a local wall-clock datetime as an instant
    pub fn from_local(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Parse an instant.
    ///
    /// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM[:SS]` in this zone, or a
    /// bare `YYYY-MM-DD` which resolves to the start or end of that local day.
    pub fn parse_instant(&self, input: &str, bound: DayBound) -> Option<DateTime<Utc>> {
        let input = input.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
                return self.from_local(&naive);
            }
        }
        let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()?;
        let local = match bound {
            DayBound::Start => date.and_hms_opt(0, 0, 0)?,
            DayBound::End => date.and_hms_milli_opt(23, 59, 59, 999)?,
        };
        self.from_local(&local)
    }
}

/// Format an instant as `YYYY-MM-DDTHH:MM:SSZ`
pub fn format_iso_seconds(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Serde adapter for second-precision ISO timestamps
pub mod iso_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_iso_seconds(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::new(ts("2024-01-01T00:00:00Z"), ts("2024-01-02T00:00:00Z"));
        assert!(range.contains(&ts("2024-01-01T12:00:00Z")));
        assert!(range.contains(&ts("2024-01-02T00:00:00Z")));
        assert!(!range.contains(&ts("2024-01-02T00:00:01Z")));
        assert_eq!(range.duration(), Duration::days(1));
    }

    #[test]
    fn test_normalize_reading() {
        let reading = Reading::new("T1", ts("2024-01-01T10:00:00.750Z"), " 42.5 ");
        let normalized = reading.normalize().unwrap();
        assert_eq!(normalized.value, 42.5);
        assert_eq!(format_iso_seconds(&normalized.timestamp), "2024-01-01T10:00:00Z");

        assert!(Reading::new("T1", Utc::now(), "offline").normalize().is_none());
        assert!(Reading::new("T1", Utc::now(), "NaN").normalize().is_none());
    }

    #[test]
    fn test_normalized_reading_serde() {
        let normalized = Reading::new("T1", ts("2024-03-05T01:02:03.400Z"), "7")
            .normalize()
            .unwrap();
        let json = serde_json::to_value(normalized).unwrap();
        assert_eq!(json["timestamp"], "2024-03-05T01:02:03Z");

        let back: NormalizedReading = serde_json::from_value(json).unwrap();
        assert_eq!(back, normalized);
    }

    #[test]
    fn test_reference_zone_local_parts() {
        let zone = ReferenceZone::from_offset_minutes(330).unwrap();
        let instant = ts("2024-01-01T20:00:00Z");
        assert_eq!(zone.local_time(&instant), NaiveTime::from_hms_opt(1, 30, 0).unwrap());
        assert_eq!(zone.local_date(&instant), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_parse_instant_formats() {
        let zone = ReferenceZone::from_offset_minutes(330).unwrap();

        assert_eq!(
            zone.parse_instant("2024-01-01T10:00:00Z", DayBound::Start),
            Some(ts("2024-01-01T10:00:00Z"))
        );
        assert_eq!(
            zone.parse_instant("2024-01-01T05:30", DayBound::Start),
            Some(ts("2024-01-01T00:00:00Z"))
        );
        assert_eq!(
            zone.parse_instant("2024-01-02", DayBound::Start),
            Some(ts("2024-01-01T18:30:00Z"))
        );
        assert_eq!(
            zone.parse_instant("2024-01-02", DayBound::End),
            Some(ts("2024-01-02T18:29:59.999Z"))
        );
        assert_eq!(zone.parse_instant("yesterday", DayBound::Start), None);
    }

    #[test]
    fn test_topic_filter() {
        let topic = Topic::new("plant/boiler/temp", "boiler-1", "Boiler temperature");
        assert!(TopicFilter::All.matches(&topic));
        assert!(TopicFilter::Name("plant/boiler/temp".to_string()).matches(&topic));
        assert!(TopicFilter::Id(topic.id.clone()).matches(&topic));
        assert!(!TopicFilter::Name("plant/boiler/pressure".to_string()).matches(&topic));
    }
}
