//! Report request parsing and validation

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::window::TimeOfDayWindow;
use crate::error::{Error, Result};
use crate::types::{DayBound, ReferenceZone, TimeRange};

// =============================================================================
// Request Enums
// =============================================================================

/// How readings are filtered and shaped into rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterType {
    /// Merge raw readings by timestamp
    #[default]
    None,
    /// Merge raw readings, dropping values outside `[minValue, maxValue]`
    Custom,
    /// One row per day, reduced with the aggregation method (default min)
    MinPerDay,
    /// One row per day, reduced with the aggregation method (default max)
    MaxPerDay,
}

impl FilterType {
    /// Whether rows are per calendar day
    pub fn is_per_day(&self) -> bool {
        matches!(self, FilterType::MinPerDay | FilterType::MaxPerDay)
    }
}

/// Per-day reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Average,
    Sum,
    Min,
    Max,
}

/// A JSON number or a numeric string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|n| n.is_finite())
    }

    fn is_blank(&self) -> bool {
        matches!(self, Numeric::Text(s) if s.trim().is_empty())
    }
}

// =============================================================================
// Request
// =============================================================================

/// Body of a report request, as received
///
/// The whole object is the report's cache key parameter, so it serializes
/// back exactly as it was parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(default)]
    pub topics: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default)]
    pub filter_type: FilterType,
    pub min_value: Option<Numeric>,
    pub max_value: Option<Numeric>,
    pub page: Option<Numeric>,
    pub limit: Option<Numeric>,
    pub aggregation_method: Option<AggregationMethod>,
    pub start_time_of_day: Option<String>,
    pub end_time_of_day: Option<String>,
}

/// Validation limits
#[derive(Debug, Clone, Copy)]
pub struct ReportLimits {
    pub max_topics: usize,
    pub max_range_days: i64,
    pub default_limit: usize,
}

impl Default for ReportLimits {
    fn default() -> Self {
        Self {
            max_topics: 5,
            max_range_days: 365,
            default_limit: 1000,
        }
    }
}

/// Inclusive value bounds for the custom filter
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ValueBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ValueBounds {
    /// Check a value against both bounds
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Report parameters after validation
#[derive(Debug, Clone)]
pub struct ValidatedReport {
    /// Distinct topics in request order
    pub topics: Vec<String>,
    pub range: TimeRange,
    pub filter: FilterType,
    pub bounds: ValueBounds,
    /// Resolved reduction for per-day filters
    pub aggregation: AggregationMethod,
    pub window: Option<TimeOfDayWindow>,
    pub page: usize,
    pub limit: usize,
}

impl ReportRequest {
    /// Validate and resolve defaults
    pub fn validate(&self, zone: &ReferenceZone, limits: &ReportLimits) -> Result<ValidatedReport> {
        let mut topics: Vec<String> = Vec::with_capacity(self.topics.len());
        for topic in &self.topics {
            let topic = topic.trim();
            if topic.is_empty() {
                return Err(Error::validation("Topic names cannot be empty"));
            }
            if !topics.iter().any(|t| t == topic) {
                topics.push(topic.to_string());
            }
        }
        if topics.is_empty() || topics.len() > limits.max_topics {
            return Err(Error::validation(format!(
                "Please select between 1 and {} topics",
                limits.max_topics
            )));
        }

        let from = required_instant(self.from.as_deref(), "from", zone, DayBound::Start)?;
        let to = required_instant(self.to.as_deref(), "to", zone, DayBound::End)?;
        if from > to {
            return Err(Error::validation("'from' must not be after 'to'"));
        }
        // bare `to` dates end at 23:59:59.999, so a full extra day is the first rejected span
        if to - from >= Duration::days(limits.max_range_days + 1) {
            return Err(Error::validation(format!(
                "Date range cannot exceed {} days",
                limits.max_range_days
            )));
        }

        let page = positive(self.page.as_ref(), "page")?.unwrap_or(1);
        let limit = positive(self.limit.as_ref(), "limit")?.unwrap_or(limits.default_limit);

        let bounds = ValueBounds {
            min: optional_number(self.min_value.as_ref(), "minValue")?,
            max: optional_number(self.max_value.as_ref(), "maxValue")?,
        };
        if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
            if min > max {
                return Err(Error::validation("minValue must not exceed maxValue"));
            }
        }

        let window = TimeOfDayWindow::parse(
            self.start_time_of_day.as_deref(),
            self.end_time_of_day.as_deref(),
        )
        .map_err(Error::Validation)?;

        let aggregation = match (self.aggregation_method, self.filter_type) {
            (Some(method), _) => method,
            (None, FilterType::MaxPerDay) => AggregationMethod::Max,
            (None, _) => AggregationMethod::Min,
        };

        Ok(ValidatedReport {
            topics,
            range: TimeRange::new(from, to),
            filter: self.filter_type,
            bounds,
            aggregation,
            window,
            page,
            limit,
        })
    }
}

fn required_instant(
    raw: Option<&str>,
    field: &str,
    zone: &ReferenceZone,
    bound: DayBound,
) -> Result<chrono::DateTime<chrono::Utc>> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::validation(format!("'{}' date is required", field)))?;
    zone.parse_instant(raw, bound)
        .ok_or_else(|| Error::validation(format!("Invalid '{}' date: {}", field, raw)))
}

fn optional_number(raw: Option<&Numeric>, field: &str) -> Result<Option<f64>> {
    match raw {
        None => Ok(None),
        Some(n) if n.is_blank() => Ok(None),
        Some(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| Error::validation(format!("{} must be a number", field))),
    }
}

fn positive(raw: Option<&Numeric>, field: &str) -> Result<Option<usize>> {
    let Some(value) = optional_number(raw, field)? else {
        return Ok(None);
    };
    if value < 1.0 || value.fract() != 0.0 {
        return Err(Error::validation(format!("{} must be a positive integer", field)));
    }
    Ok(Some(value as usize))
}
