//! Row building, per-day reduction and pagination
//!
//! Two row shapes come out of here:
//!
//! - **Per-day rows** (`minPerDay` / `maxPerDay`): readings are bucketed by
//!   calendar day in the reference zone, then reduced per topic.
//! - **Exact rows** (`none` / `custom`): readings of every topic are merged by
//!   their second-precision timestamp.
//!
//! Either way each row holds a cell for every requested topic, with `"N/A"`
//! where that topic contributed nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::request::{AggregationMethod, ValueBounds};
use crate::types::{format_iso_seconds, NormalizedReading, ReferenceZone};

/// Placeholder for a topic without data in a row
pub const MISSING: &str = "N/A";

// =============================================================================
// Row Types
// =============================================================================

/// One cell of a report row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    /// The `"N/A"` cell
    pub fn missing() -> Self {
        Cell::Text(MISSING.to_string())
    }

    /// Whether this is the `"N/A"` cell
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Text(s) if s == MISSING)
    }
}

/// A report row: timestamp plus one cell per topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub timestamp: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Cell>,
}

impl ReportRow {
    fn empty(timestamp: String, topics: &[String]) -> Self {
        let values = topics.iter().map(|t| (t.clone(), Cell::missing())).collect();
        Self { timestamp, values }
    }
}

/// Readings fetched for one topic
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSeries {
    pub topic: String,
    /// Newest first
    pub readings: Vec<NormalizedReading>,
}

/// A paginated report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    pub report: Vec<ReportRow>,
    pub total_records: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

// =============================================================================
// Reduction
// =============================================================================

/// Reduce one topic's values for a day
///
/// Average renders as a two-decimal string; the others stay numeric.
pub fn reduce(values: &[f64], method: AggregationMethod) -> Cell {
    if values.is_empty() {
        return Cell::missing();
    }

    match method {
        AggregationMethod::Average => {
            // Welford's algorithm
            let mut mean = 0.0f64;
            let mut count = 0u64;
            for &v in values {
                count += 1;
                mean += (v - mean) / count as f64;
            }
            Cell::Text(format!("{:.2}", mean))
        }
        AggregationMethod::Sum => {
            // Kahan summation
            let mut sum = 0.0f64;
            let mut c = 0.0f64;
            for &v in values {
                let y = v - c;
                let t = sum + y;
                c = (t - sum) - y;
                sum = t;
            }
            Cell::Number(sum)
        }
        AggregationMethod::Min => {
            Cell::Number(values.iter().cloned().fold(f64::INFINITY, f64::min))
        }
        AggregationMethod::Max => {
            Cell::Number(values.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
        }
    }
}

// =============================================================================
// Row Builders
// =============================================================================

/// One row per local calendar day, newest day first
pub fn per_day_rows(
    series: &[TopicSeries],
    topics: &[String],
    zone: &ReferenceZone,
    method: AggregationMethod,
) -> Vec<ReportRow> {
    let mut days: BTreeMap<NaiveDate, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();

    for s in series {
        for reading in &s.readings {
            days.entry(zone.local_date(&reading.timestamp))
                .or_default()
                .entry(s.topic.as_str())
                .or_default()
                .push(reading.value);
        }
    }

    days.into_iter()
        .rev()
        .map(|(day, by_topic)| {
            let mut row = ReportRow::empty(day.format("%Y-%m-%d").to_string(), topics);
            for (topic, values) in by_topic {
                row.values.insert(topic.to_string(), reduce(&values, method));
            }
            row
        })
        .collect()
}

/// Rows keyed by exact timestamp, newest first
///
/// With `bounds`, out-of-range readings are skipped before they can create or
/// fill a row. When a topic has several readings in one second the one
/// visited last wins.
pub fn merged_rows(
    series: &[TopicSeries],
    topics: &[String],
    bounds: Option<&ValueBounds>,
) -> Vec<ReportRow> {
    let mut rows: BTreeMap<DateTime<Utc>, ReportRow> = BTreeMap::new();

    for s in series {
        for reading in &s.readings {
            if bounds.is_some_and(|b| !b.contains(reading.value)) {
                continue;
            }
            rows.entry(reading.timestamp)
                .or_insert_with(|| ReportRow::empty(format_iso_seconds(&reading.timestamp), topics))
                .values
                .insert(s.topic.clone(), Cell::Number(reading.value));
        }
    }

    rows.into_values().rev().collect()
}

// =============================================================================
// Pagination
// =============================================================================

/// Slice rows into a page; a page past the end is empty
pub fn paginate(rows: Vec<ReportRow>, page: usize, limit: usize) -> ReportPage {
    let total_records = rows.len();
    let limit = limit.max(1);
    let page = page.max(1);
    let total_pages = total_records.div_ceil(limit);

    let report = rows
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    ReportPage {
        report,
        total_records,
        page,
        limit,
        total_pages,
    }
}
