//! Multi-topic Report Aggregator
//!
//! Turns a report request into a paginated table:
//!
//! ```text
//! ReportRequest ──validate──▶ ValidatedReport
//!                                  │
//!            ┌─────────────────────┼─────────────────────┐
//!            ▼                     ▼                     ▼
//!     readings(T1)          readings(T2)   ...    readings(Tn)     cache (SHORT) → store
//!            └─────────────────────┼─────────────────────┘
//!                                  ▼
//!                        time-of-day window
//!                                  │
//!              ┌───────────────────┴───────────────────┐
//!              ▼                                       ▼
//!      per-day reduction                      merge by timestamp
//!   (minPerDay / maxPerDay)                    (none / custom)
//!              └───────────────────┬───────────────────┘
//!                                  ▼
//!                  sort desc → paginate → cache (MEDIUM)
//! ```

use std::sync::Arc;

use futures_util::future::try_join_all;
use serde::Serialize;

use crate::cache::{CacheGateway, Operation};
use crate::error::{Error, Result};
use crate::store::TelemetryStore;
use crate::types::{NormalizedReading, ReferenceZone, SortOrder, TimeRange};

pub mod aggregate;
pub mod request;
pub mod window;

pub use aggregate::{Cell, ReportPage, ReportRow, TopicSeries};
pub use request::{AggregationMethod, FilterType, ReportLimits, ReportRequest, ValidatedReport};
pub use window::TimeOfDayWindow;

/// Cache key parameters of a per-topic reading window
#[derive(Serialize)]
struct ReadingWindowKey<'a> {
    topic: &'a str,
    from: String,
    to: String,
}

/// Builds reports from cached or stored readings
#[derive(Clone)]
pub struct ReportAggregator {
    store: Arc<dyn TelemetryStore>,
    cache: CacheGateway,
    zone: ReferenceZone,
    limits: ReportLimits,
}

impl ReportAggregator {
    /// Create an aggregator
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        cache: CacheGateway,
        zone: ReferenceZone,
        limits: ReportLimits,
    ) -> Self {
        Self {
            store,
            cache,
            zone,
            limits,
        }
    }

    /// Validate, compute and cache a report page
    pub async fn generate(&self, request: &ReportRequest) -> Result<ReportPage> {
        let report = request.validate(&self.zone, &self.limits)?;

        let key = self.cache.key_for(Operation::Report, request);
        if let Some(page) = self.cache.get::<ReportPage>(&key).await {
            return Ok(page);
        }

        let series = try_join_all(
            report
                .topics
                .iter()
                .map(|topic| self.topic_series(topic, report.range, report.window.as_ref())),
        )
        .await?;

        let page = self.build(&report, &series)?;
        self.cache.set(&key, &page, Operation::Report.ttl()).await;

        tracing::debug!(
            topics = report.topics.len(),
            total_records = page.total_records,
            page = page.page,
            "Report generated"
        );
        Ok(page)
    }

    /// Shape fetched series into a page; no rows at all is a not-found
    pub fn build(&self, report: &ValidatedReport, series: &[TopicSeries]) -> Result<ReportPage> {
        let rows = if report.filter.is_per_day() {
            aggregate::per_day_rows(series, &report.topics, &self.zone, report.aggregation)
        } else {
            let bounds = (report.filter == FilterType::Custom).then_some(&report.bounds);
            aggregate::merged_rows(series, &report.topics, bounds)
        };

        if rows.is_empty() {
            return Err(Error::not_found("No data found for the given criteria"));
        }
        Ok(aggregate::paginate(rows, report.page, report.limit))
    }

    async fn topic_series(
        &self,
        topic: &str,
        range: TimeRange,
        window: Option<&TimeOfDayWindow>,
    ) -> Result<TopicSeries> {
        let mut readings = self.readings(topic, range).await?;
        if let Some(window) = window {
            readings.retain(|r| window.contains(&self.zone.local_time(&r.timestamp)));
        }
        Ok(TopicSeries {
            topic: topic.to_string(),
            readings,
        })
    }

    /// Normalized readings of a topic, newest first
    pub async fn readings(&self, topic: &str, range: TimeRange) -> Result<Vec<NormalizedReading>> {
        let key = self.cache.key_for(
            Operation::Readings,
            &ReadingWindowKey {
                topic,
                from: range.start.to_rfc3339(),
                to: range.end.to_rfc3339(),
            },
        );
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let readings: Vec<NormalizedReading> = self
            .store
            .find_readings(topic, range, SortOrder::Descending, None)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, topic = %topic, "Failed to fetch report readings");
                e
            })?
            .iter()
            .filter_map(|r| r.normalize())
            .collect();

        self.cache.set(&key, &readings, Operation::Readings.ttl()).await;
        Ok(readings)
    }
}
