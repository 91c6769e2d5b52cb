//! Trend Predictor
//!
//! Short-horizon linear extrapolation from recent readings. Two windows are
//! read for each request:
//!
//! - the **display window**, selected by timeframe or explicit start time and
//!   capped at the requested limit, returned as history;
//! - the **modeling window**, always the last two hours, which the sampling
//!   step and the line are derived from.
//!
//! Each fitted model is also recorded in the advisory [`TrendModelRegistry`].

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use futures_util::future::try_join;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheGateway, Operation};
use crate::error::{Error, Result};
use crate::store::TelemetryStore;
use crate::types::{NormalizedReading, SortOrder, TimeRange, TrendModel};

pub mod model;
pub mod registry;

pub use model::{infer_step, ForecastPoint, LinearFit};
pub use registry::TrendModelRegistry;

/// Display window limit bounds and default
pub const MIN_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 10_000;
pub const DEFAULT_LIMIT: usize = 2_000;

/// Forecast horizon bounds and default
pub const MIN_HORIZON: usize = 1;
pub const MAX_HORIZON: usize = 200;
pub const DEFAULT_HORIZON: usize = 30;

// =============================================================================
// Query
// =============================================================================

/// History timeframe selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeframe {
    OneHour,
    #[default]
    TwoHours,
    OneDay,
    OneWeek,
    OneMonth,
}

impl Timeframe {
    /// Parse a timeframe code; anything unknown is the two-hour default
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "1H" => Timeframe::OneHour,
            "1D" => Timeframe::OneDay,
            "1W" => Timeframe::OneWeek,
            "1M" => Timeframe::OneMonth,
            _ => Timeframe::TwoHours,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1H",
            Timeframe::TwoHours => "2h",
            Timeframe::OneDay => "1D",
            Timeframe::OneWeek => "1W",
            Timeframe::OneMonth => "1M",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::OneHour => Duration::hours(1),
            Timeframe::TwoHours => Duration::hours(2),
            Timeframe::OneDay => Duration::days(1),
            Timeframe::OneWeek => Duration::days(7),
            Timeframe::OneMonth => Duration::days(30),
        }
    }
}

/// Where the display window starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySelector {
    Timeframe(Timeframe),
    Since(DateTime<Utc>),
}

impl HistorySelector {
    /// Window start relative to `now`
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            HistorySelector::Timeframe(tf) => now - tf.duration(),
            HistorySelector::Since(start) => *start,
        }
    }

    /// Stable label used in responses and cache keys
    pub fn label(&self) -> String {
        match self {
            HistorySelector::Timeframe(tf) => tf.as_str().to_string(),
            HistorySelector::Since(start) => format!("since:{}", start.timestamp()),
        }
    }
}

/// Prediction query string, taken leniently
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionQuery {
    pub timeframe: Option<String>,
    pub limit: Option<String>,
    pub horizon: Option<String>,
    pub start_time: Option<String>,
}

/// Query after defaults and clamping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPrediction {
    pub history: HistorySelector,
    pub limit: usize,
    pub horizon: usize,
}

impl PredictionQuery {
    /// Apply defaults; non-numeric values fall back silently
    pub fn resolve(&self) -> ResolvedPrediction {
        let since = self
            .start_time
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        let history = match since {
            Some(start) => HistorySelector::Since(start),
            None => HistorySelector::Timeframe(
                self.timeframe.as_deref().map(Timeframe::parse).unwrap_or_default(),
            ),
        };

        ResolvedPrediction {
            history,
            limit: clamped(self.limit.as_deref(), DEFAULT_LIMIT, MIN_LIMIT, MAX_LIMIT),
            horizon: clamped(self.horizon.as_deref(), DEFAULT_HORIZON, MIN_HORIZON, MAX_HORIZON),
        }
    }
}

fn clamped(raw: Option<&str>, default: usize, min: usize, max: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .map(|n| n.clamp(min as i64, max as i64) as usize)
        .unwrap_or(default)
}

// =============================================================================
// Result
// =============================================================================

/// Prediction response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub topic: String,
    pub timeframe: String,
    pub limit: usize,
    pub horizon: usize,
    /// Display window, oldest first
    pub history: Vec<NormalizedReading>,
    /// Modeling window, oldest first
    pub model_window: Vec<NormalizedReading>,
    pub forecast: Vec<ForecastPoint>,
    pub model: TrendModel,
}

#[derive(Serialize)]
struct PredictionKey<'a> {
    topic: &'a str,
    history: String,
    limit: usize,
    horizon: usize,
}

// =============================================================================
// Predictor
// =============================================================================

/// Computes and caches forecasts
#[derive(Clone)]
pub struct TrendPredictor {
    store: Arc<dyn TelemetryStore>,
    cache: CacheGateway,
    registry: Arc<TrendModelRegistry>,
}

impl TrendPredictor {
    /// Create a predictor
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        cache: CacheGateway,
        registry: Arc<TrendModelRegistry>,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
        }
    }

    /// Advisory model registry
    pub fn registry(&self) -> &TrendModelRegistry {
        &self.registry
    }

    /// Forecast a topic
    pub async fn predict(&self, topic: &str, query: &PredictionQuery) -> Result<PredictionResult> {
        if topic.trim().is_empty() {
            return Err(Error::validation("Topic is required"));
        }
        let resolved = query.resolve();

        let key = self.cache.key_for(
            Operation::Prediction,
            &PredictionKey {
                topic,
                history: resolved.history.label(),
                limit: resolved.limit,
                horizon: resolved.horizon,
            },
        );
        if let Some(cached) = self.cache.get::<PredictionResult>(&key).await {
            return Ok(cached);
        }

        let now = Utc::now();
        let display_range = TimeRange::new(resolved.history.start(now), now);
        let model_range = TimeRange::new(now - Duration::hours(2), now);

        let (history, model_window) = try_join(
            self.window(topic, display_range, resolved.limit),
            self.window(topic, model_range, MAX_LIMIT),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, topic = %topic, "Prediction fetch failed");
            e
        })?;

        let step = infer_step(&model_window);
        let fallback = history.last().map(|r| r.value).unwrap_or(0.0);
        let fit = LinearFit::fit(&model_window, fallback);
        let last_known = history
            .last()
            .or(model_window.last())
            .map(|r| r.timestamp)
            .unwrap_or_else(|| now.trunc_subsecs(0));

        let forecast = fit.forecast(last_known, step, resolved.horizon);
        let model = fit.to_model(step, now);
        self.registry.record(topic, model);

        let result = PredictionResult {
            topic: topic.to_string(),
            timeframe: resolved.history.label(),
            limit: resolved.limit,
            horizon: resolved.horizon,
            history,
            model_window,
            forecast,
            model,
        };

        self.cache.set(&key, &result, Operation::Prediction.ttl()).await;
        tracing::debug!(
            topic = %topic,
            slope = model.slope,
            step_seconds = step,
            samples = model.sample_count,
            "Prediction computed"
        );
        Ok(result)
    }

    /// Most recent `limit` readings in range, oldest first
    async fn window(
        &self,
        topic: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<NormalizedReading>> {
        let mut readings: Vec<NormalizedReading> = self
            .store
            .find_readings(topic, range, SortOrder::Descending, Some(limit))
            .await?
            .iter()
            .filter_map(|r| r.normalize())
            .collect();
        readings.reverse();
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DisabledBackend, KeyBuilder, MemoryBackend};
    use crate::store::MemoryStore;

    fn query(pairs: &[(&str, &str)]) -> PredictionQuery {
        let mut q = PredictionQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "timeframe" => q.timeframe = v,
                "limit" => q.limit = v,
                "horizon" => q.horizon = v,
                "start_time" => q.start_time = v,
                _ => {}
            }
        }
        q
    }

    fn predictor(store: Arc<MemoryStore>) -> TrendPredictor {
        TrendPredictor::new(
            store,
            CacheGateway::ready(Arc::new(MemoryBackend::new()), KeyBuilder::new("mqtt")),
            Arc::new(TrendModelRegistry::new(8)),
        )
    }

    #[test]
    fn test_resolve_defaults_and_clamping() {
        let resolved = query(&[]).resolve();
        assert_eq!(resolved.history, HistorySelector::Timeframe(Timeframe::TwoHours));
        assert_eq!(resolved.limit, DEFAULT_LIMIT);
        assert_eq!(resolved.horizon, DEFAULT_HORIZON);

        let resolved = query(&[("limit", "3"), ("horizon", "900"), ("timeframe", "1W")]).resolve();
        assert_eq!(resolved.limit, MIN_LIMIT);
        assert_eq!(resolved.horizon, MAX_HORIZON);
        assert_eq!(resolved.history, HistorySelector::Timeframe(Timeframe::OneWeek));

        let resolved = query(&[("limit", "lots"), ("horizon", ""), ("timeframe", "5Y")]).resolve();
        assert_eq!(resolved.limit, DEFAULT_LIMIT);
        assert_eq!(resolved.horizon, DEFAULT_HORIZON);
        assert_eq!(resolved.history.label(), "2h");

        let resolved = query(&[("start_time", "1700000000"), ("timeframe", "1D")]).resolve();
        assert_eq!(resolved.history.label(), "since:1700000000");
    }

    #[test]
    fn test_timeframe_durations() {
        assert_eq!(Timeframe::OneMonth.duration(), Duration::days(30));
        assert_eq!(Timeframe::OneWeek.duration(), Duration::days(7));
        assert_eq!(Timeframe::parse("1H").as_str(), "1H");
    }

    #[tokio::test]
    async fn test_predict_linear_trend() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for i in 0..20i64 {
            store.record("T1", now - Duration::seconds(60 * (20 - i)), format!("{}", i * 2));
        }
        store.record("T1", now - Duration::seconds(30), "garbage");

        let predictor = predictor(store);
        let result = predictor.predict("T1", &query(&[("horizon", "3")])).await.unwrap();

        assert_eq!(result.history.len(), 20);
        assert_eq!(result.model.step_seconds, 60);
        assert!((result.model.slope - 2.0).abs() < 1e-6);
        assert_eq!(result.forecast.len(), 3);
        assert!((result.forecast[0].value - 40.0).abs() < 1e-6);
        assert_eq!(
            result.forecast[0].timestamp,
            result.history.last().unwrap().timestamp + Duration::seconds(60)
        );
        assert!(predictor.registry().get("T1").is_some());
    }

    #[tokio::test]
    async fn test_predict_flat_when_modeling_window_empty() {
        let store = Arc::new(MemoryStore::new());
        let old = Utc::now() - Duration::hours(5);
        store.record("T1", old, "12.5");

        let result = predictor(store)
            .predict("T1", &query(&[("timeframe", "1D"), ("horizon", "4")]))
            .await
            .unwrap();

        assert!(result.model_window.is_empty());
        assert_eq!(result.model.slope, 0.0);
        assert!(result.forecast.iter().all(|p| p.value == 12.5));
        assert_eq!(result.model.step_seconds, model::FALLBACK_STEP_SECONDS);
    }

    #[tokio::test]
    async fn test_display_window_keeps_most_recent() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for i in 0..30i64 {
            store.record("T1", now - Duration::seconds(i * 10 + 1), "1");
        }

        let result = predictor(store)
            .predict("T1", &query(&[("limit", "10")]))
            .await
            .unwrap();
        assert_eq!(result.history.len(), 10);
        assert!(result.history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(now - result.history[0].timestamp < Duration::seconds(100));
    }

    #[tokio::test]
    async fn test_cached_prediction_matches_computed() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let raws = ["0.00043080333908418635", "0.1", "0.30000000000000004", "2.718281828459045"];
        for (i, raw) in raws.iter().enumerate() {
            store.record("T1", now - Duration::seconds(60 * (4 - i as i64)), *raw);
        }

        let cached = predictor(store.clone());
        let uncached = TrendPredictor::new(
            store,
            CacheGateway::ready(Arc::new(DisabledBackend), KeyBuilder::new("mqtt")),
            Arc::new(TrendModelRegistry::new(8)),
        );

        let q = query(&[("horizon", "5")]);
        let first = cached.predict("T1", &q).await.unwrap();
        let hit = cached.predict("T1", &q).await.unwrap();
        let plain = uncached.predict("T1", &q).await.unwrap();

        assert_eq!(first, hit);
        assert_eq!(hit.history[0].value, 0.00043080333908418635);
        assert_eq!(hit.history, plain.history);
        assert_eq!(hit.model_window, plain.model_window);
        assert_eq!(hit.forecast, plain.forecast);
        assert_eq!(hit.model.slope, plain.model.slope);
        assert_eq!(hit.model.intercept, plain.model.intercept);
    }

    #[tokio::test]
    async fn test_store_error_is_upstream() {
        let store = Arc::new(MemoryStore::new());
        store.inject_failure(Some("timeout"));
        let err = predictor(store).predict("T1", &query(&[])).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert!(err.to_string().contains("timeout"));
    }
}
