//! Prometheus counters for the cache gateway
//!
//! Rendered in text exposition format by the `/metrics` endpoint.

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

/// Cache gateway counters registered on a private registry
#[derive(Clone)]
pub struct CacheMetrics {
    registry: Registry,
    /// Reads answered from the cache
    pub hits: IntCounter,
    /// Reads that fell through to the store
    pub misses: IntCounter,
    /// Swallowed backend failures
    pub errors: IntCounter,
    /// Operations skipped because the connection flag was down
    pub skipped: IntCounter,
    /// Keys deleted by the invalidation coordinator
    pub invalidations: IntCounter,
}

impl CacheMetrics {
    /// Create and register all counters under the given prefix
    pub fn new(prefix: &str) -> Self {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            let counter = IntCounter::with_opts(Opts::new(format!("{}_{}", prefix, name), help))
                .expect("metric name is a valid identifier");
            if let Err(e) = registry.register(Box::new(counter.clone())) {
                tracing::warn!(error = %e, "Failed to register cache counter");
            }
            counter
        };

        let hits = counter("cache_hits_total", "Reads answered from the cache");
        let misses = counter("cache_misses_total", "Reads that fell through to the store");
        let errors = counter(
            "cache_errors_total",
            "Cache backend failures swallowed by the gateway",
        );
        let skipped = counter(
            "cache_skipped_total",
            "Cache operations skipped while the connection was unavailable",
        );
        let invalidations = counter(
            "cache_invalidations_total",
            "Cache keys deleted after mutations",
        );

        Self {
            registry,
            hits,
            misses,
            errors,
            skipped,
            invalidations,
        }
    }

    /// Hit ratio in percent, 0 before any read
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.get();
        let total = hits + self.misses.get();
        if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Export all counters in Prometheus text format
    pub fn export(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode cache metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new("telemetry_hub")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_counters() {
        let metrics = CacheMetrics::new("test");
        metrics.hits.inc();
        metrics.misses.inc_by(3);

        let output = metrics.export();
        assert!(output.contains("test_cache_hits_total 1"));
        assert!(output.contains("test_cache_misses_total 3"));
        assert!(output.contains("# TYPE test_cache_errors_total counter"));
    }

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics::default();
        assert_eq!(metrics.hit_rate(), 0.0);
        metrics.hits.inc();
        metrics.misses.inc();
        assert!((metrics.hit_rate() - 50.0).abs() < f64::EPSILON);
    }
}
