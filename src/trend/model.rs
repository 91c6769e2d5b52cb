//! Step inference, linear fit and forecast

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{NormalizedReading, TrendModel};

/// Step used when no positive gap exists
pub const FALLBACK_STEP_SECONDS: i64 = 60;

/// Number of trailing gaps considered for the step
pub const STEP_GAPS: usize = 10;

/// Number of trailing points the line is fitted on
pub const FIT_POINTS: usize = 50;

/// A forecast point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    #[serde(with = "crate::types::iso_seconds")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Median of the last positive gaps between consecutive points, in seconds
///
/// `points` must be in ascending time order.
pub fn infer_step(points: &[NormalizedReading]) -> i64 {
    let tail = &points[points.len().saturating_sub(STEP_GAPS + 1)..];
    let mut gaps: Vec<f64> = tail
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_milliseconds() as f64 / 1000.0)
        .filter(|gap| *gap > 0.0)
        .collect();

    if gaps.is_empty() {
        return FALLBACK_STEP_SECONDS;
    }

    gaps.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = gaps.len() / 2;
    let median = if gaps.len() % 2 == 0 {
        (gaps[mid - 1] + gaps[mid]) / 2.0
    } else {
        gaps[mid]
    };

    (median.round() as i64).max(1)
}

/// Least-squares line over sample indices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Points the line was fitted on
    pub n: usize,
}

impl LinearFit {
    /// Fit value against index over the last [`FIT_POINTS`] points
    ///
    /// With no points the line is flat at `fallback`.
    pub fn fit(points: &[NormalizedReading], fallback: f64) -> Self {
        let tail = &points[points.len().saturating_sub(FIT_POINTS)..];
        let n = tail.len();
        if n == 0 {
            return Self {
                slope: 0.0,
                intercept: fallback,
                n,
            };
        }

        let mean_x = (n as f64 - 1.0) / 2.0;
        let mean_y = tail.iter().map(|p| p.value).sum::<f64>() / n as f64;

        let mut num = 0.0f64;
        let mut den = 0.0f64;
        for (i, p) in tail.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (p.value - mean_y);
            den += dx * dx;
        }

        let slope = if den == 0.0 { 0.0 } else { num / den };
        Self {
            slope,
            intercept: mean_y - slope * mean_x,
            n,
        }
    }

    /// Value at a sample index
    pub fn at(&self, index: usize) -> f64 {
        self.intercept + self.slope * index as f64
    }

    /// Extrapolate `horizon` points spaced `step_seconds` after `last_known`
    pub fn forecast(
        &self,
        last_known: DateTime<Utc>,
        step_seconds: i64,
        horizon: usize,
    ) -> Vec<ForecastPoint> {
        (0..horizon)
            .map(|i| ForecastPoint {
                timestamp: last_known + Duration::seconds(step_seconds * (i as i64 + 1)),
                value: self.at(self.n + i),
            })
            .collect()
    }

    /// Snapshot as a model record
    pub fn to_model(&self, step_seconds: i64, computed_at: DateTime<Utc>) -> TrendModel {
        TrendModel {
            slope: self.slope,
            intercept: self.intercept,
            step_seconds,
            sample_count: self.n,
            computed_at,
        }
    }
}
