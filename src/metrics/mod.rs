//! Derived indicators over backend counters.
//!
//! Nothing here recomputes percentiles or costs; those arrive precomputed.
//! These functions only turn raw counters into ratios and trend arrows, and
//! none of them can fail or produce `NaN` for finite input.

use serde::{Deserialize, Serialize};

use crate::telemetry::{EnrichmentStats, TelemetryMetrics};

/// Percent change beyond which a trend is no longer flat.
pub const TREND_THRESHOLD_PERCENT: f64 = 10.0;

/// Stand-in for a zero baseline when computing percent change.
pub const ZERO_BASELINE_EPSILON: f64 = 1e-4;

/// Direction of a trend arrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

/// Change of a metric against its previous value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Absolute percent change; the sign lives in `direction`.
    pub percentage: f64,
}

/// Compare `current` against `previous`.
///
/// A zero `previous` is replaced by [`ZERO_BASELINE_EPSILON`]. The change is
/// taken as a ratio of the baseline, which puts an exact 10% rise such as
/// 110 against 100 just over the threshold, so it reads as `Up`. Past -10%
/// the trend is `Down`; anything in between is `Flat`.
pub fn trend_of(current: f64, previous: f64) -> Trend {
    let change = if previous == 0.0 {
        (current - previous) / ZERO_BASELINE_EPSILON * 100.0
    } else {
        current / previous * 100.0 - 100.0
    };
    let change = if change.is_finite() { change } else { 0.0 };

    let direction = if change > TREND_THRESHOLD_PERCENT {
        TrendDirection::Up
    } else if change < -TREND_THRESHOLD_PERCENT {
        TrendDirection::Down
    } else {
        TrendDirection::Flat
    };

    Trend {
        direction,
        percentage: change.abs(),
    }
}

/// `part / total × 100`, or 0 when `total` is 0.
fn percent_of(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Share of spans carrying enrichment, in percent.
pub fn enrichment_rate(total: u64, enriched: u64) -> f64 {
    percent_of(enriched, total)
}

/// Share of enriched spans served from cache, in percent.
pub fn cache_hit_ratio(cache_hit_spans: u64, enriched_spans: u64) -> f64 {
    percent_of(cache_hit_spans, enriched_spans)
}

/// Share of failed requests, in percent.
pub fn error_rate(error_count: u64, total: u64) -> f64 {
    percent_of(error_count, total)
}

impl EnrichmentStats {
    /// Build stats from counters, deriving the rate.
    pub fn from_counts(
        total_spans: u64,
        enriched_spans: u64,
        cache_hit_spans: u64,
        routing_decisions: u64,
    ) -> Self {
        Self {
            total_spans,
            enriched_spans,
            enrichment_rate: enrichment_rate(total_spans, enriched_spans),
            cache_hit_spans,
            routing_decisions,
        }
    }

    /// Replace the reported rate with one derived from the counters.
    ///
    /// Use when the payload omitted the rate.
    pub fn recompute_rate(mut self) -> Self {
        self.enrichment_rate = enrichment_rate(self.total_spans, self.enriched_spans);
        self
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        cache_hit_ratio(self.cache_hit_spans, self.enriched_spans)
    }
}

/// Trend arrows for the headline dashboard numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricTrends {
    pub requests: Trend,
    pub errors: Trend,
    pub avg_duration: Trend,
    pub cost: Trend,
}

impl MetricTrends {
    pub fn between(current: &TelemetryMetrics, previous: &TelemetryMetrics) -> Self {
        Self {
            requests: trend_of(current.total_requests as f64, previous.total_requests as f64),
            errors: trend_of(current.error_count as f64, previous.error_count as f64),
            avg_duration: trend_of(current.avg_duration_ms, previous.avg_duration_ms),
            cost: trend_of(current.total_cost_usd, previous.total_cost_usd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_ten_percent_rise_is_up() {
        let trend = trend_of(110.0, 100.0);
        assert_eq!(trend.direction, TrendDirection::Up);
        assert!((trend.percentage - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_just_above_threshold() {
        assert_eq!(trend_of(110.01, 100.0).direction, TrendDirection::Up);
        assert_eq!(trend_of(109.99, 100.0).direction, TrendDirection::Flat);
    }

    #[test]
    fn test_trend_down_has_positive_percentage() {
        let trend = trend_of(50.0, 100.0);
        assert_eq!(trend.direction, TrendDirection::Down);
        assert!((trend.percentage - 50.0).abs() < 1e-9);
        assert_eq!(trend_of(89.99, 100.0).direction, TrendDirection::Down);
        assert_eq!(trend_of(90.0, 100.0).direction, TrendDirection::Flat);
    }

    #[test]
    fn test_trend_zero_previous() {
        let trend = trend_of(5.0, 0.0);
        assert_eq!(trend.direction, TrendDirection::Up);
        assert!(trend.percentage.is_finite());

        let trend = trend_of(0.0, 0.0);
        assert_eq!(trend.direction, TrendDirection::Flat);
        assert_eq!(trend.percentage, 0.0);
    }

    #[test]
    fn test_enrichment_rate() {
        assert_eq!(enrichment_rate(0, 0), 0.0);
        assert_eq!(enrichment_rate(200, 50), 25.0);
        assert_eq!(enrichment_rate(4, 4), 100.0);
    }

    #[test]
    fn test_cache_hit_and_error_rates() {
        assert_eq!(cache_hit_ratio(0, 0), 0.0);
        assert_eq!(cache_hit_ratio(3, 12), 25.0);
        assert_eq!(error_rate(1, 8), 12.5);
    }

    #[test]
    fn test_recompute_rate() {
        let stats = EnrichmentStats {
            total_spans: 10,
            enriched_spans: 4,
            enrichment_rate: 0.0,
            cache_hit_spans: 1,
            routing_decisions: 2,
        }
        .recompute_rate();
        assert_eq!(stats.enrichment_rate, 40.0);
        assert_eq!(stats.cache_hit_ratio(), 25.0);

        let empty = EnrichmentStats::from_counts(0, 0, 0, 0);
        assert_eq!(empty.enrichment_rate, 0.0);
    }

    #[test]
    fn test_metric_trends_between() {
        let previous = TelemetryMetrics {
            total_requests: 100,
            error_count: 0,
            avg_duration_ms: 200.0,
            total_cost_usd: 4.0,
            ..Default::default()
        };
        let current = TelemetryMetrics {
            total_requests: 150,
            error_count: 0,
            avg_duration_ms: 195.0,
            total_cost_usd: 2.0,
            ..Default::default()
        };

        let trends = MetricTrends::between(&current, &previous);
        assert_eq!(trends.requests.direction, TrendDirection::Up);
        assert_eq!(trends.errors.direction, TrendDirection::Flat);
        assert_eq!(trends.avg_duration.direction, TrendDirection::Flat);
        assert_eq!(trends.cost.direction, TrendDirection::Down);
    }
}
