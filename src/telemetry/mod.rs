//! Span store client for the remote telemetry API.
//!
//! This module provides:
//! - [`TelemetryClient`]: HTTP client with response caching and per-key
//!   request de-duplication
//! - [`SpanStore`]: the read interface the explorer consumes
//! - [`RequestSequencer`]: per-slot request numbering for stale-response discard
//! - Wire types for spans, traces, metrics and enrichment

mod cache;
mod client;
mod sequence;
mod types;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use cache::{FetchLock, QueryCache};
pub use client::TelemetryClient;
pub use sequence::{RequestSequencer, RequestTicket};
pub use types::*;

use async_trait::async_trait;

use crate::error::TelemetryResult;
use crate::query::QueryFilters;

/// Whether a read may be answered from cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Serve a fresh cached response if there is one.
    #[default]
    CacheFirst,
    /// Always go to the network and refresh the cache. Used for explicit
    /// user refetches and polling.
    NetworkOnly,
}

/// Read access to a telemetry span store.
///
/// Every operation is read-only. Implementations surface failures unchanged;
/// they never turn an error into an empty success.
#[async_trait]
pub trait SpanStore: Send + Sync {
    /// Paginated multi-trace span search.
    async fn search(
        &self,
        filters: &QueryFilters,
        policy: FetchPolicy,
    ) -> TelemetryResult<SearchResponse>;

    /// All spans of one trace plus its summary.
    async fn fetch_trace(&self, trace_id: &str, policy: FetchPolicy)
        -> TelemetryResult<TraceDetail>;

    /// Backend-computed metrics for a timeframe.
    async fn metrics(
        &self,
        timeframe: Timeframe,
        policy: FetchPolicy,
    ) -> TelemetryResult<TelemetryMetrics>;

    /// Current dashboard snapshot.
    async fn dashboard(&self, policy: FetchPolicy) -> TelemetryResult<DashboardSnapshot>;

    /// Paginated listing of enriched spans.
    async fn enrichment_spans(
        &self,
        filters: &QueryFilters,
        policy: FetchPolicy,
    ) -> TelemetryResult<EnrichedSpanPage>;

    /// Enrichment counters.
    async fn enrichment_stats(&self, policy: FetchPolicy) -> TelemetryResult<EnrichmentStats>;
}
