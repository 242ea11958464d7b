//! UI-agnostic view models.
//!
//! Pure projections of store results into records a consumer can render
//! without further logic. Nothing here performs I/O or fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{error_rate, MetricTrends};
use crate::telemetry::{
    DashboardSnapshot, EnrichedSpanPage, EnrichmentStats, Pagination, SearchResponse,
    ServiceEdge, Span, SpanStatus, TelemetryMetrics, TraceSummary,
};
use crate::tree::SpanForest;

/// One span as a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRow {
    pub trace_id: String,
    pub span_id: String,
    pub operation_name: String,
    pub service_name: Option<String>,
    pub status: SpanStatus,
    pub duration_ms: f64,
    pub cost_usd: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Span> for SpanRow {
    fn from(span: &Span) -> Self {
        Self {
            trace_id: span.trace_id.clone(),
            span_id: span.span_id.clone(),
            operation_name: span.operation_name.clone(),
            service_name: span.service_name.clone(),
            status: span.status,
            duration_ms: span.duration_ms,
            cost_usd: span.cost_usd,
            timestamp: span.timestamp,
        }
    }
}

/// Pagination metadata with navigation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub total_pages: u32,
    pub total: u64,
    pub limit: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl From<Pagination> for PageInfo {
    fn from(p: Pagination) -> Self {
        let page = p.page.max(1);
        Self {
            page,
            total_pages: p.total_pages,
            total: p.total,
            limit: p.limit,
            has_next: page < p.total_pages,
            has_previous: page > 1,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPageView {
    pub rows: Vec<SpanRow>,
    pub page: PageInfo,
    /// Whether the page holds no rows ("no spans found").
    pub is_empty: bool,
}

/// Project one search response into table rows and paging flags.
pub fn search_view(response: &SearchResponse) -> SearchPageView {
    SearchPageView {
        rows: response.data.iter().map(SpanRow::from).collect(),
        page: response.pagination.into(),
        is_empty: response.data.is_empty(),
    }
}

/// A span in a trace waterfall, flattened out of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNodeRow {
    pub span: SpanRow,
    pub parent_span_id: Option<String>,
    pub depth: usize,
    pub child_count: usize,
    /// True when the declared parent was not part of the fetched spans.
    pub orphan: bool,
    /// Duration as a percentage of the longest span in the trace.
    pub duration_share: f64,
}

/// A single trace ready to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceDetailView {
    pub summary: TraceSummary,
    pub error_rate: f64,
    /// Depth-first rows: each root followed by its subtree.
    pub nodes: Vec<TraceNodeRow>,
    pub root_count: usize,
    pub max_depth: usize,
    /// Whether the trace exists but has no spans.
    pub is_empty: bool,
}

/// Flatten a trace forest into depth-first waterfall rows.
pub fn trace_view(summary: &TraceSummary, forest: &SpanForest) -> TraceDetailView {
    let longest = forest
        .nodes()
        .iter()
        .map(|n| n.span.duration_ms)
        .fold(0.0_f64, f64::max);

    let nodes: Vec<TraceNodeRow> = forest
        .walk_depth_first()
        .into_iter()
        .map(|(i, depth)| {
            let node = &forest.nodes()[i];
            let resolved_parent = node
                .parent()
                .map(|p| forest.nodes()[p].span.span_id.clone());
            TraceNodeRow {
                span: SpanRow::from(&node.span),
                parent_span_id: resolved_parent,
                depth,
                child_count: node.children().len(),
                orphan: forest.is_orphan(i),
                duration_share: if longest > 0.0 {
                    node.span.duration_ms / longest * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect();

    TraceDetailView {
        summary: summary.clone(),
        error_rate: error_rate(summary.error_count as u64, summary.total_spans as u64),
        max_depth: nodes.iter().map(|n| n.depth).max().unwrap_or(0),
        root_count: forest.roots().len(),
        is_empty: nodes.is_empty(),
        nodes,
    }
}

/// Enrichment counters with derived ratios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentView {
    pub stats: EnrichmentStats,
    pub cache_hit_ratio: f64,
    pub rows: Vec<EnrichedRow>,
    pub page: Option<PageInfo>,
}

/// An enriched span as a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRow {
    pub span: SpanRow,
    pub cache_hit: bool,
    pub routing_decision: Option<String>,
}

/// Enrichment counters with recomputed rates, plus the optional span page.
pub fn enrichment_view(stats: &EnrichmentStats, spans: Option<&EnrichedSpanPage>) -> EnrichmentView {
    let stats = stats.clone().recompute_rate();
    EnrichmentView {
        cache_hit_ratio: stats.cache_hit_ratio(),
        stats,
        rows: spans
            .map(|page| {
                page.data
                    .iter()
                    .map(|e| EnrichedRow {
                        span: SpanRow::from(&e.span),
                        cache_hit: e.cache_hit,
                        routing_decision: e.routing_decision.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        page: spans.map(|page| page.pagination.into()),
    }
}

/// Dashboard headline numbers with trend arrows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub metrics: TelemetryMetrics,
    pub error_rate: f64,
    /// Present when the snapshot carried a previous window to compare with.
    pub trends: Option<MetricTrends>,
    pub recent_errors: Vec<SpanRow>,
    pub service_dependencies: Vec<ServiceEdge>,
}

/// Headline metrics, with trends when a previous window is present.
pub fn dashboard_view(snapshot: &DashboardSnapshot) -> DashboardView {
    let metrics = &snapshot.metrics;
    DashboardView {
        error_rate: error_rate(metrics.error_count, metrics.total_requests),
        trends: snapshot
            .previous
            .as_ref()
            .map(|previous| MetricTrends::between(metrics, previous)),
        recent_errors: snapshot.recent_errors.iter().map(SpanRow::from).collect(),
        service_dependencies: snapshot.service_dependencies.clone(),
        metrics: metrics.clone(),
    }
}
