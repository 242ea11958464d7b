use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::TelemetryError;

/// Completion status of a span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[serde(alias = "ok")]
    Success,
    Error,
    #[default]
    #[serde(other)]
    Unset,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Success => "success",
            SpanStatus::Error => "error",
            SpanStatus::Unset => "unset",
        }
    }
}

impl std::fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SpanStatus {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" | "ok" => Ok(SpanStatus::Success),
            "error" => Ok(SpanStatus::Error),
            "unset" => Ok(SpanStatus::Unset),
            other => Err(TelemetryError::invalid_argument(
                "status",
                format!("unknown span status '{}'", other),
            )),
        }
    }
}

/// One timed operation within a trace, as delivered by the telemetry store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    /// Declared parent. Empty strings are read as absent.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(deserialize_with = "non_negative_duration")]
    pub duration_ms: f64,
    #[serde(default)]
    pub status: SpanStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn non_negative_duration<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Ok(0.0)
    }
}

impl Span {
    /// Create a span with the required identity fields; everything else empty.
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        operation_name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
            operation_name: operation_name.into(),
            service_name: None,
            duration_ms: 0.0,
            status: SpanStatus::Unset,
            timestamp,
            cost_usd: None,
            attributes: Map::new(),
        }
    }

    /// Set the parent span id. An empty id leaves the span parentless.
    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        let parent = parent_span_id.into();
        self.parent_span_id = if parent.trim().is_empty() {
            None
        } else {
            Some(parent)
        };
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = if duration_ms.is_finite() {
            duration_ms.max(0.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = Some(cost_usd);
        self
    }

    pub fn with_service(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == SpanStatus::Error
    }
}

/// Aggregate over every span of one trace, independent of tree shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub total_spans: usize,
    pub total_duration_ms: f64,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub error_count: usize,
}

impl TraceSummary {
    /// Compute the summary locally from a span set.
    pub fn from_spans(trace_id: impl Into<String>, spans: &[Span]) -> Self {
        Self {
            trace_id: trace_id.into(),
            total_spans: spans.len(),
            total_duration_ms: spans.iter().map(|s| s.duration_ms).sum(),
            total_cost_usd: spans.iter().filter_map(|s| s.cost_usd).sum(),
            error_count: spans.iter().filter(|s| s.is_error()).count(),
        }
    }
}

/// Pagination metadata returned with every paged listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total: u64,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total_pages: u32,
}

fn default_page() -> u32 {
    1
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            total: 0,
            page: 1,
            limit: 0,
            total_pages: 0,
        }
    }
}

/// Response of `GET /telemetry`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<Span>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Wire shape of `GET /telemetry/traces/{id}`; the summary may be omitted.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TraceDetailPayload {
    #[serde(default)]
    pub summary: Option<TraceSummary>,
    #[serde(default)]
    pub spans: Vec<Span>,
}

/// A single trace with its spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceDetail {
    pub summary: TraceSummary,
    pub spans: Vec<Span>,
}

impl TraceDetail {
    pub(crate) fn from_payload(trace_id: &str, payload: TraceDetailPayload) -> Self {
        let summary = payload
            .summary
            .unwrap_or_else(|| TraceSummary::from_spans(trace_id, &payload.spans));
        Self {
            summary,
            spans: payload.spans,
        }
    }

    /// A trace that exists but holds no spans.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Aggregation window for the metrics endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    Hour,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Hour => "1h",
            Timeframe::Day => "24h",
            Timeframe::Week => "7d",
            Timeframe::Month => "30d",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1h" => Ok(Timeframe::Hour),
            "24h" => Ok(Timeframe::Day),
            "7d" => Ok(Timeframe::Week),
            "30d" => Ok(Timeframe::Month),
            other => Err(TelemetryError::invalid_argument(
                "timeframe",
                format!("expected one of 1h, 24h, 7d, 30d (got '{}')", other),
            )),
        }
    }
}

/// Call statistics for one operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStat {
    pub operation_name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub avg_duration_ms: f64,
}

/// A recurring error and how often it occurred
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStat {
    #[serde(default)]
    pub operation_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub count: u64,
}

/// Backend-computed metrics for a timeframe.
///
/// Percentiles and costs are computed upstream and only carried here.
/// Fields the backend adds beyond these are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryMetrics {
    pub total_requests: u64,
    pub error_count: u64,
    pub avg_duration_ms: f64,
    pub p50_duration_ms: Option<f64>,
    pub p95_duration_ms: Option<f64>,
    pub p99_duration_ms: Option<f64>,
    pub total_cost_usd: f64,
    pub cost_by_model: BTreeMap<String, f64>,
    pub top_operations: Vec<OperationStat>,
    pub top_errors: Vec<ErrorStat>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Edge in the service dependency graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub call_count: u64,
}

/// Response of `GET /telemetry/dashboard`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSnapshot {
    pub metrics: TelemetryMetrics,
    /// Same metrics for the preceding window, when the backend provides it.
    pub previous: Option<TelemetryMetrics>,
    pub recent_errors: Vec<Span>,
    pub service_dependencies: Vec<ServiceEdge>,
}

/// Enrichment counters, as reported by `GET /telemetry/enrichment/stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentStats {
    pub total_spans: u64,
    pub enriched_spans: u64,
    pub enrichment_rate: f64,
    pub cache_hit_spans: u64,
    pub routing_decisions: u64,
}

/// A span annotated by the backend's enrichment pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSpan {
    #[serde(flatten)]
    pub span: Span,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_decision: Option<String>,
    #[serde(default)]
    pub enrichment: Map<String, Value>,
}

/// Response of `GET /telemetry/enrichment/spans`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSpanPage {
    #[serde(default)]
    pub data: Vec<EnrichedSpan>,
    #[serde(default)]
    pub pagination: Pagination,
}
