//! Unit tests for telemetry wire types.
//!
//! Covers span decoding quirks, local summary aggregation and the
//! tolerant parsing of backend metric payloads.

use super::types::TraceDetailPayload;
use super::*;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

// Span tests
#[test]
fn test_span_deserialize_full() {
    let span: Span = serde_json::from_value(json!({
        "trace_id": "t1",
        "span_id": "s2",
        "parent_span_id": "s1",
        "operation_name": "chat.completions",
        "service_name": "gateway",
        "duration_ms": 120.5,
        "status": "error",
        "timestamp": "2024-05-01T12:00:00Z",
        "cost_usd": 0.0042,
        "attributes": {"gen_ai.request.model": "gpt-4o"}
    }))
    .unwrap();

    assert_eq!(span.parent_span_id.as_deref(), Some("s1"));
    assert_eq!(span.status, SpanStatus::Error);
    assert_eq!(span.cost_usd, Some(0.0042));
    assert_eq!(span.attributes["gen_ai.request.model"], "gpt-4o");
}

#[test]
fn test_span_empty_parent_is_root() {
    let span: Span = serde_json::from_value(json!({
        "trace_id": "t1",
        "span_id": "s1",
        "parent_span_id": "",
        "operation_name": "root",
        "duration_ms": 1,
        "timestamp": "2024-05-01T12:00:00Z"
    }))
    .unwrap();

    assert!(span.parent_span_id.is_none());
    assert_eq!(span.status, SpanStatus::Unset);
    assert!(span.attributes.is_empty());
}

#[test]
fn test_span_negative_duration_clamped() {
    let span: Span = serde_json::from_value(json!({
        "trace_id": "t1",
        "span_id": "s1",
        "operation_name": "root",
        "duration_ms": -5.0,
        "timestamp": "2024-05-01T12:00:00Z"
    }))
    .unwrap();

    assert_eq!(span.duration_ms, 0.0);
}

#[test]
fn test_span_status_unknown_value_is_unset() {
    let status: SpanStatus = serde_json::from_value(json!("cancelled")).unwrap();
    assert_eq!(status, SpanStatus::Unset);

    let status: SpanStatus = serde_json::from_value(json!("ok")).unwrap();
    assert_eq!(status, SpanStatus::Success);
}

#[test]
fn test_span_status_from_str() {
    assert_eq!("ERROR".parse::<SpanStatus>().unwrap(), SpanStatus::Error);
    assert!("bogus".parse::<SpanStatus>().is_err());
}

#[test]
fn test_span_builder_with_empty_parent() {
    let span = Span::new("t", "s", "op", ts(0)).with_parent("");
    assert!(span.parent_span_id.is_none());

    let span = Span::new("t", "s", "op", ts(0)).with_duration(-3.0);
    assert_eq!(span.duration_ms, 0.0);
}

// TraceSummary tests
#[test]
fn test_trace_summary_from_spans() {
    let spans = vec![
        Span::new("t", "1", "a", ts(0))
            .with_duration(100.0)
            .with_cost(0.01),
        Span::new("t", "2", "b", ts(1))
            .with_parent("1")
            .with_duration(40.0)
            .with_status(SpanStatus::Error),
        Span::new("t", "3", "c", ts(2))
            .with_parent("1")
            .with_duration(10.0)
            .with_cost(0.02),
    ];

    let summary = TraceSummary::from_spans("t", &spans);
    assert_eq!(summary.total_spans, 3);
    assert_eq!(summary.total_duration_ms, 150.0);
    assert!((summary.total_cost_usd - 0.03).abs() < 1e-12);
    assert_eq!(summary.error_count, 1);
}

#[test]
fn test_trace_summary_from_no_spans() {
    let summary = TraceSummary::from_spans("t", &[]);
    assert_eq!(summary.total_spans, 0);
    assert_eq!(summary.total_duration_ms, 0.0);
    assert_eq!(summary.error_count, 0);
}

#[test]
fn test_trace_detail_fills_missing_summary() {
    let payload: TraceDetailPayload = serde_json::from_value(json!({
        "spans": [{
            "trace_id": "t",
            "span_id": "1",
            "operation_name": "a",
            "duration_ms": 5,
            "status": "error",
            "timestamp": "2024-05-01T12:00:00Z"
        }]
    }))
    .unwrap();

    let detail = TraceDetail::from_payload("t", payload);
    assert_eq!(detail.summary.trace_id, "t");
    assert_eq!(detail.summary.total_spans, 1);
    assert_eq!(detail.summary.error_count, 1);
}

#[test]
fn test_trace_detail_keeps_backend_summary() {
    let payload: TraceDetailPayload = serde_json::from_value(json!({
        "summary": {
            "trace_id": "t",
            "total_spans": 40,
            "total_duration_ms": 900.0,
            "total_cost_usd": 1.5,
            "error_count": 2
        },
        "spans": []
    }))
    .unwrap();

    let detail = TraceDetail::from_payload("t", payload);
    assert_eq!(detail.summary.total_spans, 40);
    assert!(detail.is_empty());
}

// Listing tests
#[test]
fn test_search_response_defaults() {
    let response: SearchResponse = serde_json::from_value(json!({})).unwrap();
    assert!(response.data.is_empty());
    assert_eq!(response.pagination.page, 1);
    assert_eq!(response.pagination.total_pages, 0);
}

#[test]
fn test_timeframe_round_trip_strings() {
    assert_eq!("7d".parse::<Timeframe>().unwrap(), Timeframe::Week);
    assert_eq!(Timeframe::Hour.to_string(), "1h");
    assert_eq!(serde_json::to_value(Timeframe::Month).unwrap(), json!("30d"));
    assert!("2w".parse::<Timeframe>().is_err());
}

// Metrics payload tests
#[test]
fn test_metrics_keep_unknown_fields() {
    let metrics: TelemetryMetrics = serde_json::from_value(json!({
        "total_requests": 1200,
        "error_count": 12,
        "p95_duration_ms": 840.0,
        "cost_by_model": {"gpt-4o": 3.2, "claude-3-haiku": 0.4},
        "top_operations": [{"operation_name": "chat", "count": 900}],
        "throughput_rpm": 20
    }))
    .unwrap();

    assert_eq!(metrics.total_requests, 1200);
    assert_eq!(metrics.p95_duration_ms, Some(840.0));
    assert_eq!(metrics.p50_duration_ms, None);
    assert_eq!(metrics.cost_by_model.len(), 2);
    assert_eq!(metrics.top_operations[0].count, 900);
    assert_eq!(metrics.extra["throughput_rpm"], 20);
}

#[test]
fn test_enriched_span_flattens_span() {
    let span: EnrichedSpan = serde_json::from_value(json!({
        "trace_id": "t",
        "span_id": "1",
        "operation_name": "chat",
        "duration_ms": 12,
        "timestamp": "2024-05-01T12:00:00Z",
        "cache_hit": true,
        "routing_decision": "downgrade-to-mini"
    }))
    .unwrap();

    assert_eq!(span.span.span_id, "1");
    assert!(span.cache_hit);
    assert_eq!(span.routing_decision.as_deref(), Some("downgrade-to-mini"));
}
