//! Query filter engine for paginated multi-trace search.
//!
//! [`QueryFilters`] holds the current search parameters; [`FilterPatch`]
//! describes a change to them. [`normalize`] merges the two and resets the
//! page whenever the patch touches anything other than the page itself, so a
//! narrowed search never lands on a page that no longer exists.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TelemetryError, TelemetryResult};
use crate::telemetry::SpanStatus;

/// Default page size.
pub const DEFAULT_LIMIT: u32 = 20;
/// Largest page size accepted by the store.
pub const MAX_LIMIT: u32 = 1000;
/// Default sort column.
pub const DEFAULT_SORT_BY: &str = "timestamp";

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Wire form: `asc` or `desc`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(TelemetryError::invalid_argument(
                "sort_order",
                format!("expected asc or desc (got '{}')", other),
            )),
        }
    }
}

/// Search parameters for `GET /telemetry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub service_name: Option<String>,
    pub operation_name: Option<String>,
    pub status: Option<SpanStatus>,
    pub http_method: Option<String>,
    pub http_route: Option<String>,
    pub http_status_code: Option<u16>,
    pub gen_ai_model: Option<String>,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub min_cost: Option<f64>,
    pub max_cost: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: u32,
    /// 1-based page number, never below 1.
    pub page: u32,
    pub sort_by: String,
    pub sort_order: SortOrder,
}

impl Default for QueryFilters {
    fn default() -> Self {
        Self {
            service_name: None,
            operation_name: None,
            status: None,
            http_method: None,
            http_route: None,
            http_status_code: None,
            gen_ai_model: None,
            min_duration: None,
            max_duration: None,
            min_cost: None,
            max_cost: None,
            start_time: None,
            end_time: None,
            limit: DEFAULT_LIMIT,
            page: 1,
            sort_by: DEFAULT_SORT_BY.to_string(),
            sort_order: SortOrder::Desc,
        }
    }
}

/// A change to a [`QueryFilters`].
///
/// Each field is `None` when the patch leaves it alone, `Some(None)` when
/// the patch clears it and `Some(Some(v))` when it sets it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPatch {
    pub service_name: Option<Option<String>>,
    pub operation_name: Option<Option<String>>,
    pub status: Option<Option<SpanStatus>>,
    pub http_method: Option<Option<String>>,
    pub http_route: Option<Option<String>>,
    pub http_status_code: Option<Option<u16>>,
    pub gen_ai_model: Option<Option<String>>,
    pub min_duration: Option<Option<f64>>,
    pub max_duration: Option<Option<f64>>,
    pub min_cost: Option<Option<f64>>,
    pub max_cost: Option<Option<f64>>,
    pub start_time: Option<Option<DateTime<Utc>>>,
    pub end_time: Option<Option<DateTime<Utc>>>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

fn text(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl FilterPatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to another page without touching any filter.
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }

    /// Set the service filter; an empty string clears it.
    pub fn service_name(mut self, value: impl Into<String>) -> Self {
        self.service_name = Some(text(value));
        self
    }

    /// Set the operation filter; an empty string clears it.
    pub fn operation_name(mut self, value: impl Into<String>) -> Self {
        self.operation_name = Some(text(value));
        self
    }

    /// Set the status filter.
    pub fn status(mut self, status: SpanStatus) -> Self {
        self.status = Some(Some(status));
        self
    }

    /// Remove the status filter.
    pub fn clear_status(mut self) -> Self {
        self.status = Some(None);
        self
    }

    /// Set the HTTP method filter; an empty string clears it.
    pub fn http_method(mut self, value: impl Into<String>) -> Self {
        self.http_method = Some(text(value).map(|m| m.to_uppercase()));
        self
    }

    /// Set the HTTP route filter; an empty string clears it.
    pub fn http_route(mut self, value: impl Into<String>) -> Self {
        self.http_route = Some(text(value));
        self
    }

    /// Set or clear (`None`) the HTTP status code filter.
    pub fn http_status_code(mut self, code: Option<u16>) -> Self {
        self.http_status_code = Some(code);
        self
    }

    /// Set the model filter; an empty string clears it.
    pub fn gen_ai_model(mut self, value: impl Into<String>) -> Self {
        self.gen_ai_model = Some(text(value));
        self
    }

    /// Set both duration bounds in milliseconds; `None` clears a bound.
    pub fn duration_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_duration = Some(min);
        self.max_duration = Some(max);
        self
    }

    /// Set both cost bounds in USD; `None` clears a bound.
    pub fn cost_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_cost = Some(min);
        self.max_cost = Some(max);
        self
    }

    /// Set both start-time bounds; `None` clears a bound.
    pub fn time_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Set the page size; clamped to `1..=1000` on merge.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the sort column; an empty string restores the default column.
    pub fn sort_by(mut self, column: impl Into<String>) -> Self {
        self.sort_by = Some(text(column).unwrap_or_else(|| DEFAULT_SORT_BY.to_string()));
        self
    }

    /// Set the sort direction.
    pub fn sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = Some(order);
        self
    }

    /// Go to a page as part of this patch.
    ///
    /// Ignored by [`normalize`] if the patch carries any other field.
    pub fn at_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

fn merge<T>(slot: &mut T, patch: Option<T>, touched: &mut bool) {
    if let Some(value) = patch {
        *slot = value;
        *touched = true;
    }
}

/// Merge `patch` over `current`.
///
/// Any field other than `page` present in the patch forces `page = 1`, even
/// when it re-states the current value.
pub fn normalize(current: &QueryFilters, patch: FilterPatch) -> QueryFilters {
    let mut next = current.clone();
    let mut touched = false;

    merge(&mut next.service_name, patch.service_name, &mut touched);
    merge(&mut next.operation_name, patch.operation_name, &mut touched);
    merge(&mut next.status, patch.status, &mut touched);
    merge(&mut next.http_method, patch.http_method, &mut touched);
    merge(&mut next.http_route, patch.http_route, &mut touched);
    merge(&mut next.http_status_code, patch.http_status_code, &mut touched);
    merge(&mut next.gen_ai_model, patch.gen_ai_model, &mut touched);
    merge(&mut next.min_duration, patch.min_duration, &mut touched);
    merge(&mut next.max_duration, patch.max_duration, &mut touched);
    merge(&mut next.min_cost, patch.min_cost, &mut touched);
    merge(&mut next.max_cost, patch.max_cost, &mut touched);
    merge(&mut next.start_time, patch.start_time, &mut touched);
    merge(&mut next.end_time, patch.end_time, &mut touched);
    merge(
        &mut next.limit,
        patch.limit.map(|l| l.clamp(1, MAX_LIMIT)),
        &mut touched,
    );
    merge(&mut next.sort_by, patch.sort_by, &mut touched);
    merge(&mut next.sort_order, patch.sort_order, &mut touched);

    next.page = if touched {
        1
    } else {
        patch.page.unwrap_or(current.page).max(1)
    };

    next
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn push_text(pairs: &mut Vec<(&'static str, String)>, key: &'static str, value: &Option<String>) {
    if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        pairs.push((key, v.to_string()));
    }
}

fn format_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl QueryFilters {
    /// Canonical query parameters, in a fixed order, with unset filters left out.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<(&'static str, String)> = Vec::new();

        push_text(&mut pairs, "service_name", &self.service_name);
        push_text(&mut pairs, "operation_name", &self.operation_name);
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        push_text(&mut pairs, "http_method", &self.http_method);
        push_text(&mut pairs, "http_route", &self.http_route);
        if let Some(code) = self.http_status_code {
            pairs.push(("http_status_code", code.to_string()));
        }
        push_text(&mut pairs, "gen_ai_model", &self.gen_ai_model);

        let bounds = [
            ("min_duration", self.min_duration),
            ("max_duration", self.max_duration),
            ("min_cost", self.min_cost),
            ("max_cost", self.max_cost),
        ];
        for (key, value) in bounds {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                pairs.push((key, format_number(v)));
            }
        }

        if let Some(start) = &self.start_time {
            pairs.push(("start_time", format_time(start)));
        }
        if let Some(end) = &self.end_time {
            pairs.push(("end_time", format_time(end)));
        }

        pairs.push(("limit", self.limit.clamp(1, MAX_LIMIT).to_string()));
        pairs.push(("page", self.page.max(1).to_string()));
        let sort_by = self.sort_by.trim();
        pairs.push((
            "sort_by",
            if sort_by.is_empty() {
                DEFAULT_SORT_BY.to_string()
            } else {
                sort_by.to_string()
            },
        ));
        pairs.push(("sort_order", self.sort_order.as_str().to_string()));

        pairs
    }

    /// The query pairs joined as `k=v&k=v`, used as a stable cache key.
    ///
    /// Values are not percent-encoded; this is an identity, not a URL.
    pub fn canonical_key(&self) -> String {
        self.to_query_pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Reject filter sets no store could satisfy.
    pub fn validate(&self) -> TelemetryResult<()> {
        let ranges = [
            ("duration", self.min_duration, self.max_duration),
            ("cost", self.min_cost, self.max_cost),
        ];
        for (name, min, max) in ranges {
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(TelemetryError::invalid_argument(
                        format!("min_{}", name),
                        format!("min_{} ({}) exceeds max_{} ({})", name, min, name, max),
                    ));
                }
            }
            for value in [min, max].into_iter().flatten() {
                if value < 0.0 || !value.is_finite() {
                    return Err(TelemetryError::invalid_argument(
                        name,
                        format!("{} bound must be a non-negative number", name),
                    ));
                }
            }
        }

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(TelemetryError::invalid_argument(
                    "start_time",
                    "start_time is after end_time",
                ));
            }
        }

        Ok(())
    }

    /// Whether any predicate beyond paging and sorting is set.
    pub fn has_active_filters(&self) -> bool {
        self.service_name.is_some()
            || self.operation_name.is_some()
            || self.status.is_some()
            || self.http_method.is_some()
            || self.http_route.is_some()
            || self.http_status_code.is_some()
            || self.gen_ai_model.is_some()
            || self.min_duration.is_some()
            || self.max_duration.is_some()
            || self.min_cost.is_some()
            || self.max_cost.is_some()
            || self.start_time.is_some()
            || self.end_time.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn on_page(page: u32) -> QueryFilters {
        QueryFilters {
            page,
            ..QueryFilters::default()
        }
    }

    #[test]
    fn test_defaults() {
        let filters = QueryFilters::default();
        assert_eq!(filters.limit, 20);
        assert_eq!(filters.page, 1);
        assert_eq!(filters.sort_by, "timestamp");
        assert_eq!(filters.sort_order, SortOrder::Desc);
        assert!(!filters.has_active_filters());
    }

    #[test]
    fn test_filter_change_resets_page() {
        let next = normalize(&on_page(7), FilterPatch::new().status(SpanStatus::Error));
        assert_eq!(next.page, 1);
        assert_eq!(next.status, Some(SpanStatus::Error));
    }

    #[test]
    fn test_page_patch_moves_page() {
        let next = normalize(&on_page(1), FilterPatch::page(4));
        assert_eq!(next.page, 4);
    }

    #[test]
    fn test_page_patch_with_filter_change_still_resets() {
        let patch = FilterPatch::new().service_name("billing").at_page(5);
        let next = normalize(&on_page(2), patch);
        assert_eq!(next.page, 1);
        assert_eq!(next.service_name.as_deref(), Some("billing"));
    }

    #[test]
    fn test_page_zero_clamped() {
        let next = normalize(&on_page(3), FilterPatch::page(0));
        assert_eq!(next.page, 1);
    }

    #[test]
    fn test_restating_same_value_resets_page() {
        let current = normalize(&QueryFilters::default(), FilterPatch::new().status(SpanStatus::Error));
        let current = normalize(&current, FilterPatch::page(3));
        assert_eq!(current.page, 3);

        let next = normalize(&current, FilterPatch::new().status(SpanStatus::Error));
        assert_eq!(next.page, 1);
        assert_eq!(next.status, Some(SpanStatus::Error));
    }

    #[test]
    fn test_empty_patch_keeps_page() {
        let next = normalize(&on_page(6), FilterPatch::new());
        assert_eq!(next.page, 6);
    }

    #[test]
    fn test_empty_string_clears_filter() {
        let current = normalize(&QueryFilters::default(), FilterPatch::new().service_name("api"));
        let current = normalize(&current, FilterPatch::page(2));
        let next = normalize(&current, FilterPatch::new().service_name("   "));
        assert_eq!(next.service_name, None);
        assert_eq!(next.page, 1);
    }

    #[test]
    fn test_sort_change_resets_page() {
        let next = normalize(&on_page(9), FilterPatch::new().sort_order(SortOrder::Asc));
        assert_eq!(next.page, 1);
        assert_eq!(next.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_limit_clamped() {
        let next = normalize(&QueryFilters::default(), FilterPatch::new().limit(50_000));
        assert_eq!(next.limit, MAX_LIMIT);
        let next = normalize(&QueryFilters::default(), FilterPatch::new().limit(0));
        assert_eq!(next.limit, 1);
    }

    #[test]
    fn test_query_pairs_omit_unset() {
        let pairs = QueryFilters::default().to_query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("limit", "20".to_string()),
                ("page", "1".to_string()),
                ("sort_by", "timestamp".to_string()),
                ("sort_order", "desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_pairs_full() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let patch = FilterPatch::new()
            .service_name("gateway")
            .status(SpanStatus::Error)
            .http_method("post")
            .http_status_code(Some(500))
            .gen_ai_model("gpt-4o")
            .duration_range(Some(100.0), None)
            .cost_range(None, Some(0.25))
            .time_range(Some(start), Some(end));
        let filters = normalize(&QueryFilters::default(), patch);

        let pairs = filters.to_query_pairs();
        assert!(pairs.contains(&("service_name", "gateway".to_string())));
        assert!(pairs.contains(&("status", "error".to_string())));
        assert!(pairs.contains(&("http_method", "POST".to_string())));
        assert!(pairs.contains(&("http_status_code", "500".to_string())));
        assert!(pairs.contains(&("min_duration", "100".to_string())));
        assert!(pairs.contains(&("max_cost", "0.25".to_string())));
        assert!(pairs.contains(&("start_time", "2024-05-01T00:00:00.000Z".to_string())));
        assert!(pairs.contains(&("end_time", "2024-05-02T00:00:00.000Z".to_string())));
        assert!(!pairs.iter().any(|(k, _)| *k == "max_duration"));
    }

    #[test]
    fn test_canonical_key_is_stable() {
        let a = normalize(&QueryFilters::default(), FilterPatch::new().service_name("x"));
        let b = normalize(&QueryFilters::default(), FilterPatch::new().service_name(" x "));
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_ne!(a.canonical_key(), QueryFilters::default().canonical_key());
    }

    #[test]
    fn test_validate_rejects_inverted_ranges() {
        let filters = normalize(
            &QueryFilters::default(),
            FilterPatch::new().duration_range(Some(500.0), Some(100.0)),
        );
        assert!(matches!(
            filters.validate(),
            Err(TelemetryError::InvalidArgument { .. })
        ));

        let start = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let filters = normalize(
            &QueryFilters::default(),
            FilterPatch::new().time_range(Some(start), Some(end)),
        );
        assert!(filters.validate().is_err());

        let filters = normalize(
            &QueryFilters::default(),
            FilterPatch::new().cost_range(Some(-1.0), None),
        );
        assert!(filters.validate().is_err());

        assert!(QueryFilters::default().validate().is_ok());
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
