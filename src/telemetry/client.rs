use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::cache::QueryCache;
use super::types::{
    DashboardSnapshot, EnrichedSpanPage, EnrichmentStats, SearchResponse, TelemetryMetrics,
    Timeframe, TraceDetail, TraceDetailPayload,
};
use super::{FetchPolicy, SpanStore};
use crate::config::{CacheConfig, RequestConfig, TelemetryConfig};
use crate::error::{TelemetryError, TelemetryResult};
use crate::query::QueryFilters;

/// Client for the telemetry REST API
///
/// Owns its response cache; two clients never share cached data.
pub struct TelemetryClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_config: RequestConfig,
    cache: QueryCache,
}

impl TelemetryClient {
    /// Create a new telemetry client
    pub fn new(
        config: &TelemetryConfig,
        request_config: RequestConfig,
        cache_config: CacheConfig,
    ) -> TelemetryResult<Self> {
        let client = Client::builder()
            .timeout(request_config.timeout())
            .build()
            .map_err(|e| TelemetryError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
            cache: QueryCache::new(cache_config.stale_time()),
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The response cache owned by this client.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Drop all cached responses.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// GET `path` with `params`, consulting and refreshing the cache.
    ///
    /// Concurrent calls for the same key wait on the key's fetch lock; the
    /// first fetches, the rest read what it cached.
    async fn cached_get<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        params: Vec<(&'static str, String)>,
        policy: FetchPolicy,
    ) -> TelemetryResult<T> {
        let key = QueryCache::key(operation, &params);

        if policy == FetchPolicy::CacheFirst {
            if let Some(value) = self.cache.get_fresh(&key) {
                debug!(key = %key, "Serving telemetry response from cache");
                return decode(&value);
            }
        }

        let fetch_lock = self.cache.fetch_lock(&key);
        let _guard = fetch_lock.lock().await;

        if policy == FetchPolicy::CacheFirst {
            if let Some(value) = self.cache.get_fresh(&key) {
                debug!(key = %key, "Served by concurrent fetch");
                return decode(&value);
            }
        }

        let value = self.get_with_retry(path, &params).await?;
        let value = self.cache.insert(&key, value);
        decode(&value)
    }

    /// Issue a GET, retrying retryable failures up to `max_retries` times.
    async fn get_with_retry(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> TelemetryResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut retries = 0;

        loop {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    path = %path,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying telemetry request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, path, params).await {
                Ok(value) => {
                    info!(
                        path = %path,
                        latency_ms = start.elapsed().as_millis(),
                        "Telemetry request succeeded"
                    );
                    return Ok(value);
                }
                Err(e) => {
                    error!(
                        path = %path,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Telemetry request failed"
                    );
                    if !e.is_retryable() || retries >= self.request_config.max_retries {
                        return Err(e);
                    }
                    retries += 1;
                }
            }
        }
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        path: &str,
        params: &[(&'static str, String)],
    ) -> TelemetryResult<Value> {
        debug!(path = %path, params = params.len(), "Calling telemetry API");

        let mut request = self.client.get(url).query(params);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TelemetryError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                TelemetryError::Network {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TelemetryError::NotFound {
                resource: path.to_string(),
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&error_body),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                TelemetryError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                TelemetryError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                }
            }
        })
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> TelemetryResult<T> {
    T::deserialize(value).map_err(|e| TelemetryError::InvalidResponse {
        message: format!("Unexpected response shape: {}", e),
    })
}

/// Pull a human-readable message out of an error body.
///
/// Accepts `{"message": ..}`, `{"error": ".."}`, `{"error": {"message": ..}}`
/// and `{"detail": ..}`; anything else is returned verbatim.
fn upstream_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    let candidates = [
        value.get("message"),
        value.get("error").and_then(|e| e.get("message")),
        value.get("error"),
        value.get("detail"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    message
}

fn trace_path(trace_id: &str) -> TelemetryResult<String> {
    let trace_id = trace_id.trim();
    if trace_id.is_empty() {
        return Err(TelemetryError::invalid_argument(
            "trace_id",
            "must not be empty",
        ));
    }
    if trace_id.contains(['/', '?', '#']) {
        return Err(TelemetryError::invalid_argument(
            "trace_id",
            "must not contain '/', '?' or '#'",
        ));
    }
    Ok(format!("/telemetry/traces/{}", trace_id))
}

#[async_trait]
impl SpanStore for TelemetryClient {
    async fn search(
        &self,
        filters: &QueryFilters,
        policy: FetchPolicy,
    ) -> TelemetryResult<SearchResponse> {
        filters.validate()?;
        self.cached_get("search", "/telemetry", filters.to_query_pairs(), policy)
            .await
    }

    async fn fetch_trace(
        &self,
        trace_id: &str,
        policy: FetchPolicy,
    ) -> TelemetryResult<TraceDetail> {
        let path = trace_path(trace_id)?;
        let trace_id = trace_id.trim();
        let payload: TraceDetailPayload = self
            .cached_get(&format!("trace:{}", trace_id), &path, Vec::new(), policy)
            .await
            .map_err(|e| match e {
                TelemetryError::NotFound { .. } => TelemetryError::NotFound {
                    resource: format!("trace {}", trace_id),
                },
                other => other,
            })?;
        Ok(TraceDetail::from_payload(trace_id, payload))
    }

    async fn metrics(
        &self,
        timeframe: Timeframe,
        policy: FetchPolicy,
    ) -> TelemetryResult<TelemetryMetrics> {
        self.cached_get(
            "metrics",
            "/telemetry/metrics",
            vec![("timeframe", timeframe.as_str().to_string())],
            policy,
        )
        .await
    }

    async fn dashboard(&self, policy: FetchPolicy) -> TelemetryResult<DashboardSnapshot> {
        self.cached_get("dashboard", "/telemetry/dashboard", Vec::new(), policy)
            .await
    }

    async fn enrichment_spans(
        &self,
        filters: &QueryFilters,
        policy: FetchPolicy,
    ) -> TelemetryResult<EnrichedSpanPage> {
        filters.validate()?;
        self.cached_get(
            "enrichment_spans",
            "/telemetry/enrichment/spans",
            filters.to_query_pairs(),
            policy,
        )
        .await
    }

    async fn enrichment_stats(&self, policy: FetchPolicy) -> TelemetryResult<EnrichmentStats> {
        self.cached_get(
            "enrichment_stats",
            "/telemetry/enrichment/stats",
            Vec::new(),
            policy,
        )
        .await
    }
}
