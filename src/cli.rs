//! CLI commands for the telemetry explorer.
//!
//! Every command prints pretty JSON to stdout; logs go to stderr.

use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, PollConfig};
use crate::error::AppResult;
use crate::explorer::{Commit, TraceExplorer};
use crate::query::{FilterPatch, QueryFilters, SortOrder};
use crate::telemetry::{FetchPolicy, SpanStatus, Timeframe};
use crate::view::{dashboard_view, enrichment_view};

/// Explorer subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Search spans across traces
    Search(SearchArgs),

    /// Show one trace as a call tree
    Trace {
        /// Trace identifier
        trace_id: String,

        /// Order sibling spans by start time instead of store order
        #[arg(long)]
        time_ordered: bool,
    },

    /// Show aggregate metrics for a timeframe
    Metrics {
        /// One of 1h, 24h, 7d, 30d
        #[arg(long, default_value = "24h")]
        timeframe: Timeframe,
    },

    /// Show the dashboard snapshot with trends
    Dashboard,

    /// Show enrichment counters and the first page of enriched spans
    Enrichment {
        /// Maximum number of enriched spans to list
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Poll the dashboard until interrupted
    Watch {
        /// Poll interval in milliseconds (clamped to 10s..60s)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

/// Filter flags for `search`.
#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Service name
    #[arg(long)]
    pub service: Option<String>,

    /// Operation name
    #[arg(long)]
    pub operation: Option<String>,

    /// Span status: success, error, unset
    #[arg(long)]
    pub status: Option<SpanStatus>,

    /// HTTP method
    #[arg(long)]
    pub http_method: Option<String>,

    /// HTTP route
    #[arg(long)]
    pub http_route: Option<String>,

    /// HTTP status code
    #[arg(long)]
    pub http_status_code: Option<u16>,

    /// Generative AI model name
    #[arg(long)]
    pub model: Option<String>,

    /// Minimum duration in milliseconds
    #[arg(long)]
    pub min_duration: Option<f64>,

    /// Maximum duration in milliseconds
    #[arg(long)]
    pub max_duration: Option<f64>,

    /// Minimum cost in USD
    #[arg(long)]
    pub min_cost: Option<f64>,

    /// Maximum cost in USD
    #[arg(long)]
    pub max_cost: Option<f64>,

    /// Earliest span start (RFC 3339)
    #[arg(long)]
    pub start_time: Option<DateTime<Utc>>,

    /// Latest span start (RFC 3339)
    #[arg(long)]
    pub end_time: Option<DateTime<Utc>>,

    /// Page size
    #[arg(long)]
    pub limit: Option<u32>,

    /// 1-based page number
    #[arg(long)]
    pub page: Option<u32>,

    /// Sort column
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Sort direction: asc or desc
    #[arg(long)]
    pub sort_order: Option<SortOrder>,
}

impl SearchArgs {
    /// Turn the filter flags into a patch over the default filters.
    ///
    /// `page` is not part of the patch: any filter change resets paging, so
    /// the page is applied as a separate step.
    pub fn into_patch(self) -> FilterPatch {
        let mut patch = FilterPatch::new();
        if let Some(v) = self.service {
            patch = patch.service_name(v);
        }
        if let Some(v) = self.operation {
            patch = patch.operation_name(v);
        }
        if let Some(v) = self.status {
            patch = patch.status(v);
        }
        if let Some(v) = self.http_method {
            patch = patch.http_method(v);
        }
        if let Some(v) = self.http_route {
            patch = patch.http_route(v);
        }
        if self.http_status_code.is_some() {
            patch = patch.http_status_code(self.http_status_code);
        }
        if let Some(v) = self.model {
            patch = patch.gen_ai_model(v);
        }
        if self.min_duration.is_some() || self.max_duration.is_some() {
            patch = patch.duration_range(self.min_duration, self.max_duration);
        }
        if self.min_cost.is_some() || self.max_cost.is_some() {
            patch = patch.cost_range(self.min_cost, self.max_cost);
        }
        if self.start_time.is_some() || self.end_time.is_some() {
            patch = patch.time_range(self.start_time, self.end_time);
        }
        if let Some(v) = self.limit {
            patch = patch.limit(v);
        }
        if let Some(v) = self.sort_by {
            patch = patch.sort_by(v);
        }
        if let Some(v) = self.sort_order {
            patch = patch.sort_order(v);
        }
        patch
    }
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_commit<T: Serialize>(commit: Commit<T>) -> AppResult<()> {
    match commit {
        Commit::Committed(view) => print_json(&view),
        Commit::Discarded => {
            warn!("Response superseded before it could be shown");
            Ok(())
        }
    }
}

/// Execute a CLI command against `explorer`.
pub async fn execute_command(
    command: Commands,
    explorer: TraceExplorer,
    config: &Config,
) -> AppResult<()> {
    match command {
        Commands::Search(args) => {
            let page = args.page;
            explorer.apply(args.into_patch());
            let commit = match page {
                Some(page) => explorer.update_filters(FilterPatch::page(page)).await?,
                None => explorer.refresh_search().await?,
            };
            print_commit(commit)
        }
        Commands::Trace {
            trace_id,
            time_ordered,
        } => {
            let explorer = if time_ordered {
                explorer.with_time_ordered_children()
            } else {
                explorer
            };
            print_commit(explorer.open_trace(&trace_id).await?)
        }
        Commands::Metrics { timeframe } => {
            let metrics = explorer
                .store()
                .metrics(timeframe, FetchPolicy::CacheFirst)
                .await?;
            print_json(&metrics)
        }
        Commands::Dashboard => {
            let snapshot = explorer.store().dashboard(FetchPolicy::CacheFirst).await?;
            print_json(&dashboard_view(&snapshot))
        }
        Commands::Enrichment { limit } => {
            let store = explorer.store();
            let filters = QueryFilters {
                limit,
                ..QueryFilters::default()
            };
            let (stats, spans) = tokio::join!(
                store.enrichment_stats(FetchPolicy::CacheFirst),
                store.enrichment_spans(&filters, FetchPolicy::CacheFirst),
            );
            let spans = match spans {
                Ok(page) => Some(page),
                Err(e) => {
                    warn!(error = %e, "Enriched span listing unavailable");
                    None
                }
            };
            print_json(&enrichment_view(&stats?, spans.as_ref()))
        }
        Commands::Watch { interval_ms } => {
            let interval = interval_ms
                .map(PollConfig::new)
                .unwrap_or_else(|| config.poll.clone())
                .interval();
            watch(&explorer, interval).await
        }
    }
}

async fn watch(explorer: &TraceExplorer, interval: Duration) -> AppResult<()> {
    let token = CancellationToken::new();
    let (poller, mut rx) = explorer.watch_dashboard(interval, token.clone());

    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping watch");
            signal_token.cancel();
        }
    });

    while let Some(result) = rx.recv().await {
        match result {
            Ok(view) => print_json(&view)?,
            Err(e) => warn!(error = %e, "Dashboard poll failed"),
        }
    }

    poller.shutdown().await;
    explorer.teardown();
    Ok(())
}
