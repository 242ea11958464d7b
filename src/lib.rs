//! # Telemetry Explorer
//!
//! A data engine for exploring AI-usage telemetry: it searches a remote span
//! store, reconstructs call trees from flat span lists, derives enrichment
//! and trend indicators, and projects everything into view models a
//! dashboard can render directly.
//!
//! ## Features
//!
//! - **Span Search**: Filtered, sorted, paginated multi-trace search
//! - **Trace Trees**: Forest reconstruction from `parent_span_id` references,
//!   tolerant of orphans, duplicates and parent cycles
//! - **Query Normalization**: Filter patches that reset paging on change
//! - **Caching**: Per-client response cache with a staleness window and
//!   at most one in-flight request per query
//! - **Stale-Response Discard**: Only the newest request of a view commits
//! - **Polling**: Cancellable fixed-interval dashboard refresh
//!
//! ## Architecture
//!
//! ```text
//! Consumer → TraceExplorer → QueryFilters (normalize)
//!                 ↓
//!          TelemetryClient (cache) → Telemetry REST API (HTTP)
//!                 ↓
//!          build_forest → metrics → view models
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use telemetry_explorer::{Config, TelemetryClient, TraceExplorer};
//! use telemetry_explorer::query::FilterPatch;
//! use telemetry_explorer::telemetry::SpanStatus;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = TelemetryClient::new(&config.telemetry, config.request.clone(), config.cache.clone())?;
//!     let explorer = TraceExplorer::new(Arc::new(client));
//!     let page = explorer
//!         .update_filters(FilterPatch::new().status(SpanStatus::Error))
//!         .await?;
//!     println!("{:?}", page);
//!     Ok(())
//! }
//! ```

/// CLI subcommands and their execution.
pub mod cli;
/// Configuration management loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Stateful explorer session with stale-response discard.
pub mod explorer;
/// Trend, enrichment and ratio derivations.
pub mod metrics;
/// Cancellable fixed-interval polling.
pub mod poll;
/// Query filter normalization and serialization.
pub mod query;
/// Telemetry store client and wire types.
pub mod telemetry;
/// Span tree reconstruction.
pub mod tree;
/// UI-agnostic view models.
pub mod view;

pub use config::Config;
pub use error::{AppError, AppResult, TelemetryError, TelemetryResult};
pub use explorer::{Commit, TraceExplorer};
pub use telemetry::{SpanStore, TelemetryClient};
