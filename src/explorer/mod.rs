//! Trace explorer session.
//!
//! [`TraceExplorer`] is what a dashboard view talks to. It keeps the current
//! search filters and the last committed result of each view slot, and it
//! only ever commits the response to the most recent request of a slot:
//! a slower, older request that finishes late is discarded.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TelemetryResult;
use crate::poll::Poller;
use crate::query::{normalize, FilterPatch, QueryFilters};
use crate::telemetry::{FetchPolicy, RequestSequencer, SpanStore};
use crate::tree::{build_forest, sort_spans_by_timestamp};
use crate::view::{
    dashboard_view, search_view, trace_view, DashboardView, SearchPageView, TraceDetailView,
};

/// View slot for the multi-trace search table.
pub const SEARCH_SLOT: &str = "search";
/// View slot for the single-trace detail panel.
pub const TRACE_SLOT: &str = "trace";

/// What happened to a response once it arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum Commit<T> {
    /// The response was the latest for its slot and is now the slot's state.
    Committed(T),
    /// A newer request or a cancellation superseded it; nothing changed.
    Discarded,
}

impl<T> Commit<T> {
    /// The committed value, if any.
    pub fn committed(self) -> Option<T> {
        match self {
            Commit::Committed(value) => Some(value),
            Commit::Discarded => None,
        }
    }

    /// Whether the response was superseded.
    pub fn is_discarded(&self) -> bool {
        matches!(self, Commit::Discarded)
    }
}

#[derive(Debug, Default)]
struct ExplorerState {
    sequencer: RequestSequencer,
    filters: QueryFilters,
    search: Option<SearchPageView>,
    trace_id: Option<String>,
    trace: Option<TraceDetailView>,
}

/// Stateful front end over a [`SpanStore`].
pub struct TraceExplorer {
    store: Arc<dyn SpanStore>,
    state: Mutex<ExplorerState>,
    time_ordered_children: bool,
}

impl TraceExplorer {
    /// Create an explorer with default filters.
    pub fn new(store: Arc<dyn SpanStore>) -> Self {
        Self {
            store,
            state: Mutex::new(ExplorerState::default()),
            time_ordered_children: false,
        }
    }

    /// Sort each trace's spans by start time before building the tree, so
    /// children appear in temporal rather than store order.
    pub fn with_time_ordered_children(mut self) -> Self {
        self.time_ordered_children = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, ExplorerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The underlying span store.
    pub fn store(&self) -> &Arc<dyn SpanStore> {
        &self.store
    }

    /// Current search filters.
    pub fn filters(&self) -> QueryFilters {
        self.state().filters.clone()
    }

    /// Last committed search page.
    pub fn search_results(&self) -> Option<SearchPageView> {
        self.state().search.clone()
    }

    /// Last committed trace detail.
    pub fn trace(&self) -> Option<TraceDetailView> {
        self.state().trace.clone()
    }

    /// Id of the trace currently open, if any.
    pub fn open_trace_id(&self) -> Option<String> {
        self.state().trace_id.clone()
    }

    /// Merge a filter change without fetching. Returns the new filters.
    pub fn apply(&self, patch: FilterPatch) -> QueryFilters {
        let mut state = self.state();
        state.filters = normalize(&state.filters, patch);
        state.filters.clone()
    }

    /// Merge a filter change and run the search.
    pub async fn update_filters(&self, patch: FilterPatch) -> TelemetryResult<Commit<SearchPageView>> {
        self.apply(patch);
        self.run_search(FetchPolicy::CacheFirst).await
    }

    /// Run the search for the current filters.
    pub async fn refresh_search(&self) -> TelemetryResult<Commit<SearchPageView>> {
        self.run_search(FetchPolicy::CacheFirst).await
    }

    /// User-initiated retry of the search, bypassing the cache.
    pub async fn refetch_search(&self) -> TelemetryResult<Commit<SearchPageView>> {
        self.run_search(FetchPolicy::NetworkOnly).await
    }

    async fn run_search(&self, policy: FetchPolicy) -> TelemetryResult<Commit<SearchPageView>> {
        let (ticket, filters) = {
            let mut state = self.state();
            (state.sequencer.issue(SEARCH_SLOT), state.filters.clone())
        };

        let view = self
            .store
            .search(&filters, policy)
            .await
            .map(|response| search_view(&response));

        let mut state = self.state();
        if !state.sequencer.is_current(&ticket) {
            drop(state);
            debug!(slot = SEARCH_SLOT, seq = ticket.seq(), "Discarding stale search response");
            return Ok(Commit::Discarded);
        }

        let view = view?;
        state.search = Some(view.clone());
        Ok(Commit::Committed(view))
    }

    /// Fetch a trace and build its tree.
    pub async fn open_trace(&self, trace_id: &str) -> TelemetryResult<Commit<TraceDetailView>> {
        self.load_trace(trace_id, FetchPolicy::CacheFirst).await
    }

    /// User-initiated retry of the open trace, bypassing the cache.
    ///
    /// Returns `Ok(None)` when no trace is open.
    pub async fn refetch_trace(&self) -> TelemetryResult<Option<Commit<TraceDetailView>>> {
        let Some(trace_id) = self.open_trace_id() else {
            return Ok(None);
        };
        self.load_trace(&trace_id, FetchPolicy::NetworkOnly)
            .await
            .map(Some)
    }

    async fn load_trace(
        &self,
        trace_id: &str,
        policy: FetchPolicy,
    ) -> TelemetryResult<Commit<TraceDetailView>> {
        let ticket = {
            let mut state = self.state();
            if state.trace_id.as_deref() != Some(trace_id) {
                state.trace = None;
            }
            state.trace_id = Some(trace_id.to_string());
            state.sequencer.issue(TRACE_SLOT)
        };

        let built = self
            .store
            .fetch_trace(trace_id, policy)
            .await
            .map(|mut detail| {
                if self.time_ordered_children {
                    sort_spans_by_timestamp(&mut detail.spans);
                }
                let forest = build_forest(detail.spans);
                (trace_view(&detail.summary, &forest), forest.cycle_breaks().len())
            });

        let mut state = self.state();
        if !state.sequencer.is_current(&ticket) {
            drop(state);
            debug!(
                slot = TRACE_SLOT,
                trace_id = %trace_id,
                seq = ticket.seq(),
                "Discarding stale trace response"
            );
            return Ok(Commit::Discarded);
        }

        let (view, cycle_breaks) = built?;
        state.trace = Some(view.clone());
        drop(state);

        info!(
            trace_id = %trace_id,
            spans = view.nodes.len(),
            roots = view.root_count,
            cycle_breaks,
            "Trace tree built"
        );
        Ok(Commit::Committed(view))
    }

    /// Close the trace panel; a fetch still in flight will be discarded.
    pub fn close_trace(&self) {
        let mut state = self.state();
        state.sequencer.cancel(TRACE_SLOT);
        state.trace_id = None;
        state.trace = None;
    }

    /// Tear the explorer's views down; nothing in flight will be committed.
    pub fn teardown(&self) {
        self.state().sequencer.cancel_all();
        info!("Trace explorer torn down");
    }

    /// Poll the dashboard endpoint until `token` is cancelled.
    pub fn watch_dashboard(
        &self,
        interval: Duration,
        token: CancellationToken,
    ) -> (Poller, mpsc::Receiver<TelemetryResult<DashboardView>>) {
        let store = Arc::clone(&self.store);
        Poller::spawn("dashboard", interval, token, move || {
            let store = Arc::clone(&store);
            async move {
                store
                    .dashboard(FetchPolicy::NetworkOnly)
                    .await
                    .map(|snapshot| dashboard_view(&snapshot))
            }
        })
    }
}
