use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracelens::protocol::*;
use tracelens::{Config, TraceViews};

/// How often expired traces are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-memory trace store with TTL; each trace carries its memoized views
pub struct TraceStore {
    traces: DashMap<TraceId, StoredTrace>,
    ttl: Duration,
    config: Arc<Config>,
}

struct StoredTrace {
    views: Arc<TraceViews>,
    summary: TraceSummary,
    created_at: Instant,
}

impl TraceStore {
    /// Create the store and its sweeper task. Must be called inside a tokio
    /// runtime; the sweeper exits once the store is dropped.
    pub fn new(ttl: Duration, config: Arc<Config>) -> Arc<Self> {
        let store = Arc::new(Self {
            traces: DashMap::new(),
            ttl,
            config,
        });

        let store_weak = Arc::downgrade(&store);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                if let Some(store) = store_weak.upgrade() {
                    let removed = store.cleanup_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "expired traces removed");
                    }
                } else {
                    break;
                }
            }
        });

        store
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Store a trace, replacing any trace with the same id. Replacing drops
    /// the old views.
    pub fn insert(&self, trace: Trace) -> TraceSummary {
        let summary = trace.summary();
        let trace_id = trace.trace_id.clone();
        tracing::debug!(%trace_id, spans = summary.span_count, "trace stored");

        self.traces.insert(
            trace_id,
            StoredTrace {
                views: Arc::new(TraceViews::new(Arc::new(trace), self.config.clone())),
                summary: summary.clone(),
                created_at: Instant::now(),
            },
        );
        summary
    }

    pub fn get(&self, trace_id: &TraceId) -> Option<Arc<TraceViews>> {
        self.traces.get(trace_id).map(|entry| entry.views.clone())
    }

    /// Summaries matching `filter`, newest first
    pub fn list(&self, filter: &TraceFilter) -> Vec<TraceSummary> {
        let mut summaries: Vec<TraceSummary> = self
            .traces
            .iter()
            .filter(|entry| filter.matches(&entry.summary))
            .map(|entry| entry.summary.clone())
            .collect();

        summaries.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.trace_id.cmp(&b.trace_id))
        });
        summaries.truncate(filter.limit());
        summaries
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Drop traces older than the TTL; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.traces.len();
        let ttl = self.ttl;
        self.traces
            .retain(|_, stored| stored.created_at.elapsed() < ttl);
        before.saturating_sub(self.traces.len())
    }
}
