//! Trace loading with retries where only the newest request wins.

use std::sync::Arc;
use tokio::sync::watch;
use tracelens_protocol::*;

use crate::fetch::{FetchError, TraceSource};
use crate::gate::RequestGate;
use crate::notify::{Notification, Notifier};
use crate::retry::{with_retry, RetryPolicy};

#[derive(Debug)]
pub enum LoadOutcome<T> {
    /// Newest request; the result was applied
    Applied(T),
    /// A newer request started before this one finished
    Stale,
    /// Failed after retries; the notifier has been told
    Failed(FetchError),
}

impl<T> LoadOutcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            LoadOutcome::Applied(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, LoadOutcome::Stale)
    }
}

pub struct TraceLoader<S, N> {
    source: S,
    notifier: N,
    policy: RetryPolicy,
    trace_gate: RequestGate,
    list_gate: RequestGate,
    current: watch::Sender<Option<Arc<Trace>>>,
}

impl<S: TraceSource, N: Notifier> TraceLoader<S, N> {
    pub fn new(source: S, notifier: N, policy: RetryPolicy) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            source,
            notifier,
            policy,
            trace_gate: RequestGate::new(),
            list_gate: RequestGate::new(),
            current,
        }
    }

    /// Latest applied trace
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Trace>>> {
        self.current.subscribe()
    }

    pub fn current(&self) -> Option<Arc<Trace>> {
        self.current.borrow().clone()
    }

    pub async fn load(&self, trace_id: &TraceId) -> LoadOutcome<Arc<Trace>> {
        let ticket = self.trace_gate.begin();
        let result = with_retry(&self.policy, &ticket.cancel, |_| self.source.fetch_trace(trace_id)).await;

        if !self.trace_gate.is_current(&ticket) {
            tracing::debug!(%trace_id, generation = ticket.generation, "discarding stale trace response");
            return LoadOutcome::Stale;
        }

        match result {
            Ok(trace) => {
                let trace = Arc::new(trace);
                self.current.send_replace(Some(trace.clone()));
                LoadOutcome::Applied(trace)
            }
            Err(err) => {
                let message = if err.is_not_found() {
                    format!("Trace {trace_id} not found")
                } else {
                    format!("Failed to load trace {trace_id}: {err}")
                };
                self.notifier.notify(Notification::error(message, err.is_transient()));
                LoadOutcome::Failed(err)
            }
        }
    }

    pub async fn list(&self, filter: &TraceFilter) -> LoadOutcome<Vec<TraceSummary>> {
        let ticket = self.list_gate.begin();
        let result = with_retry(&self.policy, &ticket.cancel, |_| self.source.list_traces(filter)).await;

        if !self.list_gate.is_current(&ticket) {
            tracing::debug!(generation = ticket.generation, "discarding stale trace list");
            return LoadOutcome::Stale;
        }

        match result {
            Ok(summaries) => LoadOutcome::Applied(summaries),
            Err(err) => {
                self.notifier.notify(Notification::error(
                    format!("Failed to list traces: {err}"),
                    err.is_transient(),
                ));
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Abandon in-flight requests, e.g. when the consumer goes away
    pub fn cancel(&self) {
        self.trace_gate.cancel_all();
        self.list_gate.cancel_all();
    }
}
