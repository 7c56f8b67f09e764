//! Request generations: only the most recent request may apply its result.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Issued by [`RequestGate::begin`]; carries the generation and a token
/// that fires once a newer request supersedes it.
#[derive(Clone, Debug)]
pub struct RequestTicket {
    pub generation: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct RequestGate {
    generation: AtomicU64,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request, cancelling the one in flight
    pub fn begin(&self) -> RequestTicket {
        let cancel = CancellationToken::new();
        let mut in_flight = self.in_flight.lock();
        if let Some(previous) = in_flight.replace(cancel.clone()) {
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket { generation, cancel }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cancel whatever is in flight; later tickets are unaffected
    pub fn cancel_all(&self) {
        if let Some(token) = self.in_flight.lock().take() {
            token.cancel();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
