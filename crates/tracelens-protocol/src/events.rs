use serde::{Deserialize, Serialize};

use crate::ids::SpanId;
use crate::span::Timestamp;

/// Closed interval of trace time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    /// Build a range; the bounds are swapped if given in reverse
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn duration_nanos(&self) -> u64 {
        self.end.saturating_since(self.start)
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn clamp(&self, t: Timestamp) -> Timestamp {
        t.clamp(self.start, self.end)
    }
}

/// An agent invocation observed in a trace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentAppearance {
    pub agent: String,
    pub span_id: SpanId,
    pub timestamp: Timestamp,
    pub duration_nanos: u64,
    pub is_error: bool,
}

/// How a transition between agents was observed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOrigin {
    /// Explicit `ai.agent.handoff` span
    Handoff,
    /// Consecutive invocations of two different agents
    Sequential,
    /// Consecutive invocations of the same agent
    SelfLoop,
}

/// A single occurrence of a transition, stamped with trace time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedTransition {
    pub from: String,
    pub to: String,
    pub timestamp: Timestamp,
    pub origin: TransitionOrigin,
    /// Span that caused the transition (handoff span or the later invocation)
    pub span_id: Option<SpanId>,
}

impl TimedTransition {
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}
