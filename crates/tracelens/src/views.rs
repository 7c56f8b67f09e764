//! Derived views of one trace, each computed at most once.

use std::sync::{Arc, OnceLock};
use tracelens_protocol::*;

use crate::config::Config;
use crate::graph::Graph;
use crate::layout::{layout, Layout, Orientation};
use crate::markov::{self, MarkovChain};
use crate::normalize::{flatten, FlatSpan};
use crate::playback::PlaybackFrame;
use crate::sequence::{self, ParticipantMode, SequenceDiagram};

/// Lazily memoized views over an immutable trace.
///
/// Views are keyed on the `Arc` they were built from; a new trace needs a
/// new `TraceViews`.
pub struct TraceViews {
    trace: Arc<Trace>,
    config: Arc<Config>,
    flat: OnceLock<Vec<FlatSpan>>,
    markov: OnceLock<MarkovChain>,
    call_graph: OnceLock<Layout>,
    agent_graph: OnceLock<Layout>,
    sequence_per_span: OnceLock<SequenceDiagram>,
    sequence_by_name: OnceLock<SequenceDiagram>,
}

impl TraceViews {
    pub fn new(trace: Arc<Trace>, config: Arc<Config>) -> Self {
        Self {
            trace,
            config,
            flat: OnceLock::new(),
            markov: OnceLock::new(),
            call_graph: OnceLock::new(),
            agent_graph: OnceLock::new(),
            sequence_per_span: OnceLock::new(),
            sequence_by_name: OnceLock::new(),
        }
    }

    pub fn trace(&self) -> &Arc<Trace> {
        &self.trace
    }

    /// Whether these views were derived from `trace`
    pub fn is_for(&self, trace: &Arc<Trace>) -> bool {
        Arc::ptr_eq(&self.trace, trace)
    }

    pub fn flat_spans(&self) -> &[FlatSpan] {
        self.flat.get_or_init(|| flatten(&self.trace.roots))
    }

    pub fn markov(&self) -> &MarkovChain {
        self.markov.get_or_init(|| markov::extract(&self.trace.roots))
    }

    /// Call tree, top to bottom
    pub fn call_graph(&self) -> &Layout {
        self.call_graph.get_or_init(|| {
            let graph = Graph::from_span_tree(&self.trace.roots, &self.config.layout);
            layout(&graph, Orientation::TopBottom, &self.config.layout)
        })
    }

    /// Agent chain, left to right
    pub fn agent_graph(&self) -> &Layout {
        self.agent_graph.get_or_init(|| {
            let graph = Graph::from_markov(self.markov(), &self.config.layout);
            layout(&graph, Orientation::LeftRight, &self.config.layout)
        })
    }

    pub fn sequence(&self, mode: ParticipantMode) -> &SequenceDiagram {
        let cell = match mode {
            ParticipantMode::PerSpan => &self.sequence_per_span,
            ParticipantMode::ByName => &self.sequence_by_name,
        };
        cell.get_or_init(|| sequence::build(self.flat_spans(), mode, &self.config.sequence))
    }

    /// Agent graph state at `t`; not memoized
    pub fn playback_frame(&self, t: Timestamp) -> PlaybackFrame {
        PlaybackFrame::at(self.markov(), t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span_builder::SpanBuilder;

    fn views() -> TraceViews {
        let root = SpanBuilder::new("root", "workflow")
            .timing_ms(0, 50)
            .child(SpanBuilder::agent("1", "planner").timing_ms(0, 10))
            .child(SpanBuilder::agent("2", "coder").timing_ms(20, 30))
            .build();
        let trace = Trace::from_spans(TraceId::new("t"), vec![root]);
        TraceViews::new(Arc::new(trace), Arc::new(Config::default()))
    }

    #[test]
    fn views_are_computed_once() {
        let views = views();
        assert!(std::ptr::eq(views.markov(), views.markov()));
        assert!(std::ptr::eq(views.agent_graph(), views.agent_graph()));
        assert!(std::ptr::eq(
            views.sequence(ParticipantMode::PerSpan),
            views.sequence(ParticipantMode::PerSpan)
        ));
        assert_eq!(views.flat_spans().len(), 3);
    }

    #[test]
    fn views_derive_from_the_same_trace() {
        let views = views();
        assert_eq!(views.call_graph().nodes.len(), views.flat_spans().len());
        assert_eq!(views.agent_graph().nodes.len(), views.markov().states.len());
        assert_eq!(views.agent_graph().orientation, Orientation::LeftRight);
        assert!(views.is_for(&views.trace().clone()));

        let end = views.markov().time_range.unwrap().end;
        assert_eq!(&views.playback_frame(end).chain, views.markov());
    }
}
