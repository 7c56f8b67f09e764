use proptest::prelude::*;
use tracelens::config::{LayoutConfig, SequenceConfig};
use tracelens::protocol::*;
use tracelens::{layout, markov, normalize, sequence};
use tracelens::{Graph, Orientation, ParticipantMode, PlaybackFrame, SpanBuilder};

const AGENTS: [&str; 4] = ["planner", "researcher", "coder", "reviewer"];

#[derive(Clone, Debug)]
enum Step {
    Invoke { agent: usize, start: u64, duration: u64 },
    Handoff { from: usize, to: usize, at: u64 },
    Tool { start: u64, duration: u64 },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..AGENTS.len(), 0u64..10_000, 1u64..500)
            .prop_map(|(agent, start, duration)| Step::Invoke { agent, start, duration }),
        1 => (0..AGENTS.len(), 0..AGENTS.len(), 0u64..10_000)
            .prop_map(|(from, to, at)| Step::Handoff { from, to, at }),
        1 => (0u64..10_000, 1u64..500).prop_map(|(start, duration)| Step::Tool { start, duration }),
    ]
}

/// A root span with the generated steps as children, some nested one level
fn trace_from(steps: &[Step]) -> Trace {
    let mut root = SpanBuilder::new("root", "workflow").timing_ms(0, 11_000);
    let mut pending: Option<SpanBuilder> = None;

    for (i, step) in steps.iter().enumerate() {
        let id = format!("s{i}");
        let span = match *step {
            Step::Invoke { agent, start, duration } => {
                SpanBuilder::agent(id.as_str(), AGENTS[agent]).timing_ms(start, start + duration)
            }
            Step::Handoff { from, to, at } => {
                SpanBuilder::handoff(id.as_str(), AGENTS[from], AGENTS[to]).timing_ms(at, at + 1)
            }
            Step::Tool { start, duration } => {
                SpanBuilder::new(id.as_str(), "ai.tool.search").timing_ms(start, start + duration)
            }
        };
        // Every third span is nested under the previous one
        pending = match pending.take() {
            Some(parent) if i % 3 == 0 => Some(parent.child(span)),
            Some(parent) => {
                root = root.child(parent);
                Some(span)
            }
            None => Some(span),
        };
    }
    if let Some(parent) = pending {
        root = root.child(parent);
    }

    Trace::from_spans(TraceId::new("prop"), vec![root.build()])
}

proptest! {
    #[test]
    fn flatten_keeps_every_span_in_time_order(steps in prop::collection::vec(step(), 0..30)) {
        let trace = trace_from(&steps);
        let flat = normalize::flatten(&trace.roots);

        prop_assert_eq!(flat.len(), trace.span_count());
        prop_assert!(flat.windows(2).all(|w| w[0].start_time <= w[1].start_time));
        for span in &flat {
            if let Some(parent) = &span.parent_id {
                let parent = flat.iter().find(|p| &p.span_id == parent).unwrap();
                prop_assert_eq!(parent.depth + 1, span.depth);
            } else {
                prop_assert_eq!(span.depth, 0);
            }
        }
    }

    #[test]
    fn outgoing_probabilities_sum_to_one(steps in prop::collection::vec(step(), 0..30)) {
        let trace = trace_from(&steps);
        let chain = markov::extract(&trace.roots);

        for state in &chain.states {
            let outgoing: Vec<_> = chain.outgoing(&state.name).collect();
            if outgoing.is_empty() {
                continue;
            }
            let total: f64 = outgoing.iter().map(|t| t.probability).sum();
            prop_assert!((total - 1.0).abs() < 1e-9, "{} sums to {}", state.name, total);
        }

        // Every transition endpoint is a state
        for t in &chain.transitions {
            prop_assert!(chain.state(&t.from).is_some());
            prop_assert!(chain.state(&t.to).is_some());
        }

        let invocations = steps.iter().filter(|s| matches!(s, Step::Invoke { .. })).count();
        let counted: u32 = chain.states.iter().map(|s| s.invocation_count).sum();
        prop_assert_eq!(counted as usize, invocations);
        prop_assert_eq!(chain.timed_agent_events.len(), invocations);
    }

    #[test]
    fn layout_is_deterministic(steps in prop::collection::vec(step(), 0..30)) {
        let trace = trace_from(&steps);
        let chain = markov::extract(&trace.roots);
        let config = LayoutConfig::default();

        let graph = Graph::from_markov(&chain, &config);
        let first = layout::layout(&graph, Orientation::LeftRight, &config);
        let second = layout::layout(&graph, Orientation::LeftRight, &config);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.nodes.len(), chain.states.len());

        let self_loop_edges = graph.edges.iter().filter(|e| e.is_self_loop()).count();
        prop_assert_eq!(first.self_loops.len(), self_loop_edges);
        prop_assert_eq!(first.edges.len() + first.self_loops.len(), graph.edges.len());

        let calls = Graph::from_span_tree(&trace.roots, &config);
        let tree = layout::layout(&calls, Orientation::TopBottom, &config);
        prop_assert_eq!(tree.nodes.len(), trace.span_count());
        // Parents always sit on an earlier rank than their children
        for edge in &tree.edges {
            let source = tree.node(&edge.source).unwrap();
            let target = tree.node(&edge.target).unwrap();
            prop_assert!(source.rank < target.rank);
        }
    }

    #[test]
    fn sequence_has_one_call_per_span(steps in prop::collection::vec(step(), 0..30)) {
        let trace = trace_from(&steps);
        let flat = normalize::flatten(&trace.roots);
        let config = SequenceConfig::default();

        for mode in [ParticipantMode::PerSpan, ParticipantMode::ByName] {
            let diagram = sequence::build(&flat, mode, &config);
            let calls = diagram.events.iter().filter(|e| e.kind == sequence::EventKind::Call).count();
            let returns = diagram.events.iter().filter(|e| e.kind == sequence::EventKind::Return).count();
            let roots = flat.iter().filter(|s| s.parent_id.is_none()).count();

            prop_assert_eq!(calls, flat.len());
            prop_assert_eq!(returns, flat.len() - roots);
            prop_assert!(diagram.events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[test]
    fn playback_frame_at_end_is_static_chain(steps in prop::collection::vec(step(), 0..30)) {
        let trace = trace_from(&steps);
        let chain = markov::extract(&trace.roots);
        let end = chain.time_range.map(|r| r.end).unwrap_or_default();

        let frame = PlaybackFrame::at(&chain, end);
        prop_assert_eq!(&frame.chain.states, &chain.states);
        prop_assert_eq!(&frame.chain.transitions, &chain.transitions);
        prop_assert_eq!(&frame.chain.timed_transitions, &chain.timed_transitions);
    }
}
