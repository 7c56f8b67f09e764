//! Agent Markov chain extraction.
//!
//! Agent invocations and explicit handoffs are collected from the span tree,
//! consecutive invocations are turned into implicit transitions, and every
//! transition gets an empirical probability `count / outgoing(from)`.
//!
//! An implicit transition `a_i -> a_{i+1}` is dropped when an explicit handoff
//! with the same endpoints falls inside `[t_i, t_{i+1}]`. Each handoff absorbs
//! at most one implicit transition, earliest handoff first.

use serde::Serialize;
use std::collections::BTreeMap;
use tracelens_protocol::conventions::names;
use tracelens_protocol::*;

/// Aggregated statistics of one agent
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentState {
    pub name: String,
    /// Zero for agents only referenced by handoffs
    pub invocation_count: u32,
    pub total_duration_nanos: u64,
    pub has_error: bool,
    pub first_seen: Timestamp,
}

impl AgentState {
    fn placeholder(name: &str, seen: Timestamp) -> Self {
        Self {
            name: name.to_string(),
            invocation_count: 0,
            total_duration_nanos: 0,
            has_error: false,
            first_seen: seen,
        }
    }

    fn saw(&mut self, at: Timestamp) {
        self.first_seen = self.first_seen.min(at);
    }
}

/// Aggregated transition between two agents
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub count: u32,
    /// `count / Σ count(from -> *)`
    pub probability: f64,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
}

impl Transition {
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Derived agent state/transition model of a trace
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MarkovChain {
    /// Ordered by first appearance, then name
    pub states: Vec<AgentState>,
    /// Ordered by first occurrence, then endpoints
    pub transitions: Vec<Transition>,
    /// Every individual transition occurrence, ordered by time
    pub timed_transitions: Vec<TimedTransition>,
    /// Every agent invocation, ordered by time
    pub timed_agent_events: Vec<AgentAppearance>,
    /// Time range of the whole trace
    pub time_range: Option<TimeRange>,
}

impl MarkovChain {
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, name: &str) -> Option<&AgentState> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn transition(&self, from: &str, to: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.from == from && t.to == to)
    }

    /// Probability of `from -> to`, zero when the edge does not exist
    pub fn probability(&self, from: &str, to: &str) -> f64 {
        self.transition(from, to).map_or(0.0, |t| t.probability)
    }

    pub fn outgoing<'a>(&'a self, from: &'a str) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions.iter().filter(move |t| t.from == from)
    }

    pub fn outgoing_count(&self, from: &str) -> u32 {
        self.outgoing(from).map(|t| t.count).sum()
    }
}

/// Extract the agent Markov chain from a span forest.
///
/// Spans lacking the attributes their marker requires are skipped. A forest
/// without agent spans yields an empty chain.
pub fn extract(roots: &[Span]) -> MarkovChain {
    let mut states: BTreeMap<String, AgentState> = BTreeMap::new();
    let mut appearances: Vec<AgentAppearance> = Vec::new();
    let mut handoffs: Vec<TimedTransition> = Vec::new();

    for visit in depth_first(roots) {
        let span = visit.span;

        if let Some(agent) = span.invoked_agent() {
            let duration = span.duration_nanos().unwrap_or(0);
            appearances.push(AgentAppearance {
                agent: agent.to_string(),
                span_id: span.span_id.clone(),
                timestamp: span.start_time,
                duration_nanos: duration,
                is_error: span.is_error(),
            });

            let state = states
                .entry(agent.to_string())
                .or_insert_with(|| AgentState::placeholder(agent, span.start_time));
            state.invocation_count += 1;
            state.total_duration_nanos = state.total_duration_nanos.saturating_add(duration);
            state.has_error |= span.is_error();
            state.saw(span.start_time);
        } else if let Some((from, to)) = span.handoff() {
            handoffs.push(TimedTransition {
                from: from.to_string(),
                to: to.to_string(),
                timestamp: span.start_time,
                origin: TransitionOrigin::Handoff,
                span_id: Some(span.span_id.clone()),
            });

            for agent in [from, to] {
                states
                    .entry(agent.to_string())
                    .or_insert_with(|| AgentState::placeholder(agent, span.start_time))
                    .saw(span.start_time);
            }
        } else if span.is_agent_invocation() || span.name == names::AGENT_HANDOFF {
            tracing::trace!(span_id = %span.span_id, name = %span.name, "agent marker without required attributes skipped");
        }
    }

    appearances.sort_by_key(|a| a.timestamp);
    handoffs.sort_by_key(|h| h.timestamp);

    let mut timed_transitions = handoffs.clone();
    timed_transitions.extend(implicit_transitions(&appearances, &handoffs));
    timed_transitions.sort_by_key(|t| t.timestamp);

    let transitions = aggregate(&timed_transitions);

    let mut states: Vec<AgentState> = states.into_values().collect();
    states.sort_by(|a, b| {
        a.first_seen
            .cmp(&b.first_seen)
            .then_with(|| a.name.cmp(&b.name))
    });

    MarkovChain {
        states,
        transitions,
        timed_transitions,
        timed_agent_events: appearances,
        time_range: time_range(roots),
    }
}

/// Transitions implied by consecutive invocations, minus those already
/// explained by an explicit handoff.
fn implicit_transitions(
    appearances: &[AgentAppearance],
    handoffs: &[TimedTransition],
) -> Vec<TimedTransition> {
    let mut consumed = vec![false; handoffs.len()];
    let mut implicit = Vec::new();

    for pair in appearances.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);

        let covering = handoffs.iter().enumerate().position(|(i, h)| {
            !consumed[i]
                && h.from == prev.agent
                && h.to == next.agent
                && prev.timestamp <= h.timestamp
                && h.timestamp <= next.timestamp
        });
        if let Some(i) = covering {
            consumed[i] = true;
            continue;
        }

        let origin = if prev.agent == next.agent {
            TransitionOrigin::SelfLoop
        } else {
            TransitionOrigin::Sequential
        };
        implicit.push(TimedTransition {
            from: prev.agent.clone(),
            to: next.agent.clone(),
            timestamp: next.timestamp,
            origin,
            span_id: Some(next.span_id.clone()),
        });
    }

    implicit
}

pub(crate) fn aggregate(timed: &[TimedTransition]) -> Vec<Transition> {
    let mut by_edge: BTreeMap<(&str, &str), Transition> = BTreeMap::new();
    for t in timed {
        by_edge
            .entry((t.from.as_str(), t.to.as_str()))
            .and_modify(|agg| {
                agg.count += 1;
                agg.first_seen = agg.first_seen.min(t.timestamp);
                agg.last_seen = agg.last_seen.max(t.timestamp);
            })
            .or_insert_with(|| Transition {
                from: t.from.clone(),
                to: t.to.clone(),
                count: 1,
                probability: 0.0,
                first_seen: t.timestamp,
                last_seen: t.timestamp,
            });
    }

    let mut outgoing: BTreeMap<&str, u32> = BTreeMap::new();
    for ((from, _), t) in &by_edge {
        *outgoing.entry(*from).or_default() += t.count;
    }

    let mut transitions: Vec<Transition> = by_edge
        .iter()
        .map(|((from, _), t)| {
            let total = outgoing.get(from).copied().unwrap_or(0);
            let probability = if total == 0 {
                0.0
            } else {
                f64::from(t.count) / f64::from(total)
            };
            Transition {
                probability,
                ..t.clone()
            }
        })
        .collect();

    transitions.sort_by(|a, b| {
        a.first_seen
            .cmp(&b.first_seen)
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.to.cmp(&b.to))
    });
    transitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span_builder::SpanBuilder;

    fn agents(sequence: &[(&str, u64)]) -> Span {
        sequence.iter().enumerate().fold(
            SpanBuilder::new("root", "workflow").timing_ms(0, 1_000),
            |root, (i, (agent, start))| {
                root.child(SpanBuilder::agent(format!("a{i}"), agent).timing_ms(*start, start + 5))
            },
        )
        .build()
    }

    #[test]
    fn consecutive_invocations_build_chain() {
        let root = agents(&[("A", 0), ("B", 10), ("B", 20), ("A", 30)]);
        let chain = extract(std::slice::from_ref(&root));

        assert_eq!(chain.state("A").unwrap().invocation_count, 2);
        assert_eq!(chain.state("B").unwrap().invocation_count, 2);
        assert_eq!(chain.transition("A", "B").unwrap().count, 1);
        assert_eq!(chain.transition("B", "B").unwrap().count, 1);
        assert_eq!(chain.transition("B", "A").unwrap().count, 1);
        assert!(chain.transition("B", "B").unwrap().is_self_loop());
        assert_eq!(chain.probability("B", "B"), 0.5);
        assert_eq!(chain.probability("B", "A"), 0.5);
        assert_eq!(chain.probability("A", "B"), 1.0);
        assert_eq!(chain.transitions.len(), 3);

        let origins: Vec<_> = chain.timed_transitions.iter().map(|t| t.origin).collect();
        assert_eq!(
            origins,
            [
                TransitionOrigin::Sequential,
                TransitionOrigin::SelfLoop,
                TransitionOrigin::Sequential
            ]
        );
    }

    #[test]
    fn runs_collapse_into_self_loops() {
        let root = agents(&[("A", 0), ("A", 10), ("A", 20), ("A", 30)]);
        let chain = extract(std::slice::from_ref(&root));

        assert_eq!(chain.transitions.len(), 1);
        assert_eq!(chain.transition("A", "A").unwrap().count, 3);
        let stamps: Vec<_> = chain
            .timed_transitions
            .iter()
            .map(|t| t.timestamp)
            .collect();
        assert_eq!(
            stamps,
            [
                Timestamp::from_millis(10),
                Timestamp::from_millis(20),
                Timestamp::from_millis(30)
            ]
        );
    }

    #[test]
    fn no_agents_means_empty_chain() {
        let root = SpanBuilder::new("root", "GET /health")
            .timing_ms(0, 3)
            .child(SpanBuilder::new("db", "SELECT 1").timing_ms(1, 2))
            .build();
        let chain = extract(std::slice::from_ref(&root));

        assert!(chain.is_empty());
        assert!(chain.transitions.is_empty());
        assert!(chain.timed_transitions.is_empty());
        assert!(chain.time_range.is_some());
    }

    #[test]
    fn explicit_handoff_covers_matching_implicit_transition() {
        let root = SpanBuilder::new("root", "workflow")
            .timing_ms(0, 100)
            .child(SpanBuilder::agent("a1", "triage").timing_ms(0, 5))
            .child(SpanBuilder::handoff("h1", "triage", "billing").timing_ms(6, 6))
            .child(SpanBuilder::agent("a2", "billing").timing_ms(10, 20))
            .build();
        let chain = extract(std::slice::from_ref(&root));

        let t = chain.transition("triage", "billing").unwrap();
        assert_eq!(t.count, 1);
        assert_eq!(chain.timed_transitions.len(), 1);
        assert_eq!(chain.timed_transitions[0].origin, TransitionOrigin::Handoff);
    }

    #[test]
    fn handoff_outside_window_does_not_cover() {
        let root = SpanBuilder::new("root", "workflow")
            .timing_ms(0, 100)
            .child(SpanBuilder::agent("a1", "triage").timing_ms(10, 15))
            .child(SpanBuilder::agent("a2", "billing").timing_ms(20, 25))
            .child(SpanBuilder::handoff("h1", "triage", "billing").timing_ms(40, 40))
            .build();
        let chain = extract(std::slice::from_ref(&root));

        assert_eq!(chain.transition("triage", "billing").unwrap().count, 2);
    }

    #[test]
    fn handoff_endpoints_become_placeholder_states() {
        let root = SpanBuilder::new("root", "workflow")
            .timing_ms(0, 100)
            .child(SpanBuilder::agent("a1", "triage").timing_ms(0, 5))
            .child(SpanBuilder::handoff("h1", "triage", "human").timing_ms(8, 8))
            .build();
        let chain = extract(std::slice::from_ref(&root));

        let human = chain.state("human").unwrap();
        assert_eq!(human.invocation_count, 0);
        assert_eq!(human.first_seen, Timestamp::from_millis(8));
        assert_eq!(chain.probability("triage", "human"), 1.0);
        let names: Vec<_> = chain.states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["triage", "human"]);
    }

    #[test]
    fn malformed_markers_are_skipped() {
        let root = SpanBuilder::new("root", "workflow")
            .timing_ms(0, 100)
            .child(SpanBuilder::new("x", names::AGENT_INVOKE).timing_ms(1, 2))
            .child(
                SpanBuilder::new("y", names::AGENT_HANDOFF)
                    .with_attribute("ai.agent.handoff.from", "a")
                    .timing_ms(3, 4),
            )
            .child(SpanBuilder::agent("z", "  ").timing_ms(5, 6))
            .build();
        let chain = extract(std::slice::from_ref(&root));

        assert!(chain.is_empty());
        assert!(chain.transitions.is_empty());
    }

    #[test]
    fn state_aggregates_duration_and_errors() {
        let root = SpanBuilder::new("root", "workflow")
            .timing_ms(0, 100)
            .child(SpanBuilder::agent("a1", "writer").timing_ms(0, 10))
            .child(
                SpanBuilder::agent("a2", "writer")
                    .timing_ms(20, 50)
                    .error("rate limited"),
            )
            .build();
        let chain = extract(std::slice::from_ref(&root));

        let writer = chain.state("writer").unwrap();
        assert_eq!(writer.total_duration_nanos, 40_000_000);
        assert!(writer.has_error);
        assert_eq!(writer.first_seen, Timestamp::from_millis(0));
    }

    #[test]
    fn gen_ai_conventions_are_recognised() {
        let root = SpanBuilder::new("root", "invoke_agent researcher")
            .with_attribute("gen_ai.operation.name", "invoke_agent")
            .with_attribute("gen_ai.agent.name", "researcher")
            .timing_ms(0, 10)
            .build();
        let chain = extract(std::slice::from_ref(&root));

        assert_eq!(chain.state("researcher").unwrap().invocation_count, 1);
    }
}
