//! View-local node/edge graphs built from span trees or agent chains.

use serde::Serialize;
use tracelens_protocol::*;

use crate::config::LayoutConfig;
use crate::markov::{AgentState, MarkovChain};
use crate::normalize::format_duration;

/// What a node stands for
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodePayload {
    Span {
        span_id: SpanId,
        name: String,
        category: SpanCategory,
        is_error: bool,
        duration_nanos: Option<u64>,
    },
    Agent(AgentState),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub width: f64,
    pub height: f64,
    pub payload: NodePayload,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: Option<String>,
    pub probability: Option<f64>,
    pub count: u32,
    /// Position among the self-loops of one node, innermost first
    pub self_loop_index: Option<usize>,
    pub animated: bool,
}

impl GraphEdge {
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn self_loops<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.is_self_loop() && e.source == node_id)
    }

    /// Call tree: one node per span, one edge per parent/child pair
    pub fn from_span_tree(roots: &[Span], config: &LayoutConfig) -> Self {
        let mut graph = Graph::default();

        for visit in depth_first(roots) {
            let span = visit.span;
            let label = match span.duration_nanos() {
                Some(d) => format!("{} ({})", span.name, format_duration(d)),
                None => span.name.clone(),
            };
            graph.nodes.push(GraphNode {
                id: span.span_id.to_string(),
                label,
                width: config.span_node_width,
                height: config.span_node_height,
                payload: NodePayload::Span {
                    span_id: span.span_id.clone(),
                    name: span.name.clone(),
                    category: span.category(),
                    is_error: span.is_error(),
                    duration_nanos: span.duration_nanos(),
                },
            });

            if let Some(parent) = visit.parent {
                graph.edges.push(GraphEdge {
                    id: format!("{}->{}", parent.span_id, span.span_id),
                    source: parent.span_id.to_string(),
                    target: span.span_id.to_string(),
                    label: None,
                    probability: None,
                    count: 1,
                    self_loop_index: None,
                    animated: false,
                });
            }
        }

        graph
    }

    /// Agent graph: one node per state, one edge per transition.
    ///
    /// A self-transition seen N times becomes N self-loop edges; only the
    /// outermost one carries the label.
    pub fn from_markov(chain: &MarkovChain, config: &LayoutConfig) -> Self {
        let mut graph = Graph::default();

        for state in &chain.states {
            let label = if state.invocation_count == 1 {
                format!("{} (1 call)", state.name)
            } else {
                format!("{} ({} calls)", state.name, state.invocation_count)
            };
            graph.nodes.push(GraphNode {
                id: state.name.clone(),
                label,
                width: config.agent_node_width,
                height: config.agent_node_height,
                payload: NodePayload::Agent(state.clone()),
            });
        }

        for transition in &chain.transitions {
            let label = probability_label(transition.probability);

            if transition.is_self_loop() {
                let loops = transition.count as usize;
                for index in 0..loops {
                    let outermost = index + 1 == loops;
                    graph.edges.push(GraphEdge {
                        id: format!("{}->{}#{}", transition.from, transition.to, index),
                        source: transition.from.clone(),
                        target: transition.to.clone(),
                        label: outermost.then(|| label.clone()),
                        probability: Some(transition.probability),
                        count: 1,
                        self_loop_index: Some(index),
                        animated: false,
                    });
                }
            } else {
                graph.edges.push(GraphEdge {
                    id: format!("{}->{}", transition.from, transition.to),
                    source: transition.from.clone(),
                    target: transition.to.clone(),
                    label: Some(label),
                    probability: Some(transition.probability),
                    count: transition.count,
                    self_loop_index: None,
                    animated: false,
                });
            }
        }

        graph
    }
}

pub fn probability_label(probability: f64) -> String {
    format!("{:.0}%", probability * 100.0)
}
