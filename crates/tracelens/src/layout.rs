//! Layered (Sugiyama-style) graph layout.
//!
//! 1. self-loops are set aside; they never influence ranks
//! 2. cycles are broken by reversing DFS back edges
//! 3. ranks are assigned by longest path from the sources
//! 4. edges spanning several ranks are split with dummy nodes
//! 5. each rank is ordered by repeated barycenter sweeps, keeping the
//!    ordering with the fewest crossings
//! 6. ranks are packed along the cross axis and centered
//!
//! Every step iterates in node/edge insertion order, so identical input
//! produces identical coordinates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::config::LayoutConfig;
use crate::graph::{Graph, GraphEdge};

/// Extra space reserved beside a node for its self-loop labels
const LOOP_LABEL_ROOM: f64 = 14.0;
/// Gap between an edge and its reverse twin
const PARALLEL_EDGE_OFFSET: f64 = 6.0;
/// Smallest radius increment between stacked self-loops
const MIN_LOOP_STEP: f64 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Ranks flow downwards (call trees)
    #[default]
    TopBottom,
    /// Ranks flow rightwards (agent chains)
    LeftRight,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A node with its center position
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PositionedNode {
    pub id: String,
    pub rank: usize,
    pub order: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutedEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Polyline from source center to target center
    pub points: Vec<Point>,
    pub label: Option<String>,
    pub label_position: Option<Point>,
    pub animated: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelfLoopRoute {
    pub id: String,
    pub node: String,
    pub index: usize,
    pub radius: f64,
    /// SVG path data
    pub path: String,
    pub label: Option<String>,
    pub label_position: Option<Point>,
    pub animated: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Layout {
    pub orientation: Orientation,
    pub nodes: Vec<PositionedNode>,
    pub edges: Vec<RoutedEdge>,
    pub self_loops: Vec<SelfLoopRoute>,
    pub width: f64,
    pub height: f64,
}

impl Layout {
    pub fn node(&self, id: &str) -> Option<&PositionedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Radius of the self-loop at `index`, strictly increasing with the index
pub fn self_loop_radius(index: usize, config: &LayoutConfig) -> f64 {
    config.self_loop_base_radius.max(0.0) + index as f64 * config.self_loop_radius_step.max(MIN_LOOP_STEP)
}

/// Space a stack of `count` self-loops needs beside its node
fn self_loop_extent(count: usize, config: &LayoutConfig) -> f64 {
    if count == 0 {
        0.0
    } else {
        1.5 * self_loop_radius(count - 1, config) + LOOP_LABEL_ROOM
    }
}

/// Layout working graph: real nodes first, then dummies
struct Layered {
    rank: Vec<usize>,
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
    layers: Vec<Vec<usize>>,
    /// Node chain (source, dummies.., target) per ranked DAG edge
    chains: HashMap<(usize, usize), Vec<usize>>,
}

pub fn layout(graph: &Graph, orientation: Orientation, config: &LayoutConfig) -> Layout {
    // Unique node ids, first occurrence wins
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut nodes = Vec::new();
    for node in &graph.nodes {
        if index.contains_key(node.id.as_str()) {
            tracing::debug!(node = %node.id, "duplicate node id ignored by layout");
            continue;
        }
        index.insert(node.id.as_str(), nodes.len());
        nodes.push(node);
    }
    let n = nodes.len();

    let mut loop_counts = vec![0usize; n];
    let mut forward: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in &graph.edges {
        let (Some(&u), Some(&v)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) else {
            tracing::debug!(edge = %edge.id, "edge with unknown endpoint skipped");
            continue;
        };
        if u == v {
            loop_counts[u] += 1;
        } else {
            forward[u].push(v);
        }
    }
    for targets in &mut forward {
        targets.sort_unstable();
        targets.dedup();
    }

    let dag = break_cycles(&forward);
    let rank = longest_path_ranks(n, &dag);
    let mut layered = insert_dummies(rank, &dag);
    order_layers(&mut layered, config.ordering_sweeps);

    // Coordinates
    let (extent_cross, extent_rank): (Vec<f64>, Vec<f64>) = nodes
        .iter()
        .map(|node| match orientation {
            Orientation::TopBottom => (node.width, node.height),
            Orientation::LeftRight => (node.height, node.width),
        })
        .unzip();
    let total = layered.rank.len();
    let cross_extent = |v: usize| if v < n { extent_cross[v] } else { 0.0 };
    let rank_extent = |v: usize| if v < n { extent_rank[v] } else { 0.0 };
    let loop_extent = |v: usize| if v < n { self_loop_extent(loop_counts[v], config) } else { 0.0 };

    let mut cross = vec![0.0f64; total];
    let mut layer_spans = Vec::with_capacity(layered.layers.len());
    for layer in &layered.layers {
        let mut cursor = 0.0;
        for (i, &v) in layer.iter().enumerate() {
            if i > 0 {
                cursor += config.node_sep;
            }
            let extent = cross_extent(v);
            let room = loop_extent(v);
            // Loops sit on the cross-positive side top-down and the
            // cross-negative side left-right.
            cross[v] = match orientation {
                Orientation::TopBottom => cursor + extent / 2.0,
                Orientation::LeftRight => cursor + room + extent / 2.0,
            };
            cursor += extent + room;
        }
        layer_spans.push(cursor);
    }
    let max_span = layer_spans.iter().copied().fold(0.0, f64::max);
    for (layer, span) in layered.layers.iter().zip(&layer_spans) {
        let shift = config.margin + (max_span - span) / 2.0;
        for &v in layer {
            cross[v] += shift;
        }
    }

    let thickness: Vec<f64> = layered
        .layers
        .iter()
        .map(|layer| layer.iter().map(|&v| rank_extent(v)).fold(0.0, f64::max))
        .collect();
    let mut rank_pos = Vec::with_capacity(thickness.len());
    let mut cursor = config.margin;
    for (r, t) in thickness.iter().enumerate() {
        if r > 0 {
            cursor += config.rank_sep;
        }
        rank_pos.push(cursor + t / 2.0);
        cursor += t;
    }
    let rank_total = cursor + config.margin;
    let cross_total = max_span + 2.0 * config.margin;

    let point = |v: usize| {
        let along = rank_pos[layered.rank[v]];
        match orientation {
            Orientation::TopBottom => Point::new(cross[v], along),
            Orientation::LeftRight => Point::new(along, cross[v]),
        }
    };

    let mut order_of = vec![0usize; total];
    for layer in &layered.layers {
        for (i, &v) in layer.iter().enumerate() {
            order_of[v] = i;
        }
    }

    let positioned: Vec<PositionedNode> = nodes
        .iter()
        .enumerate()
        .map(|(v, node)| {
            let p = point(v);
            PositionedNode {
                id: node.id.clone(),
                rank: layered.rank[v],
                order: order_of[v],
                x: p.x,
                y: p.y,
                width: node.width,
                height: node.height,
            }
        })
        .collect();

    // Edge routes
    let mut edges = Vec::new();
    let mut self_loops = Vec::new();
    for edge in &graph.edges {
        let (Some(&u), Some(&v)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) else {
            continue;
        };

        if u == v {
            let loop_index = edge.self_loop_index.unwrap_or(0);
            self_loops.push(route_self_loop(
                &positioned[u],
                loop_index,
                orientation,
                config,
                edge,
            ));
            continue;
        }

        let mut points: Vec<Point> = match layered.chains.get(&(u, v)) {
            Some(chain) => chain.iter().map(|&w| point(w)).collect(),
            None => match layered.chains.get(&(v, u)) {
                Some(chain) => chain.iter().rev().map(|&w| point(w)).collect(),
                None => vec![point(u), point(v)],
            },
        };

        if forward[v].contains(&u) {
            offset_to_the_right(&mut points, PARALLEL_EDGE_OFFSET);
        }

        let label_position = edge.label.as_ref().map(|_| midpoint(&points));
        edges.push(RoutedEdge {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            points,
            label: edge.label.clone(),
            label_position,
            animated: edge.animated,
        });
    }

    let (width, height) = match orientation {
        Orientation::TopBottom => (cross_total, rank_total),
        Orientation::LeftRight => (rank_total, cross_total),
    };

    Layout {
        orientation,
        nodes: positioned,
        edges,
        self_loops,
        width,
        height,
    }
}

/// Reverse DFS back edges. Returns the resulting acyclic edge set.
fn break_cycles(forward: &[Vec<usize>]) -> BTreeSet<(usize, usize)> {
    const UNVISITED: u8 = 0;
    const ON_STACK: u8 = 1;
    const DONE: u8 = 2;

    let n = forward.len();
    let mut state = vec![UNVISITED; n];
    let mut dag = BTreeSet::new();

    for start in 0..n {
        if state[start] != UNVISITED {
            continue;
        }
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        state[start] = ON_STACK;

        while let Some(top) = stack.last_mut() {
            let u = top.0;
            if let Some(&v) = forward[u].get(top.1) {
                top.1 += 1;
                match state[v] {
                    UNVISITED => {
                        dag.insert((u, v));
                        state[v] = ON_STACK;
                        stack.push((v, 0));
                    }
                    ON_STACK => {
                        dag.insert((v, u));
                    }
                    _ => {
                        dag.insert((u, v));
                    }
                }
            } else {
                state[u] = DONE;
                stack.pop();
            }
        }
    }

    dag
}

/// Rank = length of the longest path from any source (Kahn order)
fn longest_path_ranks(n: usize, dag: &BTreeSet<(usize, usize)>) -> Vec<usize> {
    let mut indegree = vec![0usize; n];
    let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(u, v) in dag {
        indegree[v] += 1;
        succs[u].push(v);
    }

    let mut rank = vec![0usize; n];
    let mut ready: BTreeSet<usize> = (0..n).filter(|&v| indegree[v] == 0).collect();
    while let Some(u) = ready.pop_first() {
        for &v in &succs[u] {
            rank[v] = rank[v].max(rank[u] + 1);
            indegree[v] -= 1;
            if indegree[v] == 0 {
                ready.insert(v);
            }
        }
    }
    rank
}

fn insert_dummies(mut rank: Vec<usize>, dag: &BTreeSet<(usize, usize)>) -> Layered {
    let n = rank.len();
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut chains = HashMap::new();

    for &(u, v) in dag {
        let mut chain = vec![u];
        let mut prev = u;
        for r in rank[u] + 1..rank[v] {
            let dummy = rank.len();
            rank.push(r);
            preds.push(Vec::new());
            succs.push(Vec::new());
            succs[prev].push(dummy);
            preds[dummy].push(prev);
            chain.push(dummy);
            prev = dummy;
        }
        succs[prev].push(v);
        preds[v].push(prev);
        chain.push(v);
        chains.insert((u, v), chain);
    }

    let rank_count = rank.iter().copied().max().map_or(0, |r| r + 1);
    let mut layers = vec![Vec::new(); rank_count];
    for (v, &r) in rank.iter().enumerate() {
        layers[r].push(v);
    }

    Layered {
        rank,
        preds,
        succs,
        layers,
        chains,
    }
}

fn order_layers(layered: &mut Layered, sweeps: usize) {
    let mut best = layered.layers.clone();
    let mut best_crossings = total_crossings(&layered.layers, &layered.succs, layered.rank.len());

    for sweep in 0..sweeps {
        let mut position = positions(&layered.layers, layered.rank.len());
        let count = layered.layers.len();
        let downward = sweep % 2 == 0;
        let ranks: Vec<usize> = if downward {
            (1..count).collect()
        } else {
            (0..count.saturating_sub(1)).rev().collect()
        };

        for r in ranks {
            let neighbours = if downward { &layered.preds } else { &layered.succs };
            let layer = &mut layered.layers[r];
            let mut keyed: Vec<(f64, usize, usize)> = layer
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    let adjacent = &neighbours[v];
                    let bary = if adjacent.is_empty() {
                        i as f64
                    } else {
                        adjacent.iter().map(|&w| position[w] as f64).sum::<f64>() / adjacent.len() as f64
                    };
                    (bary, i, v)
                })
                .collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            *layer = keyed.into_iter().map(|(_, _, v)| v).collect();
            for (i, &v) in layer.iter().enumerate() {
                position[v] = i;
            }
        }

        let crossings = total_crossings(&layered.layers, &layered.succs, layered.rank.len());
        if crossings < best_crossings {
            best_crossings = crossings;
            best = layered.layers.clone();
        }
    }

    layered.layers = best;
}

fn positions(layers: &[Vec<usize>], total: usize) -> Vec<usize> {
    let mut position = vec![0usize; total];
    for layer in layers {
        for (i, &v) in layer.iter().enumerate() {
            position[v] = i;
        }
    }
    position
}

fn total_crossings(layers: &[Vec<usize>], succs: &[Vec<usize>], total: usize) -> usize {
    let position = positions(layers, total);
    let mut crossings = 0;
    for layer in layers {
        let segments: Vec<(usize, usize)> = layer
            .iter()
            .flat_map(|&u| succs[u].iter().map(move |&v| (u, v)))
            .map(|(u, v)| (position[u], position[v]))
            .collect();
        for (i, a) in segments.iter().enumerate() {
            for b in &segments[i + 1..] {
                if (a.0 < b.0 && a.1 > b.1) || (a.0 > b.0 && a.1 < b.1) {
                    crossings += 1;
                }
            }
        }
    }
    crossings
}

fn route_self_loop(
    node: &PositionedNode,
    index: usize,
    orientation: Orientation,
    config: &LayoutConfig,
    edge: &GraphEdge,
) -> SelfLoopRoute {
    let radius = self_loop_radius(index, config);
    let (path, label_anchor) = match orientation {
        Orientation::TopBottom => {
            let sx = node.x + node.width / 2.0;
            let sy = node.y - node.height / 4.0;
            let ey = node.y + node.height / 4.0;
            let path = format!(
                "M {:.1} {:.1} C {:.1} {:.1}, {:.1} {:.1}, {:.1} {:.1}",
                sx,
                sy,
                sx + 2.0 * radius,
                sy - radius,
                sx + 2.0 * radius,
                ey + radius,
                sx,
                ey
            );
            (path, Point::new(sx + 1.5 * radius + 4.0, node.y))
        }
        Orientation::LeftRight => {
            let sx = node.x - node.width / 4.0;
            let ex = node.x + node.width / 4.0;
            let sy = node.y - node.height / 2.0;
            let path = format!(
                "M {:.1} {:.1} C {:.1} {:.1}, {:.1} {:.1}, {:.1} {:.1}",
                sx,
                sy,
                sx - radius,
                sy - 2.0 * radius,
                ex + radius,
                sy - 2.0 * radius,
                ex,
                sy
            );
            (path, Point::new(node.x, sy - 1.5 * radius - 4.0))
        }
    };

    SelfLoopRoute {
        id: edge.id.clone(),
        node: node.id.clone(),
        index,
        radius,
        path,
        label: edge.label.clone(),
        label_position: edge.label.as_ref().map(|_| label_anchor),
        animated: edge.animated,
    }
}

/// Shift a polyline sideways, to the right of its overall direction
fn offset_to_the_right(points: &mut [Point], distance: f64) {
    let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) else {
        return;
    };
    let (dx, dy) = (last.x - first.x, last.y - first.y);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return;
    }
    // Screen coordinates grow downwards, so (-dy, dx) points right of travel.
    let (nx, ny) = (-dy / len * distance, dx / len * distance);
    for p in points {
        p.x += nx;
        p.y += ny;
    }
}

fn midpoint(points: &[Point]) -> Point {
    match points.len() {
        0 => Point::new(0.0, 0.0),
        len if len % 2 == 1 => points[len / 2],
        len => {
            let (a, b) = (points[len / 2 - 1], points[len / 2]);
            Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
        }
    }
}
