//! Sequence diagrams: one lane per participant, a call arrow when a span
//! starts and a return arrow when a child span ends.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracelens_protocol::*;

use crate::config::SequenceConfig;
use crate::layout::Point;
use crate::normalize::{format_duration, FlatSpan};

/// How spans map onto lanes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantMode {
    /// One lane per span
    #[default]
    #[serde(alias = "span")]
    PerSpan,
    /// One lane per distinct span name
    #[serde(alias = "name")]
    ByName,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Participant {
    pub id: String,
    pub label: String,
    pub lane: usize,
    /// Center of the lane
    pub x: f64,
    pub span_ids: Vec<SpanId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Call,
    Return,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Arrow {
    Straight { from: Point, to: Point },
    /// Out and back on the same lane
    SelfCall { points: Vec<Point>, offset: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SequenceEvent {
    pub kind: EventKind,
    pub span_id: SpanId,
    pub label: String,
    pub timestamp: Timestamp,
    /// `None` for the call that opens a root span
    pub from_lane: Option<usize>,
    pub to_lane: usize,
    pub row: usize,
    pub y: f64,
    pub is_error: bool,
    pub arrow: Option<Arrow>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SequenceDiagram {
    pub participants: Vec<Participant>,
    pub events: Vec<SequenceEvent>,
    pub width: f64,
    pub height: f64,
}

impl SequenceDiagram {
    pub fn events_for<'a>(&'a self, span_id: &'a SpanId) -> impl Iterator<Item = &'a SequenceEvent> + 'a {
        self.events.iter().filter(move |e| &e.span_id == span_id)
    }
}

/// Build a sequence diagram from a flattened span list (see [`crate::normalize::flatten`])
pub fn build(spans: &[FlatSpan], mode: ParticipantMode, config: &SequenceConfig) -> SequenceDiagram {
    let lane_x = |lane: usize| config.margin + lane as f64 * config.lane_width + config.lane_width / 2.0;

    // Lanes in first-appearance order
    let mut participants: Vec<Participant> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut lane_of: HashMap<&SpanId, usize> = HashMap::new();
    for span in spans {
        let key = match mode {
            ParticipantMode::PerSpan => span.span_id.to_string(),
            ParticipantMode::ByName => span.name.clone(),
        };
        let lane = *by_key.entry(key.clone()).or_insert_with(|| {
            let lane = participants.len();
            participants.push(Participant {
                id: key,
                label: span.name.clone(),
                lane,
                x: lane_x(lane),
                span_ids: Vec::new(),
            });
            lane
        });
        participants[lane].span_ids.push(span.span_id.clone());
        lane_of.insert(&span.span_id, lane);
    }

    let mut events = Vec::with_capacity(spans.len() * 2);
    for span in spans {
        let Some(&lane) = lane_of.get(&span.span_id) else {
            continue;
        };
        let parent_lane = span.parent_id.as_ref().and_then(|p| lane_of.get(p)).copied();
        if span.parent_id.is_some() && parent_lane.is_none() {
            tracing::debug!(span = %span.span_id, "parent not in span list, drawing as root");
        }

        events.push(SequenceEvent {
            kind: EventKind::Call,
            span_id: span.span_id.clone(),
            label: span.name.clone(),
            timestamp: span.start_time,
            from_lane: parent_lane,
            to_lane: lane,
            row: 0,
            y: 0.0,
            is_error: span.is_error,
            arrow: None,
        });

        if let Some(parent_lane) = parent_lane {
            events.push(SequenceEvent {
                kind: EventKind::Return,
                span_id: span.span_id.clone(),
                label: span
                    .duration_nanos
                    .map(format_duration)
                    .unwrap_or_default(),
                timestamp: span.effective_end(),
                from_lane: Some(lane),
                to_lane: parent_lane,
                row: 0,
                y: 0.0,
                is_error: span.is_error,
                arrow: None,
            });
        }
    }

    // Stable: equal (timestamp, kind) keep span order
    events.sort_by_key(|e| (e.timestamp, e.kind));

    let mut open_self_calls: HashMap<usize, Vec<SpanId>> = HashMap::new();
    let top = config.margin + config.header_height;
    let mut widest_self_call = 0.0f64;
    for (row, event) in events.iter_mut().enumerate() {
        event.row = row;
        event.y = top + row as f64 * config.row_height + config.row_height / 2.0;

        let Some(from) = event.from_lane else {
            continue;
        };

        event.arrow = if from == event.to_lane {
            let stack = open_self_calls.entry(from).or_default();
            let depth = match event.kind {
                EventKind::Call => {
                    stack.push(event.span_id.clone());
                    stack.len() - 1
                }
                EventKind::Return => match stack.iter().position(|id| id == &event.span_id) {
                    Some(pos) => {
                        stack.remove(pos);
                        pos
                    }
                    None => 0,
                },
            };
            let offset = depth as f64 * config.self_call_stack_offset;
            widest_self_call = widest_self_call.max(offset + config.self_call_width);

            let x = lane_x(from) + offset;
            let (y0, y1) = (event.y, event.y + config.row_height / 2.0);
            Some(Arrow::SelfCall {
                points: vec![
                    Point::new(x, y0),
                    Point::new(x + config.self_call_width, y0),
                    Point::new(x + config.self_call_width, y1),
                    Point::new(x, y1),
                ],
                offset,
            })
        } else {
            let (x0, x1) = (lane_x(from), lane_x(event.to_lane));
            if (x1 - x0).abs() < config.min_arrow_length {
                None
            } else {
                Some(Arrow::Straight {
                    from: Point::new(x0, event.y),
                    to: Point::new(x1, event.y),
                })
            }
        };
    }

    let lanes_width = participants.len() as f64 * config.lane_width;
    let overhang = (widest_self_call - config.lane_width / 2.0).max(0.0);
    SequenceDiagram {
        width: 2.0 * config.margin + lanes_width + overhang,
        height: top + events.len() as f64 * config.row_height + config.margin,
        participants,
        events,
    }
}
