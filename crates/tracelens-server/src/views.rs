//! View selection shared by the HTTP API and the CLI.

use clap::ValueEnum;
use serde::Deserialize;
use tracelens::protocol::{Trace, TraceId};
use tracelens::{ParticipantMode, TraceViews};

/// Which layout `/graph` returns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GraphView {
    /// Span call tree, top to bottom
    #[default]
    Calls,
    /// Agent Markov chain, left to right
    Agents,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ViewKind {
    Trace,
    #[default]
    Spans,
    Markov,
    Calls,
    Agents,
    Sequence,
    Playback,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Participants {
    #[default]
    Span,
    Name,
}

impl From<Participants> for ParticipantMode {
    fn from(p: Participants) -> Self {
        match p {
            Participants::Span => ParticipantMode::PerSpan,
            Participants::Name => ParticipantMode::ByName,
        }
    }
}

/// Pretty JSON for one derived view. `Playback` renders the final frame.
pub fn render(views: &TraceViews, kind: ViewKind, participants: Participants) -> serde_json::Result<String> {
    match kind {
        ViewKind::Trace => serde_json::to_string_pretty(views.trace().as_ref()),
        ViewKind::Spans => serde_json::to_string_pretty(views.flat_spans()),
        ViewKind::Markov => serde_json::to_string_pretty(views.markov()),
        ViewKind::Calls => serde_json::to_string_pretty(views.call_graph()),
        ViewKind::Agents => serde_json::to_string_pretty(views.agent_graph()),
        ViewKind::Sequence => serde_json::to_string_pretty(views.sequence(participants.into())),
        ViewKind::Playback => {
            let at = views.markov().time_range.map(|r| r.end).unwrap_or_default();
            serde_json::to_string_pretty(&views.playback_frame(at))
        }
    }
}

/// Parse a trace document: either a `Trace` object or a bare span array,
/// which gets `fallback_id`. Flat spans are linked by parent id.
pub fn parse_trace(json: &str, fallback_id: &str) -> serde_json::Result<Trace> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let trace: Trace = if value.is_array() {
        Trace {
            trace_id: TraceId::new(fallback_id),
            roots: serde_json::from_value(value)?,
        }
    } else {
        serde_json::from_value(value)?
    };
    Ok(Trace::from_spans(trace.trace_id, trace.roots))
}
