use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::conventions::{self, keys, names, SpanCategory};
use crate::events::TimeRange;
use crate::ids::{SpanId, TraceId};

/// Timestamp in nanoseconds since UNIX epoch
///
/// Accepts integer nanoseconds or RFC 3339 strings on the wire; always
/// serializes as integer nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self(nanos)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Nanoseconds elapsed from `earlier` to `self`, zero if `earlier` is later
    pub fn saturating_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn saturating_add_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Parse an RFC 3339 timestamp. Timestamps without an offset are read as UTC.
    pub fn parse_rfc3339(s: &str) -> Result<Self, TimestampError> {
        let parsed = OffsetDateTime::parse(s, &Rfc3339).or_else(|err| {
            let naive = s
                .split_once('T')
                .map(|(_, time)| !time.ends_with('Z') && !time.contains('+') && !time.contains('-'))
                .unwrap_or(false);
            if naive {
                OffsetDateTime::parse(&format!("{s}Z"), &Rfc3339)
            } else {
                Err(err)
            }
        });

        let parsed = parsed.map_err(|_| TimestampError::Invalid(s.to_string()))?;
        let nanos = parsed.unix_timestamp_nanos();
        u64::try_from(nanos)
            .map(Self)
            .map_err(|_| TimestampError::BeforeEpoch(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimestampError {
    #[error("invalid RFC 3339 timestamp: {0}")]
    Invalid(String),
    #[error("timestamp before UNIX epoch: {0}")]
    BeforeEpoch(String),
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("nanoseconds since epoch or an RFC 3339 string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
                Ok(Timestamp(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
                u64::try_from(v)
                    .map(Timestamp)
                    .map_err(|_| E::custom("timestamp before UNIX epoch"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timestamp, E> {
                if v.is_finite() && v >= 0.0 {
                    Ok(Timestamp(v as u64))
                } else {
                    Err(E::custom("timestamp must be a non-negative number"))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
                if let Ok(nanos) = v.parse::<u64>() {
                    return Ok(Timestamp(nanos));
                }
                Timestamp::parse_rfc3339(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// Attribute value
///
/// Kept untagged so backend JSON maps onto it directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<AttributeValue>),
    Json(serde_json::Value),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable rendering for detail panels.
    ///
    /// Strings holding JSON documents are pretty-printed; anything that fails
    /// to parse is shown verbatim.
    pub fn display_value(&self) -> String {
        match self {
            Self::String(s) => {
                let trimmed = s.trim_start();
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    serde_json::from_str::<serde_json::Value>(s)
                        .ok()
                        .and_then(|v| serde_json::to_string_pretty(&v).ok())
                        .unwrap_or_else(|| s.clone())
                } else {
                    s.clone()
                }
            }
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Event within a span
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Span completion status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "UPPERCASE")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error {
        #[serde(default)]
        message: String,
    },
}

impl SpanStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// OpenTelemetry span kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanKind {
    #[default]
    #[serde(alias = "SPAN_KIND_INTERNAL", alias = "internal")]
    Internal,
    #[serde(alias = "SPAN_KIND_SERVER", alias = "server")]
    Server,
    #[serde(alias = "SPAN_KIND_CLIENT", alias = "client")]
    Client,
    #[serde(alias = "SPAN_KIND_PRODUCER", alias = "producer")]
    Producer,
    #[serde(alias = "SPAN_KIND_CONSUMER", alias = "consumer")]
    Consumer,
}

/// Span represents a single operation in a trace. Children are owned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub span_id: SpanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    #[serde(default)]
    pub kind: SpanKind,
    #[serde(default)]
    pub status: SpanStatus,
    pub start_time: Timestamp,
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
    #[serde(default)]
    pub children: Vec<Span>,
}

impl Span {
    /// Span duration in nanoseconds, from the end time or the reported duration
    pub fn duration_nanos(&self) -> Option<u64> {
        match self.end_time {
            Some(end) => Some(end.saturating_since(self.start_time)),
            None => self
                .duration_ms
                .filter(|ms| ms.is_finite() && *ms >= 0.0)
                .map(|ms| (ms * 1_000_000.0) as u64),
        }
    }

    /// End of the span, falling back to start + duration, then to start
    pub fn effective_end(&self) -> Timestamp {
        self.end_time.unwrap_or_else(|| {
            self.start_time
                .saturating_add_nanos(self.duration_nanos().unwrap_or(0))
        })
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// Non-empty string attribute
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(AttributeValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Agent name, if this span names one
    pub fn agent_name(&self) -> Option<&str> {
        self.attribute_str(keys::AGENT_NAME)
            .or_else(|| self.attribute_str(keys::GEN_AI_AGENT_NAME))
    }

    /// Whether this span marks an agent invocation (regardless of attributes)
    pub fn is_agent_invocation(&self) -> bool {
        self.name == names::AGENT_INVOKE
            || self.attribute_str(keys::GEN_AI_OPERATION_NAME)
                == Some(conventions::INVOKE_AGENT_OPERATION)
    }

    /// Agent name of a well-formed agent invocation
    pub fn invoked_agent(&self) -> Option<&str> {
        if self.is_agent_invocation() {
            self.agent_name()
        } else {
            None
        }
    }

    /// `(from, to)` of a well-formed handoff span
    pub fn handoff(&self) -> Option<(&str, &str)> {
        if self.name != names::AGENT_HANDOFF {
            return None;
        }
        let from = self.attribute_str(keys::HANDOFF_FROM)?;
        let to = self.attribute_str(keys::HANDOFF_TO)?;
        Some((from, to))
    }

    /// Display category based on naming conventions
    pub fn category(&self) -> SpanCategory {
        if self.name == names::AGENT_HANDOFF {
            SpanCategory::Handoff
        } else if self.is_agent_invocation() {
            SpanCategory::Agent
        } else if self.name.starts_with(names::LLM_PREFIX) {
            SpanCategory::Llm
        } else if self.name.starts_with(names::TOOL_PREFIX) {
            SpanCategory::Tool
        } else if self.name.starts_with(names::RETRIEVAL_PREFIX) {
            SpanCategory::Retrieval
        } else if self.name.starts_with(names::EMBEDDING_PREFIX) {
            SpanCategory::Embedding
        } else if self.attributes.contains_key(keys::DB_SYSTEM) {
            SpanCategory::Database
        } else if self.attributes.contains_key(keys::HTTP_METHOD)
            || self.attributes.contains_key(keys::HTTP_REQUEST_METHOD)
        {
            SpanCategory::Http
        } else {
            SpanCategory::Generic
        }
    }

    /// This span and all of its descendants
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Span::subtree_len).sum::<usize>()
    }
}

/// One step of a depth-first walk
#[derive(Clone, Copy, Debug)]
pub struct SpanVisit<'a> {
    pub span: &'a Span,
    pub depth: usize,
    pub parent: Option<&'a Span>,
}

/// Pre-order, depth-first iterator over a span forest. Siblings are
/// visited in their stored order.
pub struct DepthFirst<'a> {
    stack: Vec<SpanVisit<'a>>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = SpanVisit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let visit = self.stack.pop()?;
        for child in visit.span.children.iter().rev() {
            self.stack.push(SpanVisit {
                span: child,
                depth: visit.depth + 1,
                parent: Some(visit.span),
            });
        }
        Some(visit)
    }
}

pub fn depth_first(roots: &[Span]) -> DepthFirst<'_> {
    let stack = roots
        .iter()
        .rev()
        .map(|span| SpanVisit {
            span,
            depth: 0,
            parent: None,
        })
        .collect();
    DepthFirst { stack }
}

/// Earliest start to latest end over a span forest
pub fn time_range(roots: &[Span]) -> Option<TimeRange> {
    depth_first(roots).fold(None, |range, visit| {
        let start = visit.span.start_time;
        let end = visit.span.effective_end().max(start);
        Some(match range {
            None => TimeRange::new(start, end),
            Some(r) => TimeRange::new(r.start.min(start), r.end.max(end)),
        })
    })
}

/// Complete trace (forest of root spans)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: TraceId,
    #[serde(default, alias = "spans")]
    pub roots: Vec<Span>,
}

impl Trace {
    /// Build a trace tree from a flat list of spans linked by parent ids.
    ///
    /// Spans whose parent is unknown become roots.
    pub fn from_spans(trace_id: TraceId, spans: Vec<Span>) -> Self {
        let index: HashMap<SpanId, usize> = spans
            .iter()
            .enumerate()
            .map(|(i, s)| (s.span_id.clone(), i))
            .collect();

        let mut children_map: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut root_indices = Vec::new();
        for (i, span) in spans.iter().enumerate() {
            match span.parent_span_id.as_ref().and_then(|p| index.get(p)) {
                Some(&parent) if parent != i => children_map.entry(parent).or_default().push(i),
                _ => root_indices.push(i),
            }
        }

        for child_ids in children_map.values_mut() {
            child_ids.sort_by_key(|&i| spans[i].start_time);
        }

        fn attach(
            i: usize,
            slots: &mut Vec<Option<Span>>,
            children_map: &HashMap<usize, Vec<usize>>,
        ) -> Option<Span> {
            let mut span = slots[i].take()?;
            if let Some(child_ids) = children_map.get(&i) {
                for &child in child_ids {
                    if let Some(child) = attach(child, slots, children_map) {
                        span.children.push(child);
                    }
                }
            }
            Some(span)
        }

        let mut slots: Vec<Option<Span>> = spans.into_iter().map(Some).collect();
        let mut roots: Vec<Span> = root_indices
            .into_iter()
            .filter_map(|i| attach(i, &mut slots, &children_map))
            .collect();

        // Spans whose parent chain loops back on itself are never reached
        // from a root.
        for i in 0..slots.len() {
            if let Some(span) = attach(i, &mut slots, &children_map) {
                roots.push(span);
            }
        }

        roots.sort_by_key(|s| s.start_time);

        Self { trace_id, roots }
    }

    pub fn spans(&self) -> DepthFirst<'_> {
        depth_first(&self.roots)
    }

    pub fn span_count(&self) -> usize {
        self.roots.iter().map(Span::subtree_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Earliest start to latest end over every span
    pub fn time_range(&self) -> Option<TimeRange> {
        time_range(&self.roots)
    }

    pub fn has_errors(&self) -> bool {
        self.spans().any(|v| v.span.is_error())
    }

    pub fn find_span(&self, span_id: &SpanId) -> Option<&Span> {
        self.spans()
            .map(|v| v.span)
            .find(|s| &s.span_id == span_id)
    }

    /// Classify trace type based on span names and attributes
    pub fn classify_type(&self) -> TraceType {
        let mut has_llm = false;
        for visit in self.spans() {
            match visit.span.category() {
                SpanCategory::Agent | SpanCategory::Handoff => return TraceType::Agentic,
                SpanCategory::Llm | SpanCategory::Embedding => has_llm = true,
                _ => {}
            }
        }
        if has_llm {
            TraceType::Llm
        } else {
            TraceType::Generic
        }
    }

    pub fn summary(&self) -> TraceSummary {
        let range = self.time_range();
        TraceSummary {
            trace_id: self.trace_id.clone(),
            root_span_name: self
                .roots
                .first()
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            start_time: range.map(|r| r.start).unwrap_or_default(),
            duration_nanos: range.map(|r| r.duration_nanos()),
            span_count: self.span_count(),
            has_errors: self.has_errors(),
            trace_type: self.classify_type(),
        }
    }
}

/// Type of trace based on span conventions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceType {
    /// No LLM or agent spans
    #[default]
    Generic,
    /// LLM calls without agent orchestration
    Llm,
    /// Contains agent invocations or handoffs
    Agentic,
}

/// Summary of a trace (for listing)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: TraceId,
    pub root_span_name: String,
    pub start_time: Timestamp,
    pub duration_nanos: Option<u64>,
    pub span_count: usize,
    pub has_errors: bool,
    pub trace_type: TraceType,
}

/// Filter for querying traces
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceFilter {
    /// Case-insensitive substring of the root span name
    pub name: Option<String>,
    pub min_duration_nanos: Option<u64>,
    pub max_duration_nanos: Option<u64>,
    pub has_errors: Option<bool>,
    pub trace_type: Option<TraceType>,
    pub limit: Option<usize>,
}

impl TraceFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn matches(&self, summary: &TraceSummary) -> bool {
        if let Some(name) = &self.name {
            if !summary
                .root_span_name
                .to_lowercase()
                .contains(&name.to_lowercase())
            {
                return false;
            }
        }

        if let Some(min_dur) = self.min_duration_nanos {
            if summary.duration_nanos.map_or(true, |d| d < min_dur) {
                return false;
            }
        }

        if let Some(max_dur) = self.max_duration_nanos {
            if summary.duration_nanos.is_some_and(|d| d > max_dur) {
                return false;
            }
        }

        if self.has_errors.is_some_and(|e| e != summary.has_errors) {
            return false;
        }

        if self.trace_type.is_some_and(|t| t != summary.trace_type) {
            return false;
        }

        true
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}
