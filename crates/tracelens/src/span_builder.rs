use std::collections::BTreeMap;
use tracelens_protocol::conventions::{keys, names};
use tracelens_protocol::*;

/// Builder for span trees, used for seed data, fixtures and examples
#[derive(Clone, Debug)]
pub struct SpanBuilder {
    span: Span,
}

impl SpanBuilder {
    pub fn new(span_id: impl Into<SpanId>, name: impl Into<String>) -> Self {
        Self {
            span: Span {
                span_id: span_id.into(),
                parent_span_id: None,
                name: name.into(),
                kind: SpanKind::Internal,
                status: SpanStatus::Ok,
                start_time: Timestamp(0),
                end_time: None,
                duration_ms: None,
                attributes: BTreeMap::new(),
                events: Vec::new(),
                children: Vec::new(),
            },
        }
    }

    /// An `ai.agent.invoke` span for the named agent
    pub fn agent(span_id: impl Into<SpanId>, agent: &str) -> Self {
        Self::new(span_id, names::AGENT_INVOKE).with_attribute(keys::AGENT_NAME, agent)
    }

    /// An `ai.agent.handoff` span from one agent to another
    pub fn handoff(span_id: impl Into<SpanId>, from: &str, to: &str) -> Self {
        Self::new(span_id, names::AGENT_HANDOFF)
            .with_attribute(keys::HANDOFF_FROM, from)
            .with_attribute(keys::HANDOFF_TO, to)
    }

    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.span.kind = kind;
        self
    }

    pub fn start(mut self, start: Timestamp) -> Self {
        self.span.start_time = start;
        self
    }

    pub fn end(mut self, end: Timestamp) -> Self {
        self.span.end_time = Some(end);
        self
    }

    /// Start and end in milliseconds since epoch
    pub fn timing_ms(self, start: u64, end: u64) -> Self {
        self.start(Timestamp::from_millis(start))
            .end(Timestamp::from_millis(end))
    }

    /// Reported duration without an end time
    pub fn duration_ms(mut self, duration: f64) -> Self {
        self.span.end_time = None;
        self.span.duration_ms = Some(duration);
        self
    }

    /// Add an attribute to the span
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl IntoAttributeValue) -> Self {
        self.span
            .attributes
            .insert(key.into(), value.into_attribute_value());
        self
    }

    /// Add an event to the span
    pub fn with_event(mut self, name: impl Into<String>, timestamp: Timestamp) -> Self {
        self.span.events.push(SpanEvent {
            name: name.into(),
            timestamp,
            attributes: BTreeMap::new(),
        });
        self
    }

    /// Mark the span as errored
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.span.status = SpanStatus::Error {
            message: message.into(),
        };
        self
    }

    /// Append a child span; its parent id is set to this span
    pub fn child(mut self, child: SpanBuilder) -> Self {
        let mut child = child.build();
        child.parent_span_id = Some(self.span.span_id.clone());
        self.span.children.push(child);
        self
    }

    pub fn build(self) -> Span {
        self.span
    }
}

// Helper trait for converting to AttributeValue
pub trait IntoAttributeValue {
    fn into_attribute_value(self) -> AttributeValue;
}

impl IntoAttributeValue for &str {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::String(self.to_string())
    }
}

impl IntoAttributeValue for String {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::String(self)
    }
}

impl IntoAttributeValue for i64 {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Int(self)
    }
}

impl IntoAttributeValue for i32 {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Int(self as i64)
    }
}

impl IntoAttributeValue for bool {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Bool(self)
    }
}

impl IntoAttributeValue for f64 {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Float(self)
    }
}

impl IntoAttributeValue for AttributeValue {
    fn into_attribute_value(self) -> AttributeValue {
        self
    }
}
