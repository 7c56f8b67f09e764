//! Span tree flattening and per-span display metadata.

use serde::Serialize;
use tracelens_protocol::*;

/// Color used for any span whose status is an error
pub const ERROR_COLOR: &str = "#d32f2f";

/// A span positioned in the flattened, time-ordered sequence
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlatSpan {
    pub span_id: SpanId,
    /// Parent in the tree (not the declared parent id)
    pub parent_id: Option<SpanId>,
    pub depth: usize,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    pub duration_nanos: Option<u64>,
    pub is_error: bool,
    pub child_count: usize,
    pub display: SpanDisplay,
}

impl FlatSpan {
    pub fn effective_end(&self) -> Timestamp {
        self.end_time.unwrap_or_else(|| {
            self.start_time
                .saturating_add_nanos(self.duration_nanos.unwrap_or(0))
        })
    }
}

/// How a span should be drawn
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpanDisplay {
    pub category: SpanCategory,
    pub icon: &'static str,
    pub color: &'static str,
    pub duration_label: String,
}

impl SpanDisplay {
    pub fn for_span(span: &Span) -> Self {
        let category = span.category();
        Self {
            category,
            icon: category.icon(),
            color: if span.is_error() {
                ERROR_COLOR
            } else {
                category.color()
            },
            duration_label: span
                .duration_nanos()
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Flatten a span forest into a sequence ordered by start time.
///
/// Spans that start at the same instant keep their depth-first order.
pub fn flatten(roots: &[Span]) -> Vec<FlatSpan> {
    let mut flat: Vec<FlatSpan> = depth_first(roots)
        .map(|visit| {
            let span = visit.span;
            FlatSpan {
                span_id: span.span_id.clone(),
                parent_id: visit.parent.map(|p| p.span_id.clone()),
                depth: visit.depth,
                name: span.name.clone(),
                kind: span.kind,
                start_time: span.start_time,
                end_time: span.end_time,
                duration_nanos: span.duration_nanos(),
                is_error: span.is_error(),
                child_count: span.children.len(),
                display: SpanDisplay::for_span(span),
            }
        })
        .collect();

    // sort_by_key is stable
    flat.sort_by_key(|s| s.start_time);
    flat
}

/// Format a duration for labels: `850ns`, `12.4µs`, `3.2ms`, `1.25s`, `2m 5s`
pub fn format_duration(nanos: u64) -> String {
    const MICRO: u64 = 1_000;
    const MILLI: u64 = 1_000_000;
    const SECOND: u64 = 1_000_000_000;
    const MINUTE: u64 = 60 * SECOND;

    if nanos < MICRO {
        format!("{nanos}ns")
    } else if nanos < MILLI {
        format!("{:.1}µs", nanos as f64 / MICRO as f64)
    } else if nanos < SECOND {
        format!("{:.1}ms", nanos as f64 / MILLI as f64)
    } else if nanos < MINUTE {
        format!("{:.2}s", nanos as f64 / SECOND as f64)
    } else {
        format!("{}m {}s", nanos / MINUTE, (nanos % MINUTE) / SECOND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span_builder::SpanBuilder;

    #[test]
    fn flatten_orders_by_start_and_tracks_parents() {
        let root = SpanBuilder::new("root", "request")
            .timing_ms(0, 100)
            .child(
                SpanBuilder::new("late", "late-child")
                    .timing_ms(50, 60)
                    .child(SpanBuilder::new("deep", "deep").timing_ms(55, 58)),
            )
            .child(SpanBuilder::new("early", "early-child").timing_ms(10, 20))
            .build();

        let flat = flatten(std::slice::from_ref(&root));
        let order: Vec<_> = flat.iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(order, ["root", "early", "late", "deep"]);

        let deep = &flat[3];
        assert_eq!(deep.depth, 2);
        assert_eq!(deep.parent_id.as_ref().map(SpanId::as_str), Some("late"));
        assert_eq!(flat[0].child_count, 2);
    }

    #[test]
    fn equal_start_times_keep_traversal_order() {
        let root = SpanBuilder::new("root", "root")
            .timing_ms(0, 10)
            .child(SpanBuilder::new("b", "b").timing_ms(0, 5))
            .child(SpanBuilder::new("a", "a").timing_ms(0, 5))
            .build();

        let flat = flatten(std::slice::from_ref(&root));
        let order: Vec<_> = flat.iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(order, ["root", "b", "a"]);
    }

    #[test]
    fn display_uses_category_and_error_color() {
        let llm = SpanBuilder::new("l", "ai.llm.invoke").timing_ms(0, 1500).build();
        let display = SpanDisplay::for_span(&llm);
        assert_eq!(display.category, SpanCategory::Llm);
        assert_eq!(display.icon, "psychology");
        assert_eq!(display.duration_label, "1.50s");

        let failed = SpanBuilder::new("t", "ai.tool.invoke").error("timeout").build();
        assert_eq!(SpanDisplay::for_span(&failed).color, ERROR_COLOR);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(850), "850ns");
        assert_eq!(format_duration(12_400), "12.4µs");
        assert_eq!(format_duration(3_200_000), "3.2ms");
        assert_eq!(format_duration(1_250_000_000), "1.25s");
        assert_eq!(format_duration(125_000_000_000), "2m 5s");
    }

    #[test]
    fn empty_forest_flattens_to_nothing() {
        assert!(flatten(&[]).is_empty());
    }
}
