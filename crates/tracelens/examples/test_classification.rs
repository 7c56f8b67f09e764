use tracelens::protocol::{Trace, TraceId};
use tracelens::SpanBuilder;

fn main() {
    println!("🧪 Testing trace classification...");

    // 1. Generic trace (no special names)
    let generic = SpanBuilder::new("g1", "data_processing")
        .timing_ms(0, 50)
        .with_attribute("operation", "etl")
        .child(SpanBuilder::new("g2", "SELECT users").with_attribute("db.system", "postgresql").timing_ms(5, 20));

    // 2. LLM trace
    let llm = SpanBuilder::new("l1", "chat_request")
        .timing_ms(0, 900)
        .child(SpanBuilder::new("l2", "ai.llm.completion").with_attribute("gen_ai.request.model", "gpt-4o").timing_ms(10, 880));

    // 3. Agentic trace
    let agentic = SpanBuilder::new("a1", "workflow")
        .timing_ms(0, 3_000)
        .child(SpanBuilder::agent("a2", "planner").timing_ms(0, 800))
        .child(SpanBuilder::handoff("a3", "planner", "coder").timing_ms(800, 801))
        .child(SpanBuilder::agent("a4", "coder").timing_ms(810, 2_900));

    for (i, root) in [generic, llm, agentic].into_iter().enumerate() {
        let trace = Trace::from_spans(TraceId::new(format!("trace-{i}")), vec![root.build()]);
        let summary = trace.summary();
        println!(
            "  {} {:<16} {:>2} spans  -> {:?}",
            i + 1,
            summary.root_span_name,
            summary.span_count,
            summary.trace_type
        );
    }

    println!("✅ Classified 3 traces");
}
