use std::sync::Arc;
use tracelens::protocol::{Trace, TraceId};
use tracelens::{Config, ParticipantMode, SpanBuilder, TraceViews};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A small multi-agent run: planner -> researcher (x2) -> writer
    let root = SpanBuilder::new("root", "answer_question")
        .timing_ms(0, 4_000)
        .child(
            SpanBuilder::agent("p", "planner")
                .timing_ms(0, 500)
                .child(SpanBuilder::new("p-llm", "ai.llm.completion").timing_ms(20, 480)),
        )
        .child(SpanBuilder::agent("r1", "researcher").timing_ms(600, 1_400))
        .child(SpanBuilder::agent("r2", "researcher").timing_ms(1_500, 2_300))
        .child(SpanBuilder::handoff("h", "researcher", "writer").timing_ms(2_350, 2_360))
        .child(SpanBuilder::agent("w", "writer").timing_ms(2_400, 3_900).error("context window exceeded"))
        .build();

    let trace = Trace::from_spans(TraceId::new("demo"), vec![root]);
    let views = TraceViews::new(Arc::new(trace), Arc::new(Config::default()));

    println!("📋 Spans:");
    for span in views.flat_spans() {
        println!(
            "  {}{} [{}] {}",
            "  ".repeat(span.depth),
            span.name,
            span.display.icon,
            span.display.duration_label
        );
    }

    println!("\n🔗 Agent transitions:");
    for t in &views.markov().transitions {
        println!("  {} -> {}  x{}  ({:.0}%)", t.from, t.to, t.count, t.probability * 100.0);
    }

    let layout = views.agent_graph();
    println!("\n📐 Agent graph {:.0}x{:.0}:", layout.width, layout.height);
    for node in &layout.nodes {
        println!("  {:<12} rank {} at ({:.0}, {:.0})", node.id, node.rank, node.x, node.y);
    }

    let diagram = views.sequence(ParticipantMode::PerSpan);
    println!(
        "\n📊 Sequence diagram: {} lanes, {} events",
        diagram.participants.len(),
        diagram.events.len()
    );

    println!("\n{}", serde_json::to_string_pretty(views.markov())?);
    Ok(())
}
