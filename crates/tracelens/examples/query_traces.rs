use std::time::Duration;
use tracelens::protocol::TraceFilter;
use tracelens::{HttpTraceSource, LoadOutcome, RetryPolicy, TraceLoader, TracingNotifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base = std::env::var("TRACELENS_API_URL").unwrap_or_else(|_| "http://127.0.0.1:1990/api".to_string());
    println!("🔍 Querying {base} for traces...");

    let source = HttpTraceSource::new(&base, Duration::from_secs(10))?;
    let loader = TraceLoader::new(source, TracingNotifier, RetryPolicy::default());

    let LoadOutcome::Applied(traces) = loader.list(&TraceFilter::default()).await else {
        return Err("failed to list traces".into());
    };

    println!("\n📊 Found {} trace(s):", traces.len());
    for trace in &traces {
        println!("  - Trace ID: {}", trace.trace_id);
        println!("    Root: {}", trace.root_span_name);
        println!("    Spans: {}", trace.span_count);
        println!("    Type: {:?}", trace.trace_type);
        if let Some(duration) = trace.duration_nanos {
            println!("    Duration: {}ms", duration / 1_000_000);
        }
        println!();
    }

    if let Some(first) = traces.first() {
        if let LoadOutcome::Applied(trace) = loader.load(&first.trace_id).await {
            let chain = tracelens::markov::extract(&trace.roots);
            println!("🔗 {} agent(s), {} transition(s) in {}", chain.states.len(), chain.transitions.len(), first.trace_id);
        }
    }

    Ok(())
}
