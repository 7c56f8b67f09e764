//! Seed data for UI development
//!
//! Generates realistic traces (plain HTTP, LLM calls, multi-agent runs) so the
//! views can be exercised without a telemetry backend.

use tracelens::protocol::*;
use tracelens::SpanBuilder;

use crate::storage::TraceStore;

/// Load seed traces into the store; returns how many were stored
pub fn load_seed_data(store: &TraceStore) -> usize {
    let traces = generate_seed_traces(Timestamp::now());
    let count = traces.len();
    for trace in traces {
        store.insert(trace);
    }
    count
}

/// Timestamp `ms` milliseconds after `base`
fn at(base: Timestamp, ms: u64) -> Timestamp {
    base.saturating_add_nanos(ms * 1_000_000)
}

/// Builder with start/end relative to `base`
fn span(base: Timestamp, id: &str, name: &str, start_ms: u64, end_ms: u64) -> SpanBuilder {
    SpanBuilder::new(id, name).start(at(base, start_ms)).end(at(base, end_ms))
}

fn agent(base: Timestamp, id: &str, agent: &str, start_ms: u64, end_ms: u64) -> SpanBuilder {
    SpanBuilder::agent(id, agent)
        .start(at(base, start_ms))
        .end(at(base, end_ms))
}

fn handoff(base: Timestamp, id: &str, from: &str, to: &str, at_ms: u64) -> SpanBuilder {
    SpanBuilder::handoff(id, from, to)
        .start(at(base, at_ms))
        .end(at(base, at_ms + 1))
}

fn llm(base: Timestamp, id: &str, model: &str, start_ms: u64, end_ms: u64, tokens: i64) -> SpanBuilder {
    span(base, id, "ai.llm.completion", start_ms, end_ms)
        .kind(SpanKind::Client)
        .with_attribute("gen_ai.request.model", model)
        .with_attribute("gen_ai.usage.total_tokens", tokens)
}

fn trace(id: &str, root: SpanBuilder) -> Trace {
    Trace::from_spans(TraceId::new(id), vec![root.build()])
}

/// Generate a variety of realistic traces, the newest ending around `now`
pub fn generate_seed_traces(now: Timestamp) -> Vec<Trace> {
    let mut traces = Vec::new();

    // 1. Fast successful HTTP request (2 spans)
    {
        let base = Timestamp(now.0.saturating_sub(50_000_000));
        let root = span(base, "1234567890abcdef", "GET /api/users", 0, 12)
            .kind(SpanKind::Server)
            .with_attribute("http.method", "GET")
            .with_attribute("http.url", "/api/users")
            .with_attribute("http.status_code", 200)
            .child(
                span(base, "abcdef1234567890", "db.query users", 2, 10)
                    .kind(SpanKind::Client)
                    .with_attribute("db.system", "postgresql")
                    .with_attribute("db.statement", "SELECT * FROM users LIMIT 10"),
            );
        traces.push(trace("a1b2c3d4e5f6789012345678901234ab", root));
    }

    // 2. Slow request waiting on a row lock
    {
        let base = Timestamp(now.0.saturating_sub(2_500_000_000));
        let root = span(base, "fedcba9876543210", "POST /api/orders", 0, 2_345)
            .kind(SpanKind::Server)
            .with_attribute("http.method", "POST")
            .with_attribute("http.url", "/api/orders")
            .with_attribute("http.status_code", 200)
            .child(
                span(base, "1111222233334444", "db.transaction", 50, 2_340)
                    .with_attribute("db.system", "postgresql")
                    .with_attribute("db.operation", "INSERT")
                    .with_event("Waiting for lock", at(base, 100)),
            );
        traces.push(trace("deadbeef12345678901234567890abcd", root));
    }

    // 3. Failed payment
    {
        let base = Timestamp(now.0.saturating_sub(10_000_000_000));
        let root = span(base, "e404000000000001", "POST /api/checkout", 0, 820)
            .kind(SpanKind::Server)
            .with_attribute("http.method", "POST")
            .with_attribute("http.status_code", 502)
            .error("payment provider unavailable")
            .child(
                span(base, "e404000000000002", "HTTP POST payments.example.com/charge", 15, 810)
                    .kind(SpanKind::Client)
                    .with_attribute("http.request.method", "POST")
                    .with_attribute("http.status_code", 503)
                    .error("upstream returned 503"),
            );
        traces.push(trace("e440e404e440e404e440e404e440e404", root));
    }

    // 4. Single LLM chat completion
    {
        let base = Timestamp(now.0.saturating_sub(30_000_000_000));
        let root = span(base, "c4a7000000000001", "chat_request", 0, 1_430)
            .kind(SpanKind::Server)
            .child(
                llm(base, "c4a7000000000002", "gpt-4o", 20, 1_410, 1_832)
                    .with_attribute("gen_ai.prompt", r#"{"role":"user","content":"Summarize the release notes"}"#),
            );
        traces.push(trace("c4a7c4a7c4a7c4a7c4a7c4a7c4a7c4a7", root));
    }

    // 5. RAG pipeline: embedding, retrieval, generation
    {
        let base = Timestamp(now.0.saturating_sub(60_000_000_000));
        let root = span(base, "4a90000000000001", "answer_question", 0, 2_100)
            .child(
                span(base, "4a90000000000002", "ai.embedding.create", 5, 90)
                    .with_attribute("gen_ai.request.model", "text-embedding-3-small"),
            )
            .child(
                span(base, "4a90000000000003", "ai.retrieval.search", 95, 240)
                    .with_attribute("retrieval.top_k", 8)
                    .with_attribute("retrieval.index", "docs-v3"),
            )
            .child(llm(base, "4a90000000000004", "claude-sonnet", 250, 2_080, 3_410));
        traces.push(trace("4a9f4a9f4a9f4a9f4a9f4a9f4a9f4a9f", root));
    }

    // 6. Multi-agent research run with a repeated agent and an explicit handoff
    {
        let base = Timestamp(now.0.saturating_sub(120_000_000_000));
        let root = span(base, "a9e0000000000001", "research_workflow", 0, 14_200)
            .child(
                agent(base, "a9e0000000000002", "planner", 0, 1_900)
                    .child(llm(base, "a9e0000000000003", "gpt-4o", 40, 1_850, 950)),
            )
            .child(
                agent(base, "a9e0000000000004", "researcher", 2_000, 5_200)
                    .child(
                        span(base, "a9e0000000000005", "ai.tool.web_search", 2_100, 3_900)
                            .with_attribute("tool.name", "web_search")
                            .with_attribute("tool.query", "sugiyama layout crossing reduction"),
                    )
                    .child(llm(base, "a9e0000000000006", "gpt-4o-mini", 3_950, 5_100, 2_210)),
            )
            .child(
                agent(base, "a9e0000000000007", "researcher", 5_300, 8_400)
                    .child(
                        span(base, "a9e0000000000008", "ai.tool.fetch_page", 5_350, 6_900)
                            .with_attribute("tool.name", "fetch_page"),
                    )
                    .child(llm(base, "a9e0000000000009", "gpt-4o-mini", 6_950, 8_300, 4_120)),
            )
            .child(handoff(base, "a9e000000000000a", "researcher", "writer", 8_450))
            .child(
                agent(base, "a9e000000000000b", "writer", 8_500, 13_900)
                    .child(llm(base, "a9e000000000000c", "gpt-4o", 8_600, 13_800, 6_480)),
            );
        traces.push(trace("a9e0a9e0a9e0a9e0a9e0a9e0a9e0a9e0", root));
    }

    // 7. Support triage that fails and escalates to an agent that never runs
    {
        let base = Timestamp(now.0.saturating_sub(300_000_000_000));
        let root = span(base, "5e70000000000001", "support_ticket", 0, 6_300)
            .child(agent(base, "5e70000000000002", "triage", 0, 800))
            .child(
                agent(base, "5e70000000000003", "billing", 900, 3_100)
                    .child(
                        span(base, "5e70000000000004", "ai.tool.lookup_invoice", 950, 2_900)
                            .with_attribute("tool.name", "lookup_invoice")
                            .error("invoice service timeout"),
                    )
                    .error("tool call failed"),
            )
            .child(agent(base, "5e70000000000005", "triage", 3_200, 3_900))
            .child(handoff(base, "5e70000000000006", "triage", "triage", 3_950))
            .child(agent(base, "5e70000000000007", "triage", 4_000, 6_000))
            .child(handoff(base, "5e70000000000008", "triage", "human_escalation", 6_100));
        traces.push(trace("5e705e705e705e705e705e705e705e70", root));
    }

    traces
}
