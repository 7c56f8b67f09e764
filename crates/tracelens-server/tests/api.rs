use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tracelens::Config;
use tracelens_server::storage::TraceStore;

fn app() -> (Router, Arc<TraceStore>) {
    let store = TraceStore::new(Duration::from_secs(3600), Arc::new(Config::default()));
    (tracelens_server::router(store.clone()), store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// planner -> researcher -> researcher -> writer, with a handoff covering the
/// last hop. Spans are flat and linked by parent id.
fn agent_trace(id: &str) -> Value {
    let agent = |span_id: &str, name: &str, start: u64, end: u64| {
        json!({
            "span_id": span_id,
            "parent_span_id": "root",
            "name": "ai.agent.invoke",
            "start_time": start,
            "end_time": end,
            "attributes": {"ai.agent.name": name}
        })
    };
    json!({
        "trace_id": id,
        "spans": [
            {"span_id": "root", "name": "workflow", "start_time": 1_000, "end_time": 9_000},
            agent("p", "planner", 1_000, 2_000),
            agent("r1", "researcher", 2_000, 4_000),
            agent("r2", "researcher", 4_000, 6_000),
            {
                "span_id": "h",
                "parent_span_id": "root",
                "name": "ai.agent.handoff",
                "start_time": 6_500,
                "end_time": 6_501,
                "attributes": {"ai.agent.handoff.from": "researcher", "ai.agent.handoff.to": "writer"}
            },
            agent("w", "writer", 7_000, 9_000)
        ]
    })
}

fn http_trace(id: &str, name: &str, error: bool) -> Value {
    let mut root = json!({
        "span_id": "root",
        "name": name,
        "start_time": 0,
        "end_time": 5_000_000,
        "attributes": {"http.method": "GET"}
    });
    if error {
        root["status"] = json!({"code": "ERROR", "message": "boom"});
    }
    json!({"trace_id": id, "spans": [root]})
}

#[tokio::test]
async fn ping() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/api/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"pong");
}

#[tokio::test]
async fn post_then_get() {
    let (app, store) = app();

    let (status, summary) = post(&app, "/api/traces", &agent_trace("t1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(summary["trace_id"], "t1");
    assert_eq!(summary["span_count"], 6);
    assert_eq!(summary["trace_type"], "agentic");
    assert_eq!(store.len(), 1);

    let (status, trace) = get(&app, "/api/traces/t1").await;
    assert_eq!(status, StatusCode::OK);
    // Linked into a single root
    assert_eq!(trace["roots"].as_array().unwrap().len(), 1);
    assert_eq!(trace["roots"][0]["children"].as_array().unwrap().len(), 5);

    let (status, spans) = get(&app, "/api/traces/t1/spans").await;
    assert_eq!(status, StatusCode::OK);
    let spans = spans.as_array().unwrap();
    assert_eq!(spans.len(), 6);
    assert_eq!(spans[0]["depth"], 0);
    assert_eq!(spans[1]["depth"], 1);
}

#[tokio::test]
async fn empty_trace_id_is_rejected() {
    let (app, store) = app();
    let (status, body) = post(&app, "/api/traces", &http_trace("  ", "GET /", false)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("trace_id"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn missing_trace_is_json_404() {
    let (app, _) = app();
    for uri in [
        "/api/traces/nope",
        "/api/traces/nope/markov",
        "/api/traces/nope/graph",
        "/api/traces/nope/sequence",
        "/api/traces/nope/playback",
    ] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"], "trace nope not found");
    }
}

#[tokio::test]
async fn markov_view() {
    let (app, _) = app();
    post(&app, "/api/traces", &agent_trace("t1")).await;

    let (status, chain) = get(&app, "/api/traces/t1/markov").await;
    assert_eq!(status, StatusCode::OK);

    let states: Vec<&str> = chain["states"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(states, ["planner", "researcher", "writer"]);

    let transitions = chain["transitions"].as_array().unwrap();
    assert_eq!(transitions.len(), 3);
    let self_loop = transitions
        .iter()
        .find(|t| t["from"] == "researcher" && t["to"] == "researcher")
        .unwrap();
    assert_eq!(self_loop["count"], 1);
    assert_eq!(self_loop["probability"], 0.5);
}

#[tokio::test]
async fn agent_graph_has_self_loop() {
    let (app, _) = app();
    post(&app, "/api/traces", &agent_trace("t1")).await;

    let (status, layout) = get(&app, "/api/traces/t1/graph?view=agents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(layout["orientation"], "left_right");
    assert_eq!(layout["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(layout["edges"].as_array().unwrap().len(), 2);
    assert_eq!(layout["self_loops"].as_array().unwrap().len(), 1);
    assert_eq!(layout["self_loops"][0]["node"], "researcher");

    let (status, calls) = get(&app, "/api/traces/t1/graph").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(calls["orientation"], "top_bottom");
    assert_eq!(calls["nodes"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn sequence_by_name() {
    let (app, _) = app();
    post(&app, "/api/traces", &agent_trace("t1")).await;

    let (status, per_span) = get(&app, "/api/traces/t1/sequence").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(per_span["participants"].as_array().unwrap().len(), 6);

    let (status, by_name) = get(&app, "/api/traces/t1/sequence?participants=name").await;
    assert_eq!(status, StatusCode::OK);
    // workflow, ai.agent.invoke, ai.agent.handoff
    assert_eq!(by_name["participants"].as_array().unwrap().len(), 3);
    // One call per span, one return per non-root span
    assert_eq!(by_name["events"].as_array().unwrap().len(), 11);
}

#[tokio::test]
async fn playback_at() {
    let (app, _) = app();
    post(&app, "/api/traces", &agent_trace("t1")).await;

    let (status, frame) = get(&app, "/api/traces/t1/playback?at=3000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(frame["at"], 3_000);
    assert_eq!(frame["chain"]["transitions"].as_array().unwrap().len(), 1);
    assert_eq!(frame["active_agents"], json!(["researcher"]));

    // Defaults to the end of the trace, which matches the static chain
    let (_, end) = get(&app, "/api/traces/t1/playback").await;
    assert_eq!(end["at"], 9_000);
    let (_, chain) = get(&app, "/api/traces/t1/markov").await;
    assert_eq!(end["chain"]["transitions"], chain["transitions"]);

    // Clamped into the trace range
    let (_, late) = get(&app, "/api/traces/t1/playback?at=99999999").await;
    assert_eq!(late["at"], 9_000);
}

#[tokio::test]
async fn list_filtering() {
    let (app, _) = app();
    post(&app, "/api/traces", &http_trace("ok", "GET /users", false)).await;
    post(&app, "/api/traces", &http_trace("bad", "POST /orders", true)).await;
    post(&app, "/api/traces", &agent_trace("agents")).await;

    let (status, all) = get(&app, "/api/traces").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, errors) = get(&app, "/api/traces?has_errors=true").await;
    let errors = errors.as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["trace_id"], "bad");

    let (_, agentic) = get(&app, "/api/traces?trace_type=agentic").await;
    assert_eq!(agentic.as_array().unwrap().len(), 1);
    assert_eq!(agentic[0]["trace_id"], "agents");

    let (_, named) = get(&app, "/api/traces?name=users").await;
    assert_eq!(named.as_array().unwrap().len(), 1);
    assert_eq!(named[0]["trace_id"], "ok");

    let (_, limited) = get(&app, "/api/traces?limit=2").await;
    assert_eq!(limited.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn seed_data_is_served() {
    let (app, store) = app();
    let count = tracelens_server::seed_data::load_seed_data(&store);
    assert_eq!(store.len(), count);

    let (_, all) = get(&app, "/api/traces").await;
    assert_eq!(all.as_array().unwrap().len(), count);
}
