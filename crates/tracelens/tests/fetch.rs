use std::sync::Arc;
use std::time::Duration;
use tracelens::notify::CollectingNotifier;
use tracelens::protocol::*;
use tracelens::{
    Config, FetchError, HttpTraceSource, LoadOutcome, Notification, Notifier, RetryPolicy, SpanBuilder, TraceLoader,
    TraceSource,
};
use tracelens_server::storage::TraceStore;

/// Start a server on an ephemeral port; returns its API base URL
async fn start_server() -> (String, Arc<TraceStore>) {
    let store = TraceStore::new(Duration::from_secs(3600), Arc::new(Config::default()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tracelens_server::serve(listener, store.clone()));
    (format!("http://{addr}/api/"), store)
}

/// Serve `body` for every `/traces/:id` request; returns the base URL
async fn start_stub(body: serde_json::Value) -> String {
    let app = axum::Router::new().route(
        "/traces/:id",
        axum::routing::get(move || {
            let body = body.clone();
            async move { axum::Json(body) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}

fn flat_span(id: &str, parent: Option<&str>, start: u64) -> serde_json::Value {
    serde_json::json!({
        "span_id": id,
        "parent_span_id": parent,
        "name": "ai.agent.invoke",
        "start_time": start,
        "end_time": start + 1_000,
        "attributes": {"ai.agent.name": id}
    })
}

fn agent_trace(id: &str) -> Trace {
    let root = SpanBuilder::new("root", "workflow")
        .timing_ms(1_000, 5_000)
        .child(SpanBuilder::agent("a", "planner").timing_ms(1_000, 2_000))
        .child(SpanBuilder::agent("b", "coder").timing_ms(2_000, 3_000))
        .child(SpanBuilder::agent("c", "coder").timing_ms(3_000, 5_000));
    Trace::from_spans(TraceId::new(id), vec![root.build()])
}

fn fast_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff_ms: 5,
        max_backoff_ms: 20,
        multiplier: 2.0,
    }
}

#[tokio::test]
async fn fetch_round_trip_through_server() {
    let (base, store) = start_server().await;
    store.insert(agent_trace("t1"));

    let source = HttpTraceSource::new(base, Duration::from_secs(5)).unwrap();
    let trace = source.fetch_trace(&TraceId::new("t1")).await.unwrap();
    assert_eq!(trace.trace_id.as_str(), "t1");
    assert_eq!(trace.span_count(), 4);

    let chain = tracelens::markov::extract(&trace.roots);
    assert_eq!(chain.probability("planner", "coder"), 1.0);
    assert_eq!(chain.transition("coder", "coder").unwrap().count, 1);
}

#[tokio::test]
async fn flat_backend_spans_are_linked() {
    let base = start_stub(serde_json::json!({
        "trace_id": "flat",
        "spans": [flat_span("root", None, 0), flat_span("child", Some("root"), 1_000)]
    }))
    .await;

    let source = HttpTraceSource::new(base, Duration::from_secs(5)).unwrap();
    let trace = source.fetch_trace(&TraceId::new("flat")).await.unwrap();
    assert_eq!(trace.roots.len(), 1);
    assert_eq!(trace.roots[0].children.len(), 1);
    assert_eq!(trace.span_count(), 2);

    let flat = tracelens::normalize::flatten(&trace.roots);
    assert_eq!(flat[1].depth, 1);
}

#[tokio::test]
async fn bare_span_array_takes_requested_id() {
    let base = start_stub(serde_json::json!([
        flat_span("child", Some("root"), 1_000),
        flat_span("root", None, 0)
    ]))
    .await;

    let source = HttpTraceSource::new(base, Duration::from_secs(5)).unwrap();
    let trace = source.fetch_trace(&TraceId::new("bare")).await.unwrap();
    assert_eq!(trace.trace_id.as_str(), "bare");
    assert_eq!(trace.roots.len(), 1);
    assert_eq!(trace.roots[0].span_id.as_str(), "root");
}

#[tokio::test]
async fn loader_applies_and_publishes() {
    let (base, store) = start_server().await;
    store.insert(agent_trace("t1"));

    let source = HttpTraceSource::new(base, Duration::from_secs(5)).unwrap();
    let loader = TraceLoader::new(source, CollectingNotifier::default(), fast_retries(2));
    let mut updates = loader.subscribe();

    let trace = loader.load(&TraceId::new("t1")).await.applied().unwrap();
    assert_eq!(trace.trace_id.as_str(), "t1");

    assert!(updates.has_changed().unwrap());
    let published = updates.borrow_and_update().clone().unwrap();
    assert!(Arc::ptr_eq(&published, &trace));
}

#[tokio::test]
async fn missing_trace_fails_without_retry() {
    let (base, _) = start_server().await;
    let notifier = Arc::new(CollectingNotifier::default());

    let source = HttpTraceSource::new(base, Duration::from_secs(5)).unwrap();
    let loader = TraceLoader::new(source, SharedNotifier(notifier.clone()), fast_retries(4));

    match loader.load(&TraceId::new("missing")).await {
        LoadOutcome::Failed(err) => {
            assert!(err.is_not_found());
            assert!(!err.is_transient());
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(loader.current().is_none());

    let seen = notifier.take();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].message, "Trace missing not found");
    assert!(!seen[0].retryable);
}

#[tokio::test]
async fn unreachable_backend_is_retried_then_reported() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let notifier = Arc::new(CollectingNotifier::default());
    let source = HttpTraceSource::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let loader = TraceLoader::new(source, SharedNotifier(notifier.clone()), fast_retries(3));

    match loader.load(&TraceId::new("t1")).await {
        LoadOutcome::Failed(FetchError::Transport(_)) => {}
        other => panic!("expected transport failure, got {other:?}"),
    }

    let seen = notifier.take();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].retryable);
}

#[tokio::test]
async fn list_passes_filter_as_query() {
    let (base, store) = start_server().await;
    store.insert(agent_trace("agents"));
    store.insert(Trace::from_spans(
        TraceId::new("plain"),
        vec![SpanBuilder::new("root", "GET /health")
            .with_attribute("http.method", "GET")
            .timing_ms(0, 1)
            .build()],
    ));

    let source = HttpTraceSource::new(base, Duration::from_secs(5)).unwrap();
    let loader = TraceLoader::new(source, CollectingNotifier::default(), RetryPolicy::none());

    let all = loader.list(&TraceFilter::default()).await.applied().unwrap();
    assert_eq!(all.len(), 2);

    let filter = TraceFilter {
        trace_type: Some(TraceType::Agentic),
        ..TraceFilter::default()
    };
    let agentic = loader.list(&filter).await.applied().unwrap();
    assert_eq!(agentic.len(), 1);
    assert_eq!(agentic[0].trace_id.as_str(), "agents");
}

/// Lets the test keep a handle on the notifier the loader owns
struct SharedNotifier(Arc<CollectingNotifier>);

impl Notifier for SharedNotifier {
    fn notify(&self, notification: Notification) {
        self.0.notify(notification);
    }
}
