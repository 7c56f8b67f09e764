pub mod api;
pub mod seed_data;
pub mod storage;
pub mod views;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracelens::Config;

use crate::storage::TraceStore;

pub use crate::api::ApiError;

/// The full HTTP surface, with the JSON API nested under `/api`
pub fn router(store: Arc<TraceStore>) -> Router {
    Router::new()
        .route("/", get(|| async { "tracelens: see /api/traces" }))
        .nest("/api", api::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(store)
}

/// Serve on an already bound listener until the listener fails
pub async fn serve(listener: tokio::net::TcpListener, store: Arc<TraceStore>) -> std::io::Result<()> {
    axum::serve(listener, router(store)).await
}

pub async fn run_server(
    host: impl Into<String>,
    port: u16,
    ttl_secs: u64,
    seed: bool,
    config: Config,
) -> anyhow::Result<()> {
    let host = host.into();
    tracing::info!("🔍 tracelens server starting");

    let store = TraceStore::new(Duration::from_secs(ttl_secs), Arc::new(config));

    if seed {
        let count = seed_data::load_seed_data(&store);
        tracing::info!("🌱 loaded {} seed traces", count);
    }

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 listening on http://{}", addr);
    tracing::info!("  - GET  /api/traces            → trace summaries");
    tracing::info!("  - POST /api/traces            → store a trace");
    tracing::info!("  - GET  /api/traces/:id/{{spans,markov,graph,sequence,playback}}");

    serve(listener, store).await?;
    Ok(())
}
