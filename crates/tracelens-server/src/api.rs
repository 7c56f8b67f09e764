//! JSON endpoints for traces and their derived views.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracelens::protocol::*;
use tracelens::{ParticipantMode, TraceViews};

use crate::storage::TraceStore;
use crate::views::GraphView;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("trace {0} not found")]
    TraceNotFound(TraceId),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::TraceNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn routes() -> Router<Arc<TraceStore>> {
    Router::new()
        .route("/ping", get(ping))
        .route("/traces", get(list_traces).post(create_trace))
        .route("/traces/:id", get(get_trace))
        .route("/traces/:id/spans", get(get_spans))
        .route("/traces/:id/markov", get(get_markov))
        .route("/traces/:id/graph", get(get_graph))
        .route("/traces/:id/sequence", get(get_sequence))
        .route("/traces/:id/playback", get(get_playback))
}

async fn ping() -> &'static str {
    "pong"
}

fn lookup(store: &TraceStore, id: String) -> Result<Arc<TraceViews>, ApiError> {
    let trace_id = TraceId::new(id);
    store.get(&trace_id).ok_or(ApiError::TraceNotFound(trace_id))
}

async fn list_traces(
    State(store): State<Arc<TraceStore>>,
    Query(filter): Query<TraceFilter>,
) -> Json<Vec<TraceSummary>> {
    Json(store.list(&filter))
}

async fn create_trace(
    State(store): State<Arc<TraceStore>>,
    Json(trace): Json<Trace>,
) -> Result<(StatusCode, Json<TraceSummary>), ApiError> {
    if trace.trace_id.as_str().trim().is_empty() {
        return Err(ApiError::BadRequest("trace_id must not be empty".to_string()));
    }
    // Flat span lists are linked up by parent id
    let trace = Trace::from_spans(trace.trace_id, trace.roots);
    let summary = store.insert(trace);
    tracing::info!(trace_id = %summary.trace_id, spans = summary.span_count, "trace received");
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_trace(State(store): State<Arc<TraceStore>>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let views = lookup(&store, id)?;
    Ok(Json(views.trace().as_ref()).into_response())
}

async fn get_spans(State(store): State<Arc<TraceStore>>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let views = lookup(&store, id)?;
    Ok(Json(views.flat_spans()).into_response())
}

async fn get_markov(State(store): State<Arc<TraceStore>>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let views = lookup(&store, id)?;
    Ok(Json(views.markov()).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct GraphQuery {
    #[serde(default)]
    view: GraphView,
}

async fn get_graph(
    State(store): State<Arc<TraceStore>>,
    Path(id): Path<String>,
    Query(query): Query<GraphQuery>,
) -> Result<Response, ApiError> {
    let views = lookup(&store, id)?;
    let layout = match query.view {
        GraphView::Calls => views.call_graph(),
        GraphView::Agents => views.agent_graph(),
    };
    Ok(Json(layout).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct SequenceQuery {
    #[serde(default)]
    participants: ParticipantMode,
}

async fn get_sequence(
    State(store): State<Arc<TraceStore>>,
    Path(id): Path<String>,
    Query(query): Query<SequenceQuery>,
) -> Result<Response, ApiError> {
    let views = lookup(&store, id)?;
    Ok(Json(views.sequence(query.participants)).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct PlaybackQuery {
    /// Trace time in nanoseconds; defaults to the end of the trace
    at: Option<u64>,
}

async fn get_playback(
    State(store): State<Arc<TraceStore>>,
    Path(id): Path<String>,
    Query(query): Query<PlaybackQuery>,
) -> Result<Response, ApiError> {
    let views = lookup(&store, id)?;
    let range = views.markov().time_range;
    let at = match (query.at, range) {
        (Some(at), Some(range)) => range.clamp(Timestamp(at)),
        (Some(at), None) => Timestamp(at),
        (None, Some(range)) => range.end,
        (None, None) => Timestamp::default(),
    };
    Ok(Json(views.playback_frame(at)).into_response())
}
