//! Fetching traces from a telemetry backend.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracelens_protocol::*;

use crate::config::FetchConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("no telemetry API URL configured")]
    NotConfigured,
}

impl FetchError {
    /// Worth retrying: transport failures, 5xx, 408 and 429.
    /// Other 4xx responses are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            FetchError::Decode(_) | FetchError::Cancelled | FetchError::NotConfigured => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Supplies the bearer token for each request
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token, or none
#[derive(Clone, Debug, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Where traces come from
#[async_trait]
pub trait TraceSource: Send + Sync {
    async fn fetch_trace(&self, trace_id: &TraceId) -> Result<Trace, FetchError>;

    async fn list_traces(&self, filter: &TraceFilter) -> Result<Vec<TraceSummary>, FetchError>;
}

/// REST backend: `GET {base}/traces/{id}` and `GET {base}/traces?…`
pub struct HttpTraceSource {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpTraceSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            tokens: Arc::new(StaticToken::default()),
        })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let base_url = config.base_url.as_deref().ok_or(FetchError::NotConfigured)?;
        Ok(Self::new(base_url, config.timeout())?.with_token_provider(Arc::new(StaticToken(config.token.clone()))))
    }

    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(token) = self.tokens.token() {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send<T: serde::de::DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, FetchError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TraceSource for HttpTraceSource {
    async fn fetch_trace(&self, trace_id: &TraceId) -> Result<Trace, FetchError> {
        tracing::debug!(%trace_id, base = %self.base_url, "fetching trace");
        let body: serde_json::Value = Self::send(self.get(&format!("/traces/{trace_id}"))).await?;
        decode_trace(body, trace_id)
    }

    async fn list_traces(&self, filter: &TraceFilter) -> Result<Vec<TraceSummary>, FetchError> {
        Self::send(self.get("/traces").query(filter)).await
    }
}

/// Accepts a trace object or a bare span array, and links flat spans into a
/// forest by parent id. A bare array takes the requested id.
fn decode_trace(body: serde_json::Value, trace_id: &TraceId) -> Result<Trace, FetchError> {
    let trace = match body {
        serde_json::Value::Array(_) => Trace {
            trace_id: trace_id.clone(),
            roots: serde_json::from_value(body).map_err(|e| FetchError::Decode(e.to_string()))?,
        },
        other => serde_json::from_value(other).map_err(|e| FetchError::Decode(e.to_string()))?,
    };
    Ok(Trace::from_spans(trace.trace_id, trace.roots))
}
