//! Span names and attribute keys used to recognise LLM and agent activity.
//!
//! Follows the `ai.*` naming emitted by the platform SDKs, with fallbacks to
//! the OpenTelemetry GenAI semantic conventions.

use serde::{Deserialize, Serialize};

/// Attribute keys
pub mod keys {
    pub const AGENT_NAME: &str = "ai.agent.name";
    pub const HANDOFF_FROM: &str = "ai.agent.handoff.from";
    pub const HANDOFF_TO: &str = "ai.agent.handoff.to";

    // OpenTelemetry GenAI fallbacks
    pub const GEN_AI_AGENT_NAME: &str = "gen_ai.agent.name";
    pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

    pub const HTTP_METHOD: &str = "http.method";
    pub const HTTP_REQUEST_METHOD: &str = "http.request.method";
    pub const DB_SYSTEM: &str = "db.system";
}

/// Span names
pub mod names {
    pub const AGENT_INVOKE: &str = "ai.agent.invoke";
    pub const AGENT_HANDOFF: &str = "ai.agent.handoff";

    pub const LLM_PREFIX: &str = "ai.llm";
    pub const TOOL_PREFIX: &str = "ai.tool";
    pub const RETRIEVAL_PREFIX: &str = "ai.retrieval";
    pub const EMBEDDING_PREFIX: &str = "ai.embedding";
}

/// Value of `gen_ai.operation.name` marking an agent invocation
pub const INVOKE_AGENT_OPERATION: &str = "invoke_agent";

/// Display category of a span, derived from its name and attributes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanCategory {
    Agent,
    Handoff,
    Llm,
    Tool,
    Retrieval,
    Embedding,
    Http,
    Database,
    Generic,
}

impl SpanCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Handoff => "handoff",
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Retrieval => "retrieval",
            Self::Embedding => "embedding",
            Self::Http => "http",
            Self::Database => "database",
            Self::Generic => "generic",
        }
    }

    /// Material icon name
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Agent => "smart_toy",
            Self::Handoff => "swap_horiz",
            Self::Llm => "psychology",
            Self::Tool => "build",
            Self::Retrieval => "search",
            Self::Embedding => "scatter_plot",
            Self::Http => "http",
            Self::Database => "storage",
            Self::Generic => "radio_button_unchecked",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Self::Agent => "#7b1fa2",
            Self::Handoff => "#f57c00",
            Self::Llm => "#1976d2",
            Self::Tool => "#388e3c",
            Self::Retrieval => "#0097a7",
            Self::Embedding => "#5d4037",
            Self::Http => "#455a64",
            Self::Database => "#6d4c41",
            Self::Generic => "#757575",
        }
    }
}
