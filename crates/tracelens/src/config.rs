//! Configuration for layout geometry, playback and fetching.
//!
//! Every section has defaults, so an empty TOML file (or none at all) is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Environment variable overriding `fetch.base_url`
pub const API_URL_ENV: &str = "TRACELENS_API_URL";
/// Environment variable providing the backend bearer token
pub const API_TOKEN_ENV: &str = "TRACELENS_API_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout: LayoutConfig,
    pub sequence: SequenceConfig,
    pub playback: PlaybackConfig,
    pub fetch: FetchConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Apply `TRACELENS_API_URL` / `TRACELENS_API_TOKEN` if set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.fetch.base_url = Some(url);
            }
        }
        if let Ok(token) = std::env::var(API_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.fetch.token = Some(token);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Geometry for the layered graph layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Size of call-tree (span) nodes
    pub span_node_width: f64,
    pub span_node_height: f64,
    /// Size of Markov-chain (agent) nodes
    pub agent_node_width: f64,
    pub agent_node_height: f64,
    /// Gap between neighbouring nodes of the same rank
    pub node_sep: f64,
    /// Gap between consecutive ranks
    pub rank_sep: f64,
    pub margin: f64,
    pub self_loop_base_radius: f64,
    pub self_loop_radius_step: f64,
    /// Barycenter sweeps used for crossing reduction
    pub ordering_sweeps: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            span_node_width: 220.0,
            span_node_height: 56.0,
            agent_node_width: 160.0,
            agent_node_height: 72.0,
            node_sep: 40.0,
            rank_sep: 90.0,
            margin: 24.0,
            self_loop_base_radius: 22.0,
            self_loop_radius_step: 14.0,
            ordering_sweeps: 8,
        }
    }
}

/// Geometry for sequence diagrams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub lane_width: f64,
    pub row_height: f64,
    pub header_height: f64,
    pub margin: f64,
    /// Arrows shorter than this are not drawn
    pub min_arrow_length: f64,
    pub self_call_width: f64,
    /// Horizontal offset added per self-call already open on a lane
    pub self_call_stack_offset: f64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            lane_width: 160.0,
            row_height: 32.0,
            header_height: 48.0,
            margin: 20.0,
            min_arrow_length: 10.0,
            self_call_width: 28.0,
            self_call_stack_offset: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Wall-clock time for playing the whole trace at 1x
    pub window_ms: u64,
    /// Frame interval of the playback driver
    pub frame_interval_ms: u64,
}

impl PlaybackConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms.max(1))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            window_ms: 10_000,
            frame_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Base URL of the telemetry API, e.g. `http://localhost:8080/api`
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_ms: 10_000,
            retry: RetryPolicy::default(),
        }
    }
}
