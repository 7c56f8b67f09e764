//! Turn traces into things you can look at.
//!
//! Every view is a pure function of an immutable span tree:
//!
//! - [`normalize::flatten`]: time-ordered span list with display metadata
//! - [`markov::extract`]: agent states, transitions and their probabilities
//! - [`graph::Graph`] + [`layout::layout`]: layered node/edge coordinates
//! - [`sequence::build`]: lanes, call/return events and arrow geometry
//! - [`playback`]: a tick-driven clock revealing the agent graph over time
//!
//! [`TraceViews`] memoizes them per trace, [`TraceLoader`] fetches traces
//! with retries and discards stale responses.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tracelens::{Config, SpanBuilder, TraceViews};
//! use tracelens::protocol::{Trace, TraceId};
//!
//! let root = SpanBuilder::new("root", "workflow")
//!     .timing_ms(0, 30)
//!     .child(SpanBuilder::agent("1", "planner").timing_ms(0, 10))
//!     .child(SpanBuilder::agent("2", "coder").timing_ms(10, 20))
//!     .build();
//! let trace = Trace::from_spans(TraceId::new("t-1"), vec![root]);
//! let views = TraceViews::new(Arc::new(trace), Arc::new(Config::default()));
//!
//! assert_eq!(views.markov().probability("planner", "coder"), 1.0);
//! ```

pub mod config;
pub mod driver;
pub mod fetch;
pub mod gate;
pub mod graph;
pub mod layout;
pub mod loader;
pub mod markov;
pub mod normalize;
pub mod notify;
pub mod playback;
pub mod retry;
pub mod sequence;
mod span_builder;
pub mod views;

pub use tracelens_protocol as protocol;

pub use config::{Config, ConfigError};
pub use driver::{PlaybackDriver, PlaybackHandle};
pub use fetch::{FetchError, HttpTraceSource, StaticToken, TokenProvider, TraceSource};
pub use gate::{RequestGate, RequestTicket};
pub use graph::Graph;
pub use layout::{Layout, Orientation};
pub use loader::{LoadOutcome, TraceLoader};
pub use markov::MarkovChain;
pub use normalize::FlatSpan;
pub use notify::{Notification, Notifier, TracingNotifier};
pub use playback::{PlaybackController, PlaybackFrame, PlaybackState};
pub use retry::RetryPolicy;
pub use sequence::{ParticipantMode, SequenceDiagram};
pub use span_builder::{IntoAttributeValue, SpanBuilder};
pub use views::TraceViews;
