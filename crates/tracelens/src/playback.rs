//! Time-scrub playback over a trace's time range.
//!
//! [`PlaybackController`] is a tick-driven state machine with no timers of
//! its own; [`crate::driver::PlaybackDriver`] feeds it ticks on a tokio task.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracelens_protocol::*;

use crate::markov::{self, AgentState, MarkovChain};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackState {
    /// Clock at the start of the range
    Stopped,
    Playing,
    Paused { at: Timestamp },
    /// Clock reached the end of the range
    Finished,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Speed {
    #[default]
    #[serde(rename = "1x")]
    X1,
    #[serde(rename = "2x")]
    X2,
    #[serde(rename = "4x")]
    X4,
}

impl Speed {
    pub fn factor(self) -> u32 {
        match self {
            Speed::X1 => 1,
            Speed::X2 => 2,
            Speed::X4 => 4,
        }
    }

    /// 1x -> 2x -> 4x -> 1x
    pub fn next(self) -> Self {
        match self {
            Speed::X1 => Speed::X2,
            Speed::X2 => Speed::X4,
            Speed::X4 => Speed::X1,
        }
    }
}

/// Published view of a controller
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub speed: Speed,
    pub clock: Option<Timestamp>,
    pub progress: f64,
}

#[derive(Clone, Debug)]
pub struct PlaybackController {
    range: Option<TimeRange>,
    /// Wall-clock time to play the whole range at 1x
    window: Duration,
    speed: Speed,
    state: PlaybackState,
    clock: Option<Timestamp>,
    last_tick: Option<Instant>,
}

impl PlaybackController {
    pub fn new(window: Duration) -> Self {
        Self {
            range: None,
            window,
            speed: Speed::X1,
            state: PlaybackState::Stopped,
            clock: None,
            last_tick: None,
        }
    }

    pub fn with_range(window: Duration, range: Option<TimeRange>) -> Self {
        let mut controller = Self::new(window);
        controller.load(range);
        controller
    }

    /// Replace the trace: stops the clock and rewinds to the new start.
    pub fn load(&mut self, range: Option<TimeRange>) {
        self.range = range;
        self.reset();
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn range(&self) -> Option<TimeRange> {
        self.range
    }

    pub fn clock(&self) -> Option<Timestamp> {
        self.clock
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Fraction of the range elapsed, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        match (self.range, self.clock) {
            (Some(range), Some(clock)) if range.duration_nanos() > 0 => {
                clock.saturating_since(range.start) as f64 / range.duration_nanos() as f64
            }
            (Some(_), Some(_)) if self.state == PlaybackState::Finished => 1.0,
            _ => 0.0,
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            speed: self.speed,
            clock: self.clock,
            progress: self.progress(),
        }
    }

    pub fn play(&mut self, now: Instant) {
        let Some(range) = self.range else {
            self.state = PlaybackState::Finished;
            return;
        };

        match self.state {
            PlaybackState::Playing => return,
            PlaybackState::Finished | PlaybackState::Stopped => self.clock = Some(range.start),
            PlaybackState::Paused { at } => self.clock = Some(at),
        }

        if range.duration_nanos() == 0 || self.clock >= Some(range.end) {
            self.finish(range);
            return;
        }

        self.state = PlaybackState::Playing;
        self.last_tick = Some(now);
    }

    pub fn pause(&mut self) {
        if let (PlaybackState::Playing, Some(at)) = (self.state, self.clock) {
            self.state = PlaybackState::Paused { at };
            self.last_tick = None;
        }
    }

    pub fn reset(&mut self) {
        self.state = PlaybackState::Stopped;
        self.clock = self.range.map(|r| r.start);
        self.last_tick = None;
    }

    /// Jump to `t`, clamped to the range, and pause there.
    pub fn scrub_to(&mut self, t: Timestamp) {
        let Some(range) = self.range else {
            return;
        };
        let at = range.clamp(t);
        self.clock = Some(at);
        self.state = PlaybackState::Paused { at };
        self.last_tick = None;
    }

    pub fn cycle_speed(&mut self) -> Speed {
        self.speed = self.speed.next();
        self.speed
    }

    /// Advance the clock by the real time elapsed since the previous tick.
    ///
    /// Returns the clock after the tick.
    pub fn tick(&mut self, now: Instant) -> Option<Timestamp> {
        let (PlaybackState::Playing, Some(range), Some(clock), Some(last)) =
            (self.state, self.range, self.clock, self.last_tick)
        else {
            return self.clock;
        };

        let elapsed = now.saturating_duration_since(last);
        let window = self.window.as_nanos().max(1);
        let advance = elapsed.as_nanos() * u128::from(self.speed.factor()) * u128::from(range.duration_nanos()) / window;
        let advance = u64::try_from(advance).unwrap_or(u64::MAX);

        let next = clock.saturating_add_nanos(advance);
        self.last_tick = Some(now);
        if next >= range.end {
            self.finish(range);
        } else {
            self.clock = Some(next);
        }
        self.clock
    }

    /// Elements stamped at or before the clock are visible
    pub fn is_visible(&self, t: Timestamp) -> bool {
        self.clock.is_some_and(|clock| t <= clock)
    }

    pub fn frame(&self, chain: &MarkovChain) -> Option<PlaybackFrame> {
        self.clock.map(|t| PlaybackFrame::at(chain, t))
    }

    fn finish(&mut self, range: TimeRange) {
        self.clock = Some(range.end);
        self.state = PlaybackState::Finished;
        self.last_tick = None;
    }
}

/// The agent graph as it looked at one instant of trace time
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackFrame {
    pub at: Timestamp,
    /// States, transitions and timed events stamped at or before `at`,
    /// with transition counts and probabilities over what has been revealed
    pub chain: MarkovChain,
    /// Most recent transition at or before `at`
    pub active_transition: Option<TimedTransition>,
    /// Agents whose invocation is running at `at`
    pub active_agents: Vec<String>,
}

impl PlaybackFrame {
    pub fn at(chain: &MarkovChain, t: Timestamp) -> Self {
        let timed_transitions: Vec<TimedTransition> = chain
            .timed_transitions
            .iter()
            .filter(|tr| tr.timestamp <= t)
            .cloned()
            .collect();

        let mut active_agents: Vec<String> = Vec::new();
        for appearance in &chain.timed_agent_events {
            let running = appearance.timestamp <= t
                && t < appearance.timestamp.saturating_add_nanos(appearance.duration_nanos);
            if running && !active_agents.contains(&appearance.agent) {
                active_agents.push(appearance.agent.clone());
            }
        }

        Self {
            at: t,
            active_transition: timed_transitions.last().cloned(),
            active_agents,
            chain: MarkovChain {
                states: revealed_states(chain, t),
                transitions: markov::aggregate(&timed_transitions),
                timed_agent_events: chain
                    .timed_agent_events
                    .iter()
                    .filter(|a| a.timestamp <= t)
                    .cloned()
                    .collect(),
                time_range: chain.time_range,
                timed_transitions,
            },
        }
    }
}

/// States seen by `t`, with totals over the invocations started by `t`.
/// Agents known only from handoffs stay zero-count placeholders.
fn revealed_states(chain: &MarkovChain, t: Timestamp) -> Vec<AgentState> {
    chain
        .states
        .iter()
        .filter(|s| s.first_seen <= t)
        .map(|s| {
            let mut state = AgentState {
                invocation_count: 0,
                total_duration_nanos: 0,
                has_error: false,
                ..s.clone()
            };
            for appearance in chain
                .timed_agent_events
                .iter()
                .filter(|a| a.agent == s.name && a.timestamp <= t)
            {
                state.invocation_count += 1;
                state.total_duration_nanos = state.total_duration_nanos.saturating_add(appearance.duration_nanos);
                state.has_error |= appearance.is_error;
            }
            state
        })
        .collect()
}

impl PlaybackFrame {
    pub fn is_agent_visible(&self, name: &str) -> bool {
        self.chain.state(name).is_some()
    }

    pub fn is_transition_visible(&self, from: &str, to: &str) -> bool {
        self.chain.transition(from, to).is_some()
    }
}
