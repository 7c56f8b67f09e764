//! Runs a [`PlaybackController`] on a tokio task, ticking it at a fixed
//! frame interval and publishing snapshots on a watch channel.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracelens_protocol::*;

use crate::config::PlaybackConfig;
use crate::playback::{PlaybackController, PlaybackSnapshot, Speed};

pub struct PlaybackDriver;

impl PlaybackDriver {
    /// Spawn the ticking task. Must be called from within a tokio runtime.
    pub fn spawn(config: &PlaybackConfig, range: Option<TimeRange>) -> PlaybackHandle {
        let controller = PlaybackController::with_range(config.window(), range);
        Self::spawn_controller(controller, config.frame_interval())
    }

    pub fn spawn_controller(controller: PlaybackController, frame_interval: Duration) -> PlaybackHandle {
        let (tx, rx) = watch::channel(controller.snapshot());
        let shared = Arc::new(Shared {
            controller: Mutex::new(controller),
            tx,
        });
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(shared.clone(), frame_interval, cancel.clone()));

        PlaybackHandle {
            shared,
            rx,
            cancel,
            task: Some(task),
        }
    }
}

struct Shared {
    controller: Mutex<PlaybackController>,
    tx: watch::Sender<PlaybackSnapshot>,
}

impl Shared {
    fn update<R>(&self, f: impl FnOnce(&mut PlaybackController) -> R) -> R {
        let mut controller = self.controller.lock();
        let out = f(&mut controller);
        let snapshot = controller.snapshot();
        drop(controller);
        self.publish(snapshot);
        out
    }

    fn publish(&self, snapshot: PlaybackSnapshot) {
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn run(shared: Arc<Shared>, frame_interval: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(frame_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let now = Instant::now().into_std();
                shared.update(|c| c.tick(now));
            }
        }
    }

    tracing::debug!("playback driver stopped");
}

/// Control surface of a running driver. Dropping it stops the clock.
pub struct PlaybackHandle {
    shared: Arc<Shared>,
    rx: watch::Receiver<PlaybackSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    pub fn play(&self) {
        let now = Instant::now().into_std();
        self.shared.update(|c| c.play(now));
    }

    pub fn pause(&self) {
        self.shared.update(PlaybackController::pause);
    }

    pub fn reset(&self) {
        self.shared.update(PlaybackController::reset);
    }

    pub fn scrub_to(&self, t: Timestamp) {
        self.shared.update(|c| c.scrub_to(t));
    }

    pub fn cycle_speed(&self) -> Speed {
        self.shared.update(PlaybackController::cycle_speed)
    }

    /// New trace: the clock stops and rewinds to the start of `range`
    pub fn load(&self, range: Option<TimeRange>) {
        self.shared.update(|c| c.load(range));
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.rx.clone()
    }

    /// Cancel the ticking task; no further snapshots are published by it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop and wait for the ticking task to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(%err, "playback task failed");
            }
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
