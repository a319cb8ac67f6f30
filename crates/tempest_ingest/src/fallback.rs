//! REST polling fallback.
//!
//! Ticks on a fixed interval and only fetches once the stream has been
//! down for a full threshold. Ticks are sequential: a slow fetch delays
//! the next tick rather than overlapping with it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::FetchError;
use crate::observation::Observation;
use crate::store::SnapshotStore;

/// A pull-based source of the current observation.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(&self) -> Result<Observation, FetchError>;
}

/// Outcome of one tick of the fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Idle,
    Fetch,
}

/// Tracks how long the stream has been down, as seen from ticks.
#[derive(Debug, Clone)]
pub struct DisconnectTracker {
    threshold: Duration,
    disconnected_since: Option<Instant>,
}

impl DisconnectTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            disconnected_since: None,
        }
    }

    /// Decide what to do on a tick at `now`.
    ///
    /// The first disconnected tick only records the time, so a single
    /// missed check never triggers a fetch.
    pub fn on_tick(&mut self, connected: bool, now: Instant) -> TickAction {
        if connected {
            self.disconnected_since = None;
            return TickAction::Idle;
        }
        let Some(since) = self.disconnected_since else {
            self.disconnected_since = Some(now);
            return TickAction::Idle;
        };
        if now.duration_since(since) < self.threshold {
            return TickAction::Idle;
        }
        TickAction::Fetch
    }

    pub fn disconnected_since(&self) -> Option<Instant> {
        self.disconnected_since
    }
}

/// Polls `source` into the store while the stream is down.
pub struct PollingFallback<S> {
    source: S,
    store: Arc<SnapshotStore>,
    threshold: Duration,
    poll_interval: Duration,
}

impl<S: ObservationSource> PollingFallback<S> {
    pub fn new(
        source: S,
        store: Arc<SnapshotStore>,
        threshold: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            threshold,
            poll_interval,
        }
    }

    /// Run until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<()>) {
        log::info!(
            "REST fallback armed (threshold {:?}, interval {:?})",
            self.threshold,
            self.poll_interval
        );

        let mut tracker = DisconnectTracker::new(self.threshold);
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; consume it so checks start one interval in.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    log::info!("REST fallback shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let action = tracker.on_tick(self.store.is_connected(), Instant::now());
                    if action == TickAction::Fetch {
                        self.poll_once().await;
                    }
                }
            }
        }
    }

    async fn poll_once(&self) {
        log::warn!("REST fallback activated, polling for observations");
        match self.source.fetch().await {
            Ok(obs) => {
                self.store.replace_observation(obs);
                log::info!(
                    "REST fallback: observation updated (temp={}°C)",
                    obs.air_temperature
                );
            }
            Err(e) => {
                log::error!("REST fallback error: {}", e);
            }
        }
    }
}
