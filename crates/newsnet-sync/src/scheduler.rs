//! Background pull task
//!
//! Each tick flushes the outbox to the Hub, then runs a pull cycle.
//! Failures are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::outbox::Outbox;
use crate::pull::Puller;

/// Default interval between pull cycles
pub const DEFAULT_PULL_INTERVAL: Duration = Duration::from_secs(120);

/// Background pull task
pub struct PullTask {
    puller: Arc<Puller>,
    /// Local events to deliver before each pull
    outbox: Option<Arc<Outbox>>,
    /// Pull interval
    interval: Duration,
    /// Shutdown signal
    shutdown_rx: broadcast::Receiver<()>,
    /// Pull cycle counter
    cycle_count: u64,
}

impl PullTask {
    pub fn new(
        puller: Arc<Puller>,
        outbox: Option<Arc<Outbox>>,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            puller,
            outbox,
            interval,
            shutdown_rx,
            cycle_count: 0,
        }
    }

    /// Spawn the pull task as a background task
    pub fn spawn(
        puller: Arc<Puller>,
        outbox: Option<Arc<Outbox>>,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let task = Self::new(puller, outbox, interval, shutdown_rx);
        tokio::spawn(async move {
            task.run().await;
        })
    }

    async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Pull task started");

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!(cycles = self.cycle_count, "Pull task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.cycle_count += 1;
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        if let Some(outbox) = &self.outbox
            && let Err(e) = outbox.flush(self.puller.client().as_ref()).await
        {
            warn!(error = %e, "Outbox flush failed");
        }

        match self.puller.pull().await {
            Ok(report) => debug!(cycle = self.cycle_count, ?report, "Pull cycle finished"),
            Err(e) => error!(cycle = self.cycle_count, error = %e, "Pull cycle failed"),
        }
    }
}
