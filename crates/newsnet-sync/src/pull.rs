//! Node side of the pull protocol
//!
//! The watermark in `newspack_network_last_processed_action` is the ID of
//! the last fully processed Hub event. It advances one event at a time,
//! only after the event's handler returns, so an interrupted cycle resumes
//! at the first unprocessed event.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use newsnet_core::meta_keys::{OPTION_LAST_PROCESSED, OPTION_LAST_PULL_ERROR};
use newsnet_core::{Event, SiteStore, StorageError};

use crate::client::HubClient;
use crate::dispatch::{Dispatcher, HandlerContext};
use crate::error::{SyncError, SyncResult};
use crate::protocol::PullRequest;

/// Outcome of one pull cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    /// Events in the Hub response
    pub received: usize,
    /// Events handled (or without a handler) and passed
    pub processed: usize,
    /// Events rejected by their handler and passed
    pub rejected: usize,
    /// Malformed or already processed events
    pub skipped: usize,
    /// Watermark after the cycle
    pub watermark: u64,
}

/// Read the persisted watermark; 0 if never set
pub fn watermark(site: &dyn SiteStore) -> Result<u64, StorageError> {
    Ok(match site.get_option(OPTION_LAST_PROCESSED)? {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

pub fn set_watermark(site: &dyn SiteStore, id: u64) -> Result<(), StorageError> {
    site.update_option(OPTION_LAST_PROCESSED, Value::from(id))
}

/// Message of the last failed pull, if the most recent pull failed
pub fn last_pull_error(site: &dyn SiteStore) -> Result<Option<String>, StorageError> {
    Ok(site
        .get_option(OPTION_LAST_PULL_ERROR)?
        .and_then(|v| v.as_str().map(str::to_string)))
}

/// Runs pull cycles against the Hub
pub struct Puller {
    ctx: HandlerContext,
    client: Arc<dyn HubClient>,
    dispatcher: Arc<Dispatcher>,
    /// Scheduled and manual pulls share the watermark
    cycle: Mutex<()>,
}

impl Puller {
    pub fn new(ctx: HandlerContext, client: Arc<dyn HubClient>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            ctx,
            client,
            dispatcher,
            cycle: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    pub fn client(&self) -> &Arc<dyn HubClient> {
        &self.client
    }

    fn site(&self) -> &dyn SiteStore {
        self.ctx.site.as_ref()
    }

    fn record_error(&self, err: &SyncError) {
        if let Err(e) = self
            .site()
            .update_option(OPTION_LAST_PULL_ERROR, Value::from(err.to_string()))
        {
            error!(error = %e, "Failed to record pull error");
        }
    }

    /// Run one pull cycle
    ///
    /// Transport and storage failures are recorded as the last pull error
    /// and returned; the watermark stays at the last processed event.
    #[instrument(skip(self), fields(site = %self.site().site_url()))]
    pub async fn pull(&self) -> SyncResult<PullReport> {
        let _cycle = self.cycle.lock().await;

        let request = PullRequest {
            last_processed_id: watermark(self.site())?,
            actions: self.dispatcher.actions(),
            site: self.site().site_url().clone(),
        };

        let events = match self.client.pull(&request).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Pull failed");
                self.record_error(&e);
                return Err(e);
            }
        };
        self.site().delete_option(OPTION_LAST_PULL_ERROR)?;

        let mut report = PullReport {
            received: events.len(),
            ..PullReport::default()
        };

        for raw in &events {
            let event = match Event::from_wire(raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed event");
                    report.skipped += 1;
                    continue;
                }
            };

            if event.id <= watermark(self.site())? {
                debug!(event_id = event.id, "Skipping processed event");
                report.skipped += 1;
                continue;
            }

            match self.dispatcher.dispatch(&self.ctx, &event).await {
                Ok(_) => report.processed += 1,
                Err(e) if e.is_rejection() => {
                    warn!(event_id = event.id, action = %event.action, error = %e, "Event rejected");
                    report.rejected += 1;
                }
                Err(e) => {
                    error!(event_id = event.id, action = %event.action, error = %e, "Event failed");
                    self.record_error(&e);
                    return Err(e);
                }
            }

            set_watermark(self.site(), event.id)?;
        }

        report.watermark = watermark(self.site())?;
        if report.received > 0 {
            info!(
                received = report.received,
                processed = report.processed,
                rejected = report.rejected,
                watermark = report.watermark,
                "Pull cycle complete"
            );
        }
        Ok(report)
    }
}
