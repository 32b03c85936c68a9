//! Queue of locally originated events awaiting delivery to the Hub
//!
//! Entries live in the `newspack_network_outbox` option so they survive
//! restarts. [`Outbox::flush`] sends them in order and stops at the first
//! failure; the entry stays queued for the next attempt.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use newsnet_core::meta_keys::OPTION_OUTBOX;
use newsnet_core::{EventDraft, EventSink, SiteStore, StorageError};

use crate::client::HubClient;
use crate::error::SyncResult;

/// Outcome of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Events accepted by the Hub
    pub sent: usize,
    /// Malformed entries discarded
    pub dropped: usize,
    /// Entries still queued
    pub remaining: usize,
}

pub struct Outbox {
    site: Arc<dyn SiteStore>,
    /// Serializes read-modify-write of the option
    entries: Mutex<()>,
    /// One flush at a time
    flushing: tokio::sync::Mutex<()>,
}

impl Outbox {
    pub fn new(site: Arc<dyn SiteStore>) -> Self {
        Self {
            site,
            entries: Mutex::new(()),
            flushing: tokio::sync::Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<Value>, StorageError> {
        match self.site.get_option(OPTION_OUTBOX)? {
            Some(Value::Array(entries)) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }

    fn store(&self, entries: Vec<Value>) -> Result<(), StorageError> {
        if entries.is_empty() {
            self.site.delete_option(OPTION_OUTBOX)
        } else {
            self.site.update_option(OPTION_OUTBOX, Value::Array(entries))
        }
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Queued events in delivery order, skipping unreadable entries
    pub fn pending(&self) -> Result<Vec<EventDraft>, StorageError> {
        Ok(self
            .load()?
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect())
    }

    /// Remove the head entry if it is still `expected`
    fn pop_front(&self, expected: &Value) -> Result<(), StorageError> {
        let _guard = self.entries.lock();
        let mut entries = self.load()?;
        if entries.first() == Some(expected) {
            entries.remove(0);
            self.store(entries)?;
        }
        Ok(())
    }

    /// Send queued events to the Hub in order
    #[instrument(skip(self, client), fields(site = %self.site.site_url()))]
    pub async fn flush(&self, client: &dyn HubClient) -> SyncResult<FlushReport> {
        let _flushing = self.flushing.lock().await;
        let mut report = FlushReport::default();

        loop {
            let head = {
                let _guard = self.entries.lock();
                self.load()?.into_iter().next()
            };
            let Some(head) = head else {
                break;
            };

            let draft: EventDraft = match serde_json::from_value(head.clone()) {
                Ok(draft) => draft,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed outbox entry");
                    self.pop_front(&head)?;
                    report.dropped += 1;
                    continue;
                }
            };

            match client.submit(&draft).await {
                Ok(id) => {
                    debug!(event_id = id, action = %draft.action, "Delivered event");
                    self.pop_front(&head)?;
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(error = %e, action = %draft.action, "Event delivery failed");
                    return Err(e);
                }
            }
        }

        report.remaining = self.len()?;
        if report.sent > 0 {
            info!(sent = report.sent, "Flushed outbox");
        }
        Ok(report)
    }
}

impl EventSink for Outbox {
    fn enqueue(&self, draft: EventDraft) -> Result<(), StorageError> {
        let entry =
            serde_json::to_value(&draft).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let _guard = self.entries.lock();
        let mut entries = self.load()?;
        entries.push(entry);
        self.store(entries)?;
        debug!(action = %draft.action, "Queued event");
        Ok(())
    }
}
