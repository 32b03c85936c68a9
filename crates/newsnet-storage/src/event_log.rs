//! Hub event log
//!
//! Append-only list of network events. Each appended event gets the next
//! number of the `event` sequence, so IDs are strictly increasing in append
//! order and never reused, even across restarts of a persistent backend.

use std::sync::Arc;

use tracing::{debug, instrument};

use newsnet_core::{ActionKind, Event, EventDraft, SiteUrl, StorageError};

use crate::backend::{RecordBackend, Table, id_key};
use crate::error::decode;

const EVENT_SEQUENCE: &str = "event";

/// Selection of events for a pull
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Only events with an ID above this watermark
    pub after: u64,
    /// Only these actions; `None` admits every action
    pub actions: Option<Vec<ActionKind>>,
    /// Skip events that originated at this site
    pub exclude_site: Option<SiteUrl>,
    /// Maximum number of events returned
    pub limit: usize,
}

impl EventQuery {
    pub const DEFAULT_LIMIT: usize = 200;

    pub fn after(after: u64) -> Self {
        Self {
            after,
            actions: None,
            exclude_site: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = ActionKind>) -> Self {
        self.actions = Some(actions.into_iter().collect());
        self
    }

    pub fn excluding_site(mut self, site: SiteUrl) -> Self {
        self.exclude_site = Some(site);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn admits(&self, event: &Event) -> bool {
        if let Some(actions) = &self.actions
            && !actions.contains(&event.action)
        {
            return false;
        }
        self.exclude_site.as_ref() != Some(&event.site)
    }
}

/// Append-only event log over a [`RecordBackend`]
pub struct EventLog<B: RecordBackend> {
    backend: Arc<B>,
}

impl<B: RecordBackend> Clone for EventLog<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: RecordBackend> EventLog<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Append an event, assigning the next ID
    #[instrument(skip(self, draft), fields(action = %draft.action, site = %draft.site))]
    pub fn append(&self, draft: EventDraft) -> Result<Event, StorageError> {
        let id = self
            .backend
            .append_sequenced(EVENT_SEQUENCE, Table::Events, &|id| {
                Ok(serde_json::to_vec(&draft.clone().into_event(id))?)
            })?;
        debug!(event_id = id, "Appended event");
        Ok(draft.into_event(id))
    }

    pub fn get(&self, id: u64) -> Result<Option<Event>, StorageError> {
        self.backend
            .get(Table::Events, &id_key(id))?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(decode))
            .transpose()
    }

    /// Matching events in ascending ID order
    pub fn read(&self, query: &EventQuery) -> Result<Vec<Event>, StorageError> {
        let mut events = Vec::new();
        if query.limit == 0 {
            return Ok(events);
        }

        let Some(mut next) = query.after.checked_add(1) else {
            return Ok(events);
        };
        // Filtered-out events do not count against the limit, so scan in chunks
        let chunk = query.limit.max(32);
        loop {
            let entries = self
                .backend
                .scan_from(Table::Events, &id_key(next), Some(chunk))?;
            let exhausted = entries.len() < chunk;

            for (_, bytes) in entries {
                let event: Event = serde_json::from_slice(&bytes).map_err(decode)?;
                next = event.id.saturating_add(1);
                if query.admits(&event) {
                    events.push(event);
                    if events.len() == query.limit {
                        return Ok(events);
                    }
                }
            }

            if exhausted {
                return Ok(events);
            }
        }
    }

    /// ID of the newest event, 0 when the log is empty
    pub fn latest_id(&self) -> Result<u64, StorageError> {
        let last = self
            .backend
            .get(Table::Sequences, EVENT_SEQUENCE.as_bytes())?
            .and_then(|v| crate::backend::key_id(&v));
        Ok(last.unwrap_or(0))
    }
}
