//! Hub service
//!
//! The Hub keeps the network event log. Nodes submit their events through
//! the webhook and pull everyone else's. The Hub is a site too: events it
//! receives are also applied to its own site.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use newsnet_core::{ActionKind, Event, EventDraft, EventSink, SiteUrl, StorageError};
use newsnet_distribution::{network_sites, set_network_sites};
use newsnet_storage::{EventLog, EventQuery, RecordBackend};
use newsnet_sync::{Dispatcher, HandlerContext, PullRequest};

use crate::error::{ServerError, ServerResult};

/// Storage of the Hub event log
pub trait EventStore: Send + Sync {
    fn append(&self, draft: EventDraft) -> Result<Event, StorageError>;

    fn read(&self, query: &EventQuery) -> Result<Vec<Event>, StorageError>;

    fn latest_id(&self) -> Result<u64, StorageError>;
}

impl<B: RecordBackend> EventStore for EventLog<B> {
    fn append(&self, draft: EventDraft) -> Result<Event, StorageError> {
        EventLog::append(self, draft)
    }

    fn read(&self, query: &EventQuery) -> Result<Vec<Event>, StorageError> {
        EventLog::read(self, query)
    }

    fn latest_id(&self) -> Result<u64, StorageError> {
        EventLog::latest_id(self)
    }
}

pub struct Hub {
    log: Arc<dyn EventStore>,
    /// The Hub's own site
    ctx: HandlerContext,
    dispatcher: Arc<Dispatcher>,
    page_size: usize,
}

impl Hub {
    pub fn new(log: Arc<dyn EventStore>, ctx: HandlerContext, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            log,
            ctx,
            dispatcher,
            page_size: EventQuery::DEFAULT_LIMIT,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn log(&self) -> &Arc<dyn EventStore> {
        &self.log
    }

    fn site_url(&self) -> &SiteUrl {
        self.ctx.site.site_url()
    }

    /// Events for a Node, ascending from its watermark
    ///
    /// An empty action list means every action.
    pub fn pull(&self, request: &PullRequest) -> ServerResult<Vec<Event>> {
        let mut query = EventQuery::after(request.last_processed_id)
            .excluding_site(request.site.clone())
            .with_limit(self.page_size);
        if !request.actions.is_empty() {
            query = query.with_actions(request.actions.iter().copied());
        }
        let events = self.log.read(&query)?;
        debug!(
            site = %request.site,
            after = request.last_processed_id,
            events = events.len(),
            "Served pull"
        );
        Ok(events)
    }

    /// Accept an event from a Node
    ///
    /// The event is appended, then applied to the Hub's own site. A local
    /// failure is logged; the event stays in the log either way.
    #[instrument(skip(self, draft), fields(action = %draft.action, origin = %draft.site))]
    pub async fn receive(&self, draft: EventDraft) -> ServerResult<Event> {
        let known = network_sites(self.ctx.site.as_ref())?;
        if &draft.site != self.site_url() && !known.contains(&draft.site) {
            return Err(ServerError::Forbidden(format!(
                "{} is not a network site",
                draft.site
            )));
        }

        let event = self.log.append(draft)?;
        info!(event_id = event.id, "Logged event");

        if &event.site != self.site_url() {
            match self.dispatcher.dispatch(&self.ctx, &event).await {
                Ok(_) => {}
                Err(e) => warn!(event_id = event.id, error = %e, "Hub could not apply event"),
            }
        }
        Ok(event)
    }

    /// Replace the network list and announce it to every Node
    ///
    /// Does nothing if the list is unchanged.
    pub fn sync_nodes(&self, sites: &[SiteUrl]) -> ServerResult<Option<Event>> {
        let mut sites: Vec<SiteUrl> = sites.to_vec();
        if !sites.contains(self.site_url()) {
            sites.insert(0, self.site_url().clone());
        }
        if network_sites(self.ctx.site.as_ref())? == sites {
            return Ok(None);
        }
        set_network_sites(self.ctx.site.as_ref(), &sites)?;

        let nodes: Vec<Value> = sites
            .iter()
            .filter(|site| *site != self.site_url())
            .map(|site| json!({ "url": site.as_str() }))
            .collect();
        let event = self.log.append(EventDraft::new(
            ActionKind::NodesSynced,
            self.site_url().clone(),
            json!({ "nodes_data": nodes }),
        ))?;
        info!(event_id = event.id, sites = sites.len(), "Announced network sites");
        Ok(Some(event))
    }
}

/// Sink for the Hub's own events, which go straight into the log
pub struct LogSink(pub Arc<dyn EventStore>);

impl EventSink for LogSink {
    fn enqueue(&self, draft: EventDraft) -> Result<(), StorageError> {
        self.0.append(draft).map(|_| ())
    }
}
