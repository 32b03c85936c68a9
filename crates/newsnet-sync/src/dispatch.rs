//! Event dispatch
//!
//! A [`Dispatcher`] maps each [`ActionKind`] to the [`IncomingEvent`]
//! handler that applies it to the local site. The set of registered
//! actions is the interest filter a Node sends with every pull.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use newsnet_core::{ActionKind, Event, MediaSideloader, SiteStore, UserChangeObserver};
use newsnet_distribution::AuthorIngestor;

use crate::error::SyncResult;
use crate::handlers;

/// Everything a handler may touch on the local site
#[derive(Clone)]
pub struct HandlerContext {
    pub site: Arc<dyn SiteStore>,
    pub sideloader: Arc<dyn MediaSideloader>,
    pub authors: Arc<AuthorIngestor>,
    pub observer: Option<Arc<dyn UserChangeObserver>>,
}

impl HandlerContext {
    pub fn new(site: Arc<dyn SiteStore>, sideloader: Arc<dyn MediaSideloader>) -> Self {
        let authors = Arc::new(AuthorIngestor::new(sideloader.clone()));
        Self {
            site,
            sideloader,
            authors,
            observer: None,
        }
    }

    /// Report user changes made by handlers to `observer`
    ///
    /// Handlers always report with an ingesting context, so the observer
    /// does not echo them back to the network.
    pub fn with_observer(mut self, observer: Arc<dyn UserChangeObserver>) -> Self {
        self.authors = Arc::new(
            AuthorIngestor::new(self.sideloader.clone()).with_observer(observer.clone()),
        );
        self.observer = Some(observer);
        self
    }
}

/// Applies one kind of Hub event to the local site
///
/// Handlers must be safe to run twice on the same event.
#[async_trait]
pub trait IncomingEvent: Send + Sync {
    fn action(&self) -> ActionKind;

    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> SyncResult<()>;
}

/// Registry of event handlers keyed by action
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<ActionKind, Arc<dyn IncomingEvent>>,
}

impl Dispatcher {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every handler a site runs
    pub fn with_default_handlers() -> Self {
        Self::new()
            .with(handlers::PostUpdated)
            .with(handlers::PostDeleted)
            .with(handlers::ReaderRegistered)
            .with(handlers::UserUpdated)
            .with(handlers::MembershipUpdated)
            .with(handlers::NodesSynced)
    }

    pub fn with(mut self, handler: impl IncomingEvent + 'static) -> Self {
        self.register(Arc::new(handler));
        self
    }

    /// Register a handler, replacing any previous one for its action
    pub fn register(&mut self, handler: Arc<dyn IncomingEvent>) -> Option<Arc<dyn IncomingEvent>> {
        self.handlers.insert(handler.action(), handler)
    }

    pub fn handles(&self, action: ActionKind) -> bool {
        self.handlers.contains_key(&action)
    }

    /// Registered actions in wire order, used as the pull interest filter
    pub fn actions(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|action| self.handles(*action))
            .collect()
    }

    /// Run the handler for `event`
    ///
    /// Returns `false` if no handler is registered for its action.
    pub async fn dispatch(&self, ctx: &HandlerContext, event: &Event) -> SyncResult<bool> {
        let Some(handler) = self.handlers.get(&event.action) else {
            debug!(event_id = event.id, action = %event.action, "No handler for action");
            return Ok(false);
        };
        handler.handle(ctx, event).await?;
        Ok(true)
    }
}
