//! # Newsnet Sync
//!
//! Event exchange between a Node and the Hub of a Newspack Network.
//!
//! ## Features
//!
//! - **Puller**: Pull cycles with a per-event watermark
//! - **Dispatcher**: Registry of [`IncomingEvent`] handlers keyed by action
//! - **Outbox**: Persistent queue of local events for the Hub webhook
//! - **UserUpdateWatcher**: Sends watched user changes without echoing
//!   ingested ones
//! - **PullTask**: Scheduled flush-then-pull loop
//!
//! ## Example
//!
//! ```rust,ignore
//! use newsnet_sync::{Dispatcher, HandlerContext, HttpHubClient, Puller};
//!
//! let client = Arc::new(HttpHubClient::new(hub_url, timeout)?);
//! let ctx = HandlerContext::new(site, sideloader);
//! let puller = Puller::new(ctx, client, Arc::new(Dispatcher::with_default_handlers()));
//! let report = puller.pull().await?;
//! ```

pub mod client;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod outbox;
pub mod protocol;
pub mod pull;
pub mod scheduler;
pub mod watcher;

// Re-exports
pub use client::{HttpHubClient, HttpLinkTransport, HubClient, StaticHubClient, TOKEN_HEADER};
pub use dispatch::{Dispatcher, HandlerContext, IncomingEvent};
pub use error::{SyncError, SyncResult};
pub use outbox::{FlushReport, Outbox};
pub use protocol::{
    DistributeRequest, ErrorBody, LinkRequest, PullRequest, PullResponse, WebhookResponse,
};
pub use pull::{PullReport, Puller, last_pull_error, set_watermark, watermark};
pub use scheduler::{DEFAULT_PULL_INTERVAL, PullTask};
pub use watcher::UserUpdateWatcher;
