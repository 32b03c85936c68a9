//! # Newsnet Distribution
//!
//! Content distribution between sites of a Newspack Network.
//!
//! ## Features
//!
//! - **OutgoingPost**: Network post ID, destination list, and payload
//!   snapshots of a local post
//! - **IncomingPost**: State machine applying payloads to a local copy
//!   (insert, unlink/relink, delete)
//! - **AuthorIngestor**: Maps distributed authors to local users by email
//! - **DistributorMigrator**: Converts legacy Distributor subscriptions into
//!   network links
//! - **BlockRenderer**: Renders block markup for payloads
//!
//! ## Example
//!
//! ```rust,ignore
//! use newsnet_distribution::{IncomingPost, OutgoingPost};
//!
//! let payload = OutgoingPost::new(&origin, post_id)?.payload()?;
//! let mut incoming = IncomingPost::new(&destination, &sideloader, &payload.to_value()?)?;
//! let local_id = incoming.insert().await?;
//! ```

pub mod author;
pub mod error;
pub mod incoming;
pub mod migrator;
pub mod network;
pub mod outgoing;
pub mod render;

// Re-exports
pub use author::{AuthorIngestor, WATCHED_META, WATCHED_PROPERTIES};
pub use error::{LinkError, MigrationError, MigrationResult};
pub use incoming::{IncomingPost, IncomingPostListener, InsertedPost};
pub use migrator::{
    DistributorMigrator, LinkTransport, MigrateOptions, MigrationReport, MigrationTarget,
    link_distributor_copy,
};
pub use network::{network_sites, other_network_sites, set_network_sites};
pub use outgoing::{DistributeOptions, OutgoingPost};
pub use render::{BlockRenderer, ContentRenderer, RenderOptions};

pub use newsnet_core::{DistributionError, DistributionResult};
