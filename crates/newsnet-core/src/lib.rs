//! # Newsnet Core
//!
//! Core traits, types, and errors for the Newspack Network content
//! distribution protocol.
//!
//! A network is one Hub and any number of Nodes. Posts are distributed from
//! an origin site to destination sites as self-describing [`Payload`]s; the
//! Hub keeps an ordered log of [`Event`]s that Nodes pull forward from a
//! watermark.
//!
//! ## Key Traits
//!
//! - [`SiteStore`]: Abstraction over the local site state (posts, meta,
//!   terms, users, options)
//! - [`MediaSideloader`]: Fetches remote media into the local site
//!
//! ## Key Types
//!
//! - [`SiteUrl`]: Canonical site identity
//! - [`NetworkPostId`]: Stable cross-site join key for one logical post
//! - [`Payload`]: Wire format for one distributed post revision
//! - [`Event`] / [`ActionKind`]: Entries of the Hub event log

pub mod error;
pub mod event;
pub mod meta_keys;
pub mod network_id;
pub mod payload;
pub mod post;
pub mod routes;
pub mod site;
pub mod traits;
pub mod wp_date;

// Re-export main types
pub use error::*;
pub use event::*;
pub use network_id::*;
pub use payload::*;
pub use post::*;
pub use site::*;
pub use traits::*;
