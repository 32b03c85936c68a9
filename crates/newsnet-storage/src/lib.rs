//! # Newsnet Storage
//!
//! Storage backends for Newspack Network sites.
//!
//! ## Features
//!
//! - **Site**: [`SiteStore`] implementation over any [`RecordBackend`]
//! - **MemorySite**: In-memory site for testing and simulation
//! - **RedbSite**: Persistent site backed by redb
//! - **EventLog**: The Hub's append-only, monotonically numbered event log
//! - **BlobStore / HttpSideloader**: Content-addressed media storage
//!
//! ## Example
//!
//! ```rust,ignore
//! use newsnet_core::{NewPost, SiteStore, SiteUrl};
//! use newsnet_storage::MemorySite;
//!
//! let site = MemorySite::in_memory(SiteUrl::parse("https://a.test").unwrap());
//! let id = site.insert_post(NewPost::new("Hello", "<p>Hi</p>")).unwrap();
//! assert!(site.get_post(id).unwrap().is_some());
//! ```

pub mod backend;
pub mod blobs;
pub mod error;
pub mod event_log;
pub mod media;
pub mod memory;
pub mod site;
pub mod tables;

// Re-exports
pub use backend::{RecordBackend, Table};
pub use blobs::{BlobStore, BlobStoreConfig, ContentRef};
pub use event_log::{EventLog, EventQuery};
pub use media::{HttpSideloader, ReferenceSideloader};
pub use memory::MemoryBackend;
pub use site::{Site, default_taxonomies};
pub use tables::{RedbStorage, RedbStorageConfig};

// Re-export the error type from newsnet-core for convenience
pub use newsnet_core::StorageError;

/// In-memory site
pub type MemorySite = Site<MemoryBackend>;

/// Persistent site backed by redb
pub type RedbSite = Site<RedbStorage>;

/// Hub event log kept in memory
pub type MemoryEventLog = EventLog<MemoryBackend>;

/// Hub event log persisted in redb
pub type RedbEventLog = EventLog<RedbStorage>;
