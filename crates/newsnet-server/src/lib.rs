//! # Newsnet Server
//!
//! HTTP services of a Newspack Network site.
//!
//! ## Features
//!
//! - **Hub**: Event log with `pull` and `webhook` routes; applies received
//!   events to its own site and announces the network list
//! - **Node**: `pull-now` trigger plus a scheduled flush-then-pull task
//! - **Distribution routes**: `distribute` and the Distributor `link` route
//! - **NetworkConfig**: TOML configuration with builder setters
//!
//! ## Example
//!
//! ```rust,ignore
//! use newsnet_server::{App, NetworkConfig};
//!
//! let app = App::open(NetworkConfig::load("newsnet.toml")?).await?;
//! let (shutdown, _) = tokio::sync::broadcast::channel(1);
//! app.serve(shutdown).await?;
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod hub;
pub mod routes;

// Re-exports
pub use app::{App, AppState};
pub use config::{MediaMode, NetworkConfig, Role};
pub use error::{ServerError, ServerResult};
pub use hub::{EventStore, Hub, LogSink};
