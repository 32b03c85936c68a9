//! Configuration for a network site
//!
//! Loaded from TOML. Every field has a default except `site_url`, and a
//! Node also needs `hub_url`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use newsnet_core::SiteUrl;
use newsnet_logging::LogConfig;
use newsnet_storage::{BlobStoreConfig, RedbStorageConfig};

use crate::error::{ServerError, ServerResult};

/// Part a site plays in the network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Keeps the event log and serves pulls
    Hub,
    /// Pulls from the Hub
    #[default]
    Node,
}

/// How incoming media is registered locally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    /// Download into the blob store
    #[default]
    Download,
    /// Keep pointing at the origin's URL
    Reference,
}

/// Configuration of one network site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub role: Role,
    /// Public URL of this site
    pub site_url: Option<SiteUrl>,
    /// Public URL of the Hub (Nodes only)
    pub hub_url: Option<SiteUrl>,
    /// Listen address of the HTTP server
    pub bind: SocketAddr,
    /// Base directory for the database and media
    pub data_dir: PathBuf,
    /// Seconds between scheduled pulls
    pub pull_interval_secs: u64,
    /// Timeout of outbound HTTP calls
    pub http_timeout_secs: u64,
    /// Maximum events per pull response (Hub only)
    pub pull_page_size: usize,
    /// Known network sites; the Hub pushes this list to Nodes
    pub network_sites: Vec<SiteUrl>,
    /// Shared network token; also the capability to distribute
    pub api_token: Option<String>,
    pub media: MediaMode,
    pub logging: LogConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            role: Role::Node,
            site_url: None,
            hub_url: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: PathBuf::from("./newsnet-data"),
            pull_interval_secs: 120,
            http_timeout_secs: 30,
            pull_page_size: 200,
            network_sites: Vec::new(),
            api_token: None,
            media: MediaMode::Download,
            logging: LogConfig::default(),
        }
    }
}

impl NetworkConfig {
    /// Read and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.site_url.is_none() {
            return Err(ServerError::Config("site_url is required".into()));
        }
        if self.role == Role::Node && self.hub_url.is_none() {
            return Err(ServerError::Config("a node needs hub_url".into()));
        }
        if self.pull_interval_secs == 0 {
            return Err(ServerError::Config("pull_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Public URL of this site
    pub fn site_url(&self) -> ServerResult<&SiteUrl> {
        self.site_url
            .as_ref()
            .ok_or_else(|| ServerError::Config("site_url is required".into()))
    }

    /// URL events are exchanged with; a Hub is its own Hub
    pub fn hub_url(&self) -> ServerResult<&SiteUrl> {
        match self.role {
            Role::Hub => self.site_url(),
            Role::Node => self
                .hub_url
                .as_ref()
                .ok_or_else(|| ServerError::Config("a node needs hub_url".into())),
        }
    }

    pub fn pull_interval(&self) -> Duration {
        Duration::from_secs(self.pull_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Database location
    pub fn storage_config(&self) -> RedbStorageConfig {
        RedbStorageConfig::in_dir(&self.data_dir)
    }

    /// Sideloaded media location
    pub fn blob_config(&self) -> BlobStoreConfig {
        BlobStoreConfig::in_dir(self.data_dir.join("uploads"))
    }

    /// Create a configuration for the given role and site
    pub fn new(role: Role, site_url: SiteUrl) -> Self {
        Self {
            role,
            site_url: Some(site_url),
            ..Default::default()
        }
    }

    pub fn with_hub_url(mut self, hub_url: SiteUrl) -> Self {
        self.hub_url = Some(hub_url);
        self
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_pull_interval(mut self, interval: Duration) -> Self {
        self.pull_interval_secs = interval.as_secs().max(1);
        self
    }

    pub fn with_network_sites(mut self, sites: Vec<SiteUrl>) -> Self {
        self.network_sites = sites;
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_media(mut self, media: MediaMode) -> Self {
        self.media = media;
        self
    }

    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }
}
