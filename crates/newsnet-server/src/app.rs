//! Assembly of a running site
//!
//! [`App`] wires storage, media, the pull machinery and (on the Hub) the
//! event log according to a [`NetworkConfig`], and serves the routes.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use newsnet_core::{EventSink, MediaSideloader, SiteStore};
use newsnet_distribution::{network_sites, set_network_sites};
use newsnet_storage::{
    BlobStore, HttpSideloader, RedbEventLog, RedbSite, RedbStorage, ReferenceSideloader,
};
use newsnet_sync::{
    Dispatcher, HandlerContext, HttpHubClient, HubClient, Outbox, PullTask, Puller,
    UserUpdateWatcher,
};

use crate::config::{MediaMode, NetworkConfig, Role};
use crate::error::{ServerError, ServerResult};
use crate::hub::{EventStore, Hub, LogSink};
use crate::routes;

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NetworkConfig>,
    /// Local site and ingestion context
    pub ctx: HandlerContext,
    /// Where locally originated events go
    pub sink: Arc<dyn EventSink>,
    /// Set on the Hub
    pub hub: Option<Arc<Hub>>,
    /// Set on Nodes
    pub puller: Option<Arc<Puller>>,
}

/// A configured network site
pub struct App {
    state: AppState,
    outbox: Option<Arc<Outbox>>,
}

impl App {
    /// Open persistent storage under `config.data_dir` and assemble the site
    pub async fn open(config: NetworkConfig) -> ServerResult<Self> {
        config.validate()?;
        let site_url = config.site_url()?.clone();

        let storage = Arc::new(RedbStorage::open(config.storage_config())?);
        let site: Arc<dyn SiteStore> = Arc::new(RedbSite::new(site_url, storage.clone()));

        let sideloader: Arc<dyn MediaSideloader> = match config.media {
            MediaMode::Download => {
                let blobs = Arc::new(BlobStore::new(config.blob_config()).await?);
                Arc::new(HttpSideloader::new(blobs, config.http_timeout())?)
            }
            MediaMode::Reference => Arc::new(ReferenceSideloader),
        };

        match config.role {
            Role::Hub => {
                let log: Arc<dyn EventStore> = Arc::new(RedbEventLog::new(storage));
                Self::from_parts(config, site, sideloader, Some(log), None)
            }
            Role::Node => {
                let mut client =
                    HttpHubClient::new(config.hub_url()?.clone(), config.http_timeout())?;
                if let Some(token) = &config.api_token {
                    client = client.with_token(token);
                }
                let client: Arc<dyn HubClient> = Arc::new(client);
                Self::from_parts(config, site, sideloader, None, Some(client))
            }
        }
    }

    /// Assemble a site from prepared parts
    ///
    /// A Hub needs `log`; a Node needs `client`.
    pub fn from_parts(
        config: NetworkConfig,
        site: Arc<dyn SiteStore>,
        sideloader: Arc<dyn MediaSideloader>,
        log: Option<Arc<dyn EventStore>>,
        client: Option<Arc<dyn HubClient>>,
    ) -> ServerResult<Self> {
        let dispatcher = Arc::new(Dispatcher::with_default_handlers());
        let site_url = site.site_url().clone();

        match config.role {
            Role::Hub => {
                let log = log
                    .ok_or_else(|| ServerError::Config("the hub needs an event log".into()))?;
                let sink: Arc<dyn EventSink> = Arc::new(LogSink(log.clone()));
                let watcher = Arc::new(UserUpdateWatcher::new(site_url, sink.clone()));
                let ctx = HandlerContext::new(site, sideloader).with_observer(watcher);
                let hub = Hub::new(log, ctx.clone(), dispatcher)
                    .with_page_size(config.pull_page_size);
                if !config.network_sites.is_empty() {
                    hub.sync_nodes(&config.network_sites)?;
                }
                Ok(Self {
                    state: AppState {
                        config: Arc::new(config),
                        ctx,
                        sink,
                        hub: Some(Arc::new(hub)),
                        puller: None,
                    },
                    outbox: None,
                })
            }
            Role::Node => {
                let client = client
                    .ok_or_else(|| ServerError::Config("a node needs a hub client".into()))?;
                // The Hub's list wins once it has been synced
                if !config.network_sites.is_empty() && network_sites(site.as_ref())?.is_empty() {
                    set_network_sites(site.as_ref(), &config.network_sites)?;
                }
                let outbox = Arc::new(Outbox::new(site.clone()));
                let watcher = Arc::new(UserUpdateWatcher::new(site_url, outbox.clone()));
                let ctx = HandlerContext::new(site, sideloader).with_observer(watcher);
                let puller = Puller::new(ctx.clone(), client, dispatcher);
                Ok(Self {
                    state: AppState {
                        config: Arc::new(config),
                        ctx,
                        sink: outbox.clone(),
                        hub: None,
                        puller: Some(Arc::new(puller)),
                    },
                    outbox: Some(outbox),
                })
            }
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.state.config
    }

    pub fn site(&self) -> &Arc<dyn SiteStore> {
        &self.state.ctx.site
    }

    pub fn sideloader(&self) -> &Arc<dyn MediaSideloader> {
        &self.state.ctx.sideloader
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.state.sink
    }

    pub fn hub(&self) -> Option<&Arc<Hub>> {
        self.state.hub.as_ref()
    }

    pub fn puller(&self) -> Option<&Arc<Puller>> {
        self.state.puller.as_ref()
    }

    pub fn outbox(&self) -> Option<&Arc<Outbox>> {
        self.outbox.as_ref()
    }

    pub fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    /// Serve HTTP until `shutdown` fires; Nodes also run the pull task
    pub async fn serve(self, shutdown: broadcast::Sender<()>) -> ServerResult<()> {
        let config = self.state.config.clone();
        let listener = TcpListener::bind(config.bind).await?;
        info!(
            addr = %config.bind,
            role = ?config.role,
            site = %self.site().site_url(),
            "Serving"
        );

        let task = self.state.puller.clone().map(|puller| {
            PullTask::spawn(
                puller,
                self.outbox.clone(),
                config.pull_interval(),
                shutdown.subscribe(),
            )
        });

        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        if let Some(task) = task {
            let _ = task.await;
        }
        info!("Server stopped");
        Ok(())
    }
}
