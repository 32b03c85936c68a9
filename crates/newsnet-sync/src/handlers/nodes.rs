use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use newsnet_core::{ActionKind, Event, SiteUrl};
use newsnet_distribution::set_network_sites;

use crate::dispatch::{HandlerContext, IncomingEvent};
use crate::error::{SyncError, SyncResult};

/// `network_nodes_synced`: adopt the Hub's list of network sites
///
/// Body: `{"nodes_data": [{"url": ..., "title": ...}, ...]}`. The Hub
/// itself is the event origin and is always part of the network.
pub struct NodesSynced;

#[async_trait]
impl IncomingEvent for NodesSynced {
    fn action(&self) -> ActionKind {
        ActionKind::NodesSynced
    }

    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> SyncResult<()> {
        let nodes = event
            .data
            .get("nodes_data")
            .and_then(Value::as_array)
            .ok_or_else(|| SyncError::invalid_event(event.action, "missing `nodes_data`"))?;

        let mut sites = vec![event.site.clone()];
        for node in nodes {
            let Some(raw) = node.get("url").and_then(Value::as_str) else {
                warn!(event_id = event.id, "Skipping node without url");
                continue;
            };
            match SiteUrl::parse(raw) {
                Ok(url) if !sites.contains(&url) => sites.push(url),
                Ok(_) => {}
                Err(e) => warn!(event_id = event.id, error = %e, "Skipping malformed node url"),
            }
        }

        set_network_sites(ctx.site.as_ref(), &sites)?;
        info!(event_id = event.id, sites = sites.len(), "Synced network sites");
        Ok(())
    }
}
