use async_trait::async_trait;
use tracing::{debug, info};

use newsnet_core::{ActionKind, DistributionError, Event, NetworkPostId};
use newsnet_distribution::IncomingPost;

use super::required_str;
use crate::dispatch::{HandlerContext, IncomingEvent};
use crate::error::{SyncError, SyncResult};

/// `network_post_updated`: insert or update the local copy
pub struct PostUpdated;

#[async_trait]
impl IncomingEvent for PostUpdated {
    fn action(&self) -> ActionKind {
        ActionKind::PostUpdated
    }

    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> SyncResult<()> {
        let incoming = match IncomingPost::new(
            ctx.site.as_ref(),
            ctx.sideloader.as_ref(),
            &event.data,
        ) {
            Ok(incoming) => incoming,
            // Every Node sees every post update; most are for other sites.
            Err(DistributionError::NotDistributedToSite(_)) => {
                debug!(event_id = event.id, "Post not distributed to this site");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if incoming
            .payload()
            .is_some_and(|payload| payload.site_url != event.site)
        {
            return Err(SyncError::invalid_event(
                event.action,
                "payload origin differs from event origin",
            ));
        }

        let mut incoming = incoming.with_listener(ctx.authors.as_ref());
        let post_id = incoming.insert().await?;
        info!(event_id = event.id, post_id = %post_id, "Applied post update");
        Ok(())
    }
}

/// `network_post_deleted`: trash the local copy
pub struct PostDeleted;

#[async_trait]
impl IncomingEvent for PostDeleted {
    fn action(&self) -> ActionKind {
        ActionKind::PostDeleted
    }

    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> SyncResult<()> {
        let raw = required_str(event, "network_post_id")?;
        let network_post_id = NetworkPostId::parse(raw).ok_or_else(|| {
            SyncError::invalid_event(event.action, format!("malformed network_post_id: {raw}"))
        })?;

        let Some(mut incoming) = IncomingPost::from_network_id(
            ctx.site.as_ref(),
            ctx.sideloader.as_ref(),
            &network_post_id,
        )?
        else {
            debug!(event_id = event.id, "No local copy to delete");
            return Ok(());
        };

        if incoming
            .origin()?
            .is_some_and(|origin| origin != event.site)
        {
            return Err(SyncError::invalid_event(
                event.action,
                "deletion does not come from the post's origin",
            ));
        }

        incoming.delete()?;
        info!(event_id = event.id, post_id = ?incoming.post_id(), "Applied post deletion");
        Ok(())
    }
}
