use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use newsnet_core::meta_keys::USER_REMOTE_SITE;
use newsnet_core::{ActionKind, Event, NewUser, SyncContext, UserProfile};
use newsnet_distribution::{WATCHED_PROPERTIES, author::watched_meta};

use super::required_email;
use crate::dispatch::{HandlerContext, IncomingEvent};
use crate::error::{SyncError, SyncResult};

/// Role given to readers synced from other sites
pub const ROLE_SUBSCRIBER: &str = "subscriber";

fn notify(ctx: &HandlerContext, user_id: newsnet_core::UserId) -> SyncResult<()> {
    let Some(observer) = &ctx.observer else {
        return Ok(());
    };
    if let Some(user) = ctx.site.get_user(user_id)? {
        observer.user_changed(SyncContext::ingesting(), &user)?;
    }
    Ok(())
}

/// `reader_registered`: mirror a reader account created on another site
pub struct ReaderRegistered;

#[async_trait]
impl IncomingEvent for ReaderRegistered {
    fn action(&self) -> ActionKind {
        ActionKind::ReaderRegistered
    }

    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> SyncResult<()> {
        let email = required_email(event)?;
        if let Some(user) = ctx.site.find_user_by_email(email)? {
            debug!(event_id = event.id, user_id = %user.id, "Reader already exists");
            return Ok(());
        }

        let display_name = event
            .data
            .get("display_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let login = email.split('@').next().unwrap_or(email).to_string();
        let user_id = ctx.site.insert_user(NewUser {
            login,
            email: email.to_string(),
            role: ROLE_SUBSCRIBER.to_string(),
            profile: UserProfile {
                display_name,
                ..UserProfile::default()
            },
        })?;
        ctx.site
            .update_user_meta(user_id, USER_REMOTE_SITE, Value::from(event.site.as_str()))?;

        info!(event_id = event.id, user_id = %user_id, origin = %event.site, "Created network reader");
        notify(ctx, user_id)
    }
}

/// `newspack_network_user_updated`: apply watched fields to a known user
pub struct UserUpdated;

#[async_trait]
impl IncomingEvent for UserUpdated {
    fn action(&self) -> ActionKind {
        ActionKind::UserUpdated
    }

    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> SyncResult<()> {
        let email = required_email(event)?;
        let Some(user) = ctx.site.find_user_by_email(email)? else {
            debug!(event_id = event.id, "User unknown on this site");
            return Ok(());
        };

        let empty = Map::new();
        let section = |name: &str| -> SyncResult<&Map<String, Value>> {
            match event.data.get(name) {
                None | Some(Value::Null) => Ok(&empty),
                Some(Value::Object(map)) => Ok(map),
                Some(_) => Err(SyncError::invalid_event(
                    event.action,
                    format!("`{name}` is not an object"),
                )),
            }
        };

        let props: Map<String, Value> = section("prop")?
            .iter()
            .filter(|(key, _)| WATCHED_PROPERTIES.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let profile: UserProfile = serde_json::from_value(Value::Object(props))
            .map_err(|e| SyncError::invalid_event(event.action, e.to_string()))?;
        let meta = watched_meta(section("meta")?);

        if profile != UserProfile::default() {
            ctx.site.update_user_profile(user.id, &profile)?;
        }
        for (key, value) in meta {
            ctx.site.update_user_meta(user.id, &key, value)?;
        }

        info!(event_id = event.id, user_id = %user.id, "Applied user update");
        notify(ctx, user.id)
    }
}
