//! Author ingestion
//!
//! Maps a [`DistributedAuthor`] onto a local user. Email is the cross-site
//! identity key; only the watched properties and meta keys below are ever
//! written, whatever else the payload carries.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use newsnet_core::meta_keys::USER_AVATAR;
use newsnet_core::{
    DistributedAuthor, DistributionError, DistributionResult, MediaSideloader, NewUser, PostUpdate,
    SiteStore, SyncContext, UserChangeObserver, UserId, UserProfile, UserRecord,
};

use crate::incoming::{IncomingPostListener, InsertedPost};

/// Profile properties synced across the network
pub const WATCHED_PROPERTIES: &[&str] = &[
    "display_name",
    "first_name",
    "last_name",
    "description",
    "user_url",
    "nickname",
];

/// User meta keys synced across the network
pub const WATCHED_META: &[&str] = &[
    "facebook",
    "instagram",
    "linkedin",
    "myspace",
    "pinterest",
    "soundcloud",
    "tumblr",
    "twitter",
    "youtube",
    "wikipedia",
    "newspack_job_title",
    "newspack_role",
    "newspack_employer",
    "newspack_phone_number",
];

pub const ROLE_AUTHOR: &str = "author";
pub const ROLE_CONTRIBUTOR: &str = "contributor";

pub fn is_watched_meta(key: &str) -> bool {
    WATCHED_META.contains(&key)
}

/// Only the watched meta entries of `meta`
pub fn watched_meta<'a>(
    meta: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> std::collections::BTreeMap<String, Value> {
    meta.into_iter()
        .filter(|(key, _)| is_watched_meta(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Resolves distributed authors to local users
pub struct AuthorIngestor {
    sideloader: Arc<dyn MediaSideloader>,
    observer: Option<Arc<dyn UserChangeObserver>>,
}

impl AuthorIngestor {
    pub fn new(sideloader: Arc<dyn MediaSideloader>) -> Self {
        Self {
            sideloader,
            observer: None,
        }
    }

    /// Notify `observer` of every user change, flagged as ingestion
    pub fn with_observer(mut self, observer: Arc<dyn UserChangeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Find or create the local user for `author`
    #[instrument(skip(self, site, author), fields(email = %author.profile().email))]
    pub async fn ingest(
        &self,
        site: &dyn SiteStore,
        author: &DistributedAuthor,
    ) -> DistributionResult<UserId> {
        let incoming = author.profile();
        let email = incoming.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DistributionError::invalid_post("author has no usable email"));
        }

        let user_id = match site.find_user_by_email(email)? {
            Some(user) => {
                site.update_user_profile(user.id, &incoming.profile)?;
                user.id
            }
            None => {
                let role = if author.is_guest() {
                    ROLE_CONTRIBUTOR
                } else {
                    ROLE_AUTHOR
                };
                let id = site.insert_user(NewUser {
                    login: login_for(email, &incoming.profile),
                    email: email.to_string(),
                    role: role.to_string(),
                    profile: incoming.profile.clone(),
                })?;
                debug!(user_id = %id, role, "Created local author");
                id
            }
        };

        for (key, value) in watched_meta(&incoming.meta) {
            site.update_user_meta(user_id, &key, value)?;
        }

        if let Some(avatar_url) = &incoming.avatar_url {
            self.sync_avatar(site, user_id, avatar_url).await;
        }

        if let Some(observer) = &self.observer
            && let Some(user) = site.get_user(user_id)?
        {
            observer.user_changed(SyncContext::ingesting(), &user)?;
        }

        Ok(user_id)
    }

    /// Best effort; failures are logged
    async fn sync_avatar(&self, site: &dyn SiteStore, user_id: UserId, avatar_url: &str) {
        let current = site
            .get_user(user_id)
            .ok()
            .flatten()
            .and_then(|user| avatar_source(&user).map(str::to_string));
        if current.as_deref() == Some(avatar_url) {
            return;
        }

        match self.sideloader.sideload(site, avatar_url).await {
            Ok(attachment) => {
                let value = json!({ "media_id": attachment.0, "source_url": avatar_url });
                if let Err(e) = site.update_user_meta(user_id, USER_AVATAR, value) {
                    warn!(user_id = %user_id, error = %e, "Failed to store avatar");
                }
            }
            Err(e) => warn!(user_id = %user_id, url = avatar_url, error = %e, "Avatar sideload failed"),
        }
    }
}

fn avatar_source(user: &UserRecord) -> Option<&str> {
    user.meta.get(USER_AVATAR)?.get("source_url")?.as_str()
}

fn login_for(email: &str, profile: &UserProfile) -> String {
    let from_name = profile
        .display_name
        .as_deref()
        .map(newsnet_core::slugify)
        .filter(|s| !s.is_empty());
    from_name.unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string())
}

#[async_trait]
impl IncomingPostListener for AuthorIngestor {
    async fn post_inserted(
        &self,
        site: &dyn SiteStore,
        inserted: &InsertedPost<'_>,
    ) -> DistributionResult<()> {
        if !inserted.is_linked {
            return Ok(());
        }
        let Some(author) = &inserted.payload.post_data.author else {
            return Ok(());
        };

        let user_id = self.ingest(site, author).await?;
        site.update_post(
            inserted.post_id,
            PostUpdate {
                author: Some(user_id),
                modified_gmt: Some(inserted.payload.modified_gmt()),
                ..Default::default()
            },
        )?;
        Ok(())
    }
}
