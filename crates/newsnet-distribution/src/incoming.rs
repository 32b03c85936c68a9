//! Incoming post state machine
//!
//! Reconciles a [`Payload`] against the local copy of a distributed post.
//!
//! ```text
//! absent --insert--> linked <--set_unlinked--> unlinked
//!                      |                          |
//!                      +---------delete-----------+--> deleted
//! ```
//!
//! The copy is found by its network post ID meta. Its control state lives
//! in three meta keys: the last received payload, the network post ID and
//! the unlinked flag. Deleting drops only the payload.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use newsnet_core::meta_keys::{INCOMING_ORIGIN, INCOMING_PAYLOAD, NETWORK_POST_ID, UNLINKED};
use newsnet_core::meta_keys::{is_incoming_reserved, is_reserved_taxonomy};
use newsnet_core::{
    DistributionError, DistributionResult, MediaSideloader, MetaMap, NetworkPostId, NewPost,
    Payload, PostData, PostId, PostStatus, PostUpdate, SiteStore, SiteUrl, StorageError,
    validate_payload, wp_date,
};

/// What listeners learn about an applied payload
#[derive(Debug, Clone, Copy)]
pub struct InsertedPost<'a> {
    pub post_id: PostId,
    /// Whether the payload was applied, as opposed to only stored
    pub is_linked: bool,
    /// Whether the local post was created by this insert
    pub created: bool,
    pub payload: &'a Payload,
}

/// Reacts to each successful [`IncomingPost::insert`]
///
/// Listener failures are logged and do not fail the insert.
#[async_trait]
pub trait IncomingPostListener: Send + Sync {
    async fn post_inserted(
        &self,
        site: &dyn SiteStore,
        inserted: &InsertedPost<'_>,
    ) -> DistributionResult<()>;
}

/// One distributed post as seen by a destination site
pub struct IncomingPost<'a> {
    site: &'a dyn SiteStore,
    sideloader: &'a dyn MediaSideloader,
    listeners: Vec<&'a dyn IncomingPostListener>,
    network_post_id: NetworkPostId,
    payload: Option<Payload>,
    post_id: Option<PostId>,
}

impl<'a> IncomingPost<'a> {
    /// Validate `payload` for this site and locate any existing copy
    pub fn new(
        site: &'a dyn SiteStore,
        sideloader: &'a dyn MediaSideloader,
        payload: &Value,
    ) -> DistributionResult<Self> {
        let payload = validate_payload(payload, site.site_url())?;
        if &payload.site_url == site.site_url() {
            return Err(DistributionError::invalid_post(
                "payload originates from this site",
            ));
        }

        let post_id = find_copy(site, &payload.network_post_id)?;
        Ok(Self {
            site,
            sideloader,
            listeners: Vec::new(),
            network_post_id: payload.network_post_id.clone(),
            payload: Some(payload),
            post_id,
        })
    }

    /// Bind `payload` to an existing local post
    ///
    /// Used when adopting a post that was copied by other means. Fails with
    /// `mismatched_post_id` if the post is already a copy of another network
    /// post.
    pub fn for_post(
        site: &'a dyn SiteStore,
        sideloader: &'a dyn MediaSideloader,
        post_id: PostId,
        payload: &Value,
    ) -> DistributionResult<Self> {
        let payload = validate_payload(payload, site.site_url())?;
        if site.get_post(post_id)?.is_none() {
            return Err(DistributionError::invalid_argument(format!(
                "post {post_id} does not exist"
            )));
        }

        if let Some(local) = local_network_id(site, post_id)?
            && local != payload.network_post_id
        {
            return Err(DistributionError::MismatchedPostId {
                local: local.to_string(),
                incoming: payload.network_post_id.to_string(),
            });
        }

        Ok(Self {
            site,
            sideloader,
            listeners: Vec::new(),
            network_post_id: payload.network_post_id.clone(),
            payload: Some(payload),
            post_id: Some(post_id),
        })
    }

    /// The local copy of a network post, if there is one
    pub fn from_network_id(
        site: &'a dyn SiteStore,
        sideloader: &'a dyn MediaSideloader,
        network_post_id: &NetworkPostId,
    ) -> DistributionResult<Option<Self>> {
        let Some(post_id) = find_copy(site, network_post_id)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            site,
            sideloader,
            listeners: Vec::new(),
            network_post_id: network_post_id.clone(),
            payload: stored_payload(site, post_id)?,
            post_id: Some(post_id),
        }))
    }

    /// A local post that is a copy of some network post
    pub fn from_post(
        site: &'a dyn SiteStore,
        sideloader: &'a dyn MediaSideloader,
        post_id: PostId,
    ) -> DistributionResult<Self> {
        let network_post_id = local_network_id(site, post_id)?.ok_or_else(|| {
            DistributionError::invalid_argument(format!("post {post_id} is not a network copy"))
        })?;
        Ok(Self {
            site,
            sideloader,
            listeners: Vec::new(),
            network_post_id,
            payload: stored_payload(site, post_id)?,
            post_id: Some(post_id),
        })
    }

    pub fn with_listener(mut self, listener: &'a dyn IncomingPostListener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn network_post_id(&self) -> &NetworkPostId {
        &self.network_post_id
    }

    /// Local post ID, once a copy exists
    pub fn post_id(&self) -> Option<PostId> {
        self.post_id
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Whether a local copy exists and still follows its origin
    pub fn is_linked(&self) -> DistributionResult<bool> {
        match self.post_id {
            Some(post_id) => Ok(!is_unlinked(self.site, post_id)?),
            None => Ok(false),
        }
    }

    /// Create or update the local copy from the payload
    ///
    /// Rejects a payload older than the stored one with `old_modified_date`.
    /// An unlinked copy only records the payload.
    #[instrument(skip(self), fields(site = %self.site.site_url(), network_post_id = %self.network_post_id.short()))]
    pub async fn insert(&mut self) -> DistributionResult<PostId> {
        let payload = self
            .payload
            .clone()
            .ok_or_else(|| DistributionError::invalid_post("no payload to insert"))?;

        let (post_id, created, previous) = match self.post_id {
            Some(post_id) => {
                let previous = stored_payload(self.site, post_id)?;
                if let Some(previous) = &previous {
                    check_newer(previous, &payload)?;
                }
                if local_network_id(self.site, post_id)?.is_none() {
                    self.site.update_post_meta(
                        post_id,
                        NETWORK_POST_ID,
                        json!(payload.network_post_id.as_str()),
                    )?;
                }
                (post_id, false, previous)
            }
            None => (self.create(&payload)?, true, None),
        };
        self.post_id = Some(post_id);
        self.site.update_post_meta(
            post_id,
            INCOMING_ORIGIN,
            json!(payload.site_url.as_str()),
        )?;

        let is_linked = !is_unlinked(self.site, post_id)?;
        if is_linked {
            self.apply(post_id, &payload, previous.as_ref(), created)
                .await?;
        } else {
            debug!(post_id = %post_id, "Copy is unlinked, storing payload only");
        }
        self.site
            .update_post_meta(post_id, INCOMING_PAYLOAD, payload.to_value()?)?;

        info!(post_id = %post_id, created, is_linked, "Applied incoming payload");

        let inserted = InsertedPost {
            post_id,
            is_linked,
            created,
            payload: &payload,
        };
        for listener in &self.listeners {
            if let Err(e) = listener.post_inserted(self.site, &inserted).await {
                warn!(post_id = %post_id, error = %e, "Incoming post listener failed");
            }
        }

        Ok(post_id)
    }

    /// Site the copy was received from
    ///
    /// Still known after [`delete`](Self::delete) drops the payload.
    pub fn origin(&self) -> DistributionResult<Option<SiteUrl>> {
        if let Some(post_id) = self.post_id
            && let Some(Value::String(url)) =
                self.site.get_post_meta_single(post_id, INCOMING_ORIGIN)?
            && let Ok(url) = SiteUrl::parse(&url)
        {
            return Ok(Some(url));
        }
        Ok(self.payload.as_ref().map(|p| p.site_url.clone()))
    }

    /// Stop or resume following the origin
    ///
    /// Relinking re-applies the stored payload at once, discarding local
    /// edits made while unlinked.
    #[instrument(skip(self), fields(network_post_id = %self.network_post_id.short()))]
    pub async fn set_unlinked(&mut self, unlinked: bool) -> DistributionResult<()> {
        let post_id = self.require_copy()?;
        self.site
            .update_post_meta(post_id, UNLINKED, json!(unlinked))?;

        if !unlinked && let Some(stored) = stored_payload(self.site, post_id)? {
            self.apply(post_id, &stored, Some(&stored), false).await?;
            self.payload = Some(stored);
        }

        info!(post_id = %post_id, unlinked, "Changed link state");
        Ok(())
    }

    /// Trash a linked copy and forget its payload
    ///
    /// The network post ID and unlinked flag stay, so a restored post can
    /// be matched again.
    #[instrument(skip(self), fields(network_post_id = %self.network_post_id.short()))]
    pub fn delete(&mut self) -> DistributionResult<()> {
        let post_id = self.require_copy()?;

        if !is_unlinked(self.site, post_id)? && self.site.trash_post(post_id)? {
            info!(post_id = %post_id, "Trashed incoming copy");
        }
        self.site.delete_post_meta(post_id, INCOMING_PAYLOAD)?;
        self.payload = None;
        Ok(())
    }

    fn require_copy(&self) -> DistributionResult<PostId> {
        self.post_id.ok_or_else(|| {
            DistributionError::invalid_argument(format!(
                "no local copy of network post {}",
                self.network_post_id
            ))
        })
    }

    fn create(&self, payload: &Payload) -> DistributionResult<PostId> {
        let data = &payload.post_data;
        let post_id = self
            .site
            .insert_post(NewPost {
                post_type: data.post_type.clone(),
                title: data.title.clone(),
                slug: data.slug.clone(),
                content: data.raw_content.clone(),
                excerpt: data.excerpt.clone(),
                status: payload.status_on_create.unwrap_or(PostStatus::Draft),
                author: None,
                date_gmt: data.date_gmt,
                modified_gmt: Some(data.modified_gmt),
            })
            .map_err(insert_error)?;

        self.site.update_post_meta(
            post_id,
            NETWORK_POST_ID,
            json!(payload.network_post_id.as_str()),
        )?;
        Ok(post_id)
    }

    async fn apply(
        &self,
        post_id: PostId,
        payload: &Payload,
        previous: Option<&Payload>,
        created: bool,
    ) -> DistributionResult<()> {
        let data = &payload.post_data;
        let current = self
            .site
            .get_post(post_id)?
            .ok_or_else(|| DistributionError::InsertError(format!("post {post_id} vanished")))?;

        let status = if created {
            None
        } else {
            next_status(current.status, payload, previous.is_none())
        };

        self.site
            .update_post(
                post_id,
                PostUpdate {
                    title: Some(data.title.clone()),
                    slug: Some(data.slug.clone()),
                    content: Some(data.raw_content.clone()),
                    excerpt: Some(data.excerpt.clone()),
                    status,
                    author: None,
                    date_gmt: Some(data.date_gmt),
                    modified_gmt: Some(data.modified_gmt),
                },
            )
            .map_err(insert_error)?;

        self.sync_meta(post_id, &data.post_meta)?;
        self.sync_terms(post_id, data)?;
        self.sync_thumbnail(post_id, data.thumbnail_url.as_deref()).await?;
        Ok(())
    }

    fn sync_meta(&self, post_id: PostId, incoming: &MetaMap) -> Result<(), StorageError> {
        let local = self.site.get_post_meta(post_id)?;

        for key in local.keys() {
            if !incoming.contains_key(key) && !is_incoming_reserved(key) {
                self.site.delete_post_meta(post_id, key)?;
            }
        }

        for (key, values) in incoming {
            if is_incoming_reserved(key) || local.get(key) == Some(values) {
                continue;
            }
            match values.as_slice() {
                [] => self.site.delete_post_meta(post_id, key)?,
                [single] => self.site.update_post_meta(post_id, key, single.clone())?,
                many => {
                    self.site.delete_post_meta(post_id, key)?;
                    for value in many {
                        self.site.add_post_meta(post_id, key, value.clone())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn sync_terms(&self, post_id: PostId, data: &PostData) -> Result<(), StorageError> {
        for taxonomy in self.site.taxonomies(&data.post_type)? {
            if !taxonomy.public || is_reserved_taxonomy(&taxonomy.name) {
                continue;
            }

            let mut term_ids = Vec::new();
            for term in data.taxonomy.get(&taxonomy.name).into_iter().flatten() {
                let local = self
                    .site
                    .find_or_create_term(&taxonomy.name, &term.name, &term.slug)?;
                term_ids.push(local.id);
            }
            self.site.set_post_terms(post_id, &taxonomy.name, &term_ids)?;
        }
        Ok(())
    }

    async fn sync_thumbnail(
        &self,
        post_id: PostId,
        url: Option<&str>,
    ) -> Result<(), StorageError> {
        let current = self.site.thumbnail(post_id)?;

        let Some(url) = url else {
            if current.is_some() {
                self.site.set_thumbnail(post_id, None)?;
            }
            return Ok(());
        };

        // Keep the attachment only while it still mirrors the origin's image
        if current.is_some_and(|a| a.source_url.as_deref() == Some(url)) {
            return Ok(());
        }

        match self.sideloader.sideload(self.site, url).await {
            Ok(attachment) => self.site.set_thumbnail(post_id, Some(attachment))?,
            Err(e) => warn!(post_id = %post_id, url, error = %e, "Thumbnail sideload failed"),
        }
        Ok(())
    }
}

/// Status change to apply to an existing copy
///
/// Publishing is never propagated; every other status is. A first payload
/// on an adopted post may carry the status to keep.
fn next_status(current: PostStatus, payload: &Payload, first_apply: bool) -> Option<PostStatus> {
    if first_apply && let Some(status) = payload.status_on_create {
        return (status != current).then_some(status);
    }

    let incoming = payload.post_data.post_status;
    match incoming {
        PostStatus::Publish | PostStatus::Future => None,
        _ if incoming == current => None,
        _ => Some(incoming),
    }
}

fn check_newer(stored: &Payload, incoming: &Payload) -> DistributionResult<()> {
    if stored.network_post_id != incoming.network_post_id {
        return Err(DistributionError::MismatchedPostId {
            local: stored.network_post_id.to_string(),
            incoming: incoming.network_post_id.to_string(),
        });
    }
    if stored.modified_gmt() > incoming.modified_gmt() {
        return Err(DistributionError::OldModifiedDate {
            stored: wp_date::format(&stored.modified_gmt()),
            incoming: wp_date::format(&incoming.modified_gmt()),
        });
    }
    Ok(())
}

/// Backend faults stay retryable; anything else is a refused write
fn insert_error(err: StorageError) -> DistributionError {
    match err {
        StorageError::Io(_) | StorageError::Database(_) => DistributionError::Storage(err),
        other => DistributionError::InsertError(other.to_string()),
    }
}

/// Local post carrying `network_post_id`
pub fn find_copy(
    site: &dyn SiteStore,
    network_post_id: &NetworkPostId,
) -> Result<Option<PostId>, StorageError> {
    let mut matches = site.find_posts_by_meta(NETWORK_POST_ID, &json!(network_post_id.as_str()))?;
    matches.sort();
    if matches.len() > 1 {
        warn!(
            network_post_id = %network_post_id,
            count = matches.len(),
            "Several local copies of one network post, using the oldest"
        );
    }
    Ok(matches.first().copied())
}

fn local_network_id(
    site: &dyn SiteStore,
    post_id: PostId,
) -> Result<Option<NetworkPostId>, StorageError> {
    Ok(site
        .get_post_meta_single(post_id, NETWORK_POST_ID)?
        .as_ref()
        .and_then(Value::as_str)
        .and_then(NetworkPostId::parse))
}

/// The payload last received for a copy
pub fn stored_payload(
    site: &dyn SiteStore,
    post_id: PostId,
) -> Result<Option<Payload>, StorageError> {
    let Some(value) = site.get_post_meta_single(post_id, INCOMING_PAYLOAD)? else {
        return Ok(None);
    };
    match Payload::decode(&value) {
        Ok(payload) => Ok(Some(payload)),
        Err(e) => {
            warn!(post_id = %post_id, error = %e, "Ignoring unreadable stored payload");
            Ok(None)
        }
    }
}

fn is_unlinked(site: &dyn SiteStore, post_id: PostId) -> Result<bool, StorageError> {
    Ok(match site.get_post_meta_single(post_id, UNLINKED)? {
        Some(Value::Bool(flag)) => flag,
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        Some(Value::String(s)) => s == "1" || s == "true",
        _ => false,
    })
}
