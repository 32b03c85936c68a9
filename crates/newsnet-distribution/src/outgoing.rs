//! Outgoing posts
//!
//! An [`OutgoingPost`] is a local post viewed as the origin of a network
//! post: it owns the destination list and builds payload snapshots.

use std::collections::BTreeMap;

use chrono::SubsecRound;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use newsnet_core::meta_keys::{DISTRIBUTED_SITES, USER_AVATAR, is_outgoing_reserved};
use newsnet_core::{
    ActionKind, AuthorProfile, DistributedAuthor, DistributionError, DistributionResult,
    EventDraft, EventSink, MetaMap, NetworkPostId, PAYLOAD_VERSION, Payload, PostData, PostId,
    PostRecord, PostStatus, SiteStore, SiteUrl, TermRef,
};

use crate::author::watched_meta;
use crate::network::other_network_sites;
use crate::render::{BlockRenderer, ContentRenderer, RenderOptions};

/// Post types that can be distributed
pub const DISTRIBUTABLE_POST_TYPES: &[&str] = &["post"];

/// Options for [`OutgoingPost::distribute`]
#[derive(Debug, Clone, Default)]
pub struct DistributeOptions {
    /// Status of copies created by this distribution
    pub status_on_create: Option<PostStatus>,
}

/// A local post distributed to other sites
pub struct OutgoingPost<'a> {
    site: &'a dyn SiteStore,
    renderer: &'a dyn ContentRenderer,
    post: PostRecord,
}

impl<'a> OutgoingPost<'a> {
    /// Fails with `invalid_argument` unless `post_id` names a distributable post
    pub fn new(site: &'a dyn SiteStore, post_id: PostId) -> DistributionResult<Self> {
        Self::with_renderer(site, &BlockRenderer, post_id)
    }

    pub fn with_renderer(
        site: &'a dyn SiteStore,
        renderer: &'a dyn ContentRenderer,
        post_id: PostId,
    ) -> DistributionResult<Self> {
        let post = site.get_post(post_id)?.ok_or_else(|| {
            DistributionError::invalid_argument(format!("post {post_id} does not exist"))
        })?;
        if !DISTRIBUTABLE_POST_TYPES.contains(&post.post_type.as_str()) {
            return Err(DistributionError::invalid_argument(format!(
                "post type `{}` cannot be distributed",
                post.post_type
            )));
        }
        Ok(Self {
            site,
            renderer,
            post,
        })
    }

    pub fn post(&self) -> &PostRecord {
        &self.post
    }

    /// Stable cross-site identifier of this post
    pub fn network_post_id(&self) -> NetworkPostId {
        NetworkPostId::derive(self.post.id, self.site.site_url())
    }

    /// Current destination list
    pub fn distribution(&self) -> DistributionResult<Vec<SiteUrl>> {
        Ok(stored_distribution(self.site, self.post.id)?)
    }

    pub fn is_distributed(&self) -> DistributionResult<bool> {
        Ok(!self.distribution()?.is_empty())
    }

    /// Replace the destination list
    ///
    /// URLs are normalized and de-duplicated. Every one must be a known
    /// network site other than this one; otherwise nothing is stored and
    /// `invalid_distribution` is returned.
    #[instrument(skip(self, urls), fields(post_id = %self.post.id))]
    pub fn set_distribution<S: AsRef<str>>(&self, urls: &[S]) -> DistributionResult<Vec<SiteUrl>> {
        let known = other_network_sites(self.site)?;
        let own = self.site.site_url();

        let mut sites: Vec<SiteUrl> = Vec::with_capacity(urls.len());
        for raw in urls {
            let raw = raw.as_ref();
            let url = SiteUrl::parse(raw).map_err(|e| {
                DistributionError::InvalidDistribution(format!("`{raw}`: {}", e.reason))
            })?;
            if &url == own {
                return Err(DistributionError::InvalidDistribution(format!(
                    "{url} is the origin site"
                )));
            }
            if !known.contains(&url) {
                return Err(DistributionError::InvalidDistribution(format!(
                    "{url} is not in the network"
                )));
            }
            if !sites.contains(&url) {
                sites.push(url);
            }
        }

        let value = Value::Array(sites.iter().map(|s| Value::from(s.as_str())).collect());
        self.site
            .update_post_meta(self.post.id, DISTRIBUTED_SITES, value)?;
        debug!(count = sites.len(), "Stored distribution");
        Ok(sites)
    }

    /// Snapshot of the post for its current destinations
    pub fn payload(&self) -> DistributionResult<Payload> {
        let post = &self.post;
        Ok(Payload {
            version: PAYLOAD_VERSION,
            site_url: self.site.site_url().clone(),
            post_id: post.id,
            network_post_id: self.network_post_id(),
            sites: self.distribution()?,
            post_data: PostData {
                title: post.title.clone(),
                // The wire format has whole seconds
                date_gmt: post.date_gmt.trunc_subsecs(0),
                modified_gmt: post.modified_gmt.trunc_subsecs(0),
                slug: post.slug.clone(),
                post_type: post.post_type.clone(),
                raw_content: post.content.clone(),
                content: self
                    .renderer
                    .render(&post.content, RenderOptions::for_distribution()),
                excerpt: post.excerpt.clone(),
                post_status: post.status,
                taxonomy: self.taxonomy()?,
                thumbnail_url: self.thumbnail_url()?,
                post_meta: self.meta(),
                author: self.author()?,
            },
            status_on_create: None,
        })
    }

    /// Set the destinations, then queue the payload for the Hub
    #[instrument(skip(self, urls, sink, options), fields(post_id = %self.post.id))]
    pub fn distribute<S: AsRef<str>>(
        &self,
        urls: &[S],
        sink: &dyn EventSink,
        options: &DistributeOptions,
    ) -> DistributionResult<Payload> {
        if urls.is_empty() {
            return Err(DistributionError::InvalidDistribution(
                "no destination sites".into(),
            ));
        }
        self.set_distribution(urls)?;
        let payload = self.enqueue_update(sink, options)?;
        info!(
            network_post_id = %payload.network_post_id.short(),
            sites = payload.sites.len(),
            "Distributed post"
        );
        Ok(payload)
    }

    /// Queue the current payload as `network_post_updated`
    ///
    /// Fails with `not_distributed` for a post with no destinations.
    pub fn enqueue_update(
        &self,
        sink: &dyn EventSink,
        options: &DistributeOptions,
    ) -> DistributionResult<Payload> {
        let mut payload = self.payload()?;
        if payload.sites.is_empty() {
            return Err(DistributionError::NotDistributed);
        }
        payload.status_on_create = options.status_on_create;

        sink.enqueue(EventDraft::new(
            ActionKind::PostUpdated,
            self.site.site_url().clone(),
            payload.to_value()?,
        ))?;
        Ok(payload)
    }

    /// Queue `network_post_deleted` after the post was trashed or deleted
    pub fn enqueue_delete(&self, sink: &dyn EventSink) -> DistributionResult<()> {
        if !self.is_distributed()? {
            return Ok(());
        }
        sink.enqueue(EventDraft::new(
            ActionKind::PostDeleted,
            self.site.site_url().clone(),
            json!({ "network_post_id": self.network_post_id().as_str() }),
        ))?;
        info!(post_id = %self.post.id, "Queued network post deletion");
        Ok(())
    }

    fn taxonomy(&self) -> DistributionResult<BTreeMap<String, Vec<TermRef>>> {
        let mut taxonomy = BTreeMap::new();
        for tax in self.site.taxonomies(&self.post.post_type)? {
            if !tax.public {
                continue;
            }
            let terms: Vec<TermRef> = self
                .site
                .get_post_terms(self.post.id, &tax.name)?
                .iter()
                .map(TermRef::from)
                .collect();
            if !terms.is_empty() {
                taxonomy.insert(tax.name, terms);
            }
        }
        Ok(taxonomy)
    }

    fn meta(&self) -> MetaMap {
        self.post
            .meta
            .iter()
            .filter(|(key, values)| !is_outgoing_reserved(key) && !values.is_empty())
            .map(|(key, values)| (key.clone(), values.iter().map(native_value).collect()))
            .collect()
    }

    fn thumbnail_url(&self) -> DistributionResult<Option<String>> {
        let Some(attachment) = self.site.thumbnail(self.post.id)? else {
            return Ok(None);
        };
        Ok(Some(self.absolute_url(&attachment.url)))
    }

    fn author(&self) -> DistributionResult<Option<DistributedAuthor>> {
        let Some(user_id) = self.post.author else {
            return Ok(None);
        };
        let Some(user) = self.site.get_user(user_id)? else {
            return Ok(None);
        };

        let avatar_url = match user
            .meta
            .get(USER_AVATAR)
            .and_then(|v| v.get("media_id"))
            .and_then(Value::as_u64)
        {
            Some(media_id) => self
                .site
                .get_attachment(media_id.into())?
                .map(|a| self.absolute_url(&a.url)),
            None => None,
        };

        Ok(Some(DistributedAuthor::WpUser(AuthorProfile {
            email: user.email.clone(),
            profile: user.profile.clone(),
            avatar_url,
            meta: watched_meta(&user.meta),
        })))
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.site.site_url().join_path(url)
        }
    }
}

/// Destination list stored on a post
pub fn stored_distribution(
    site: &dyn SiteStore,
    post_id: PostId,
) -> Result<Vec<SiteUrl>, newsnet_core::StorageError> {
    let Some(Value::Array(entries)) = site.get_post_meta_single(post_id, DISTRIBUTED_SITES)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|raw| SiteUrl::parse(raw).ok())
        .collect())
}

/// Decode meta values stored as JSON text into their native shape
fn native_value(value: &Value) -> Value {
    if let Value::String(text) = value {
        let trimmed = text.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && let Ok(decoded) = serde_json::from_str::<Value>(text)
        {
            return decoded;
        }
    }
    value.clone()
}
