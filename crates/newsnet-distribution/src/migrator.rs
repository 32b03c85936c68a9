//! Distributor migration
//!
//! Sites moving off the legacy Distributor plugin already have copies of
//! their posts on other sites. Migration turns each Distributor
//! subscription into a network link instead of creating a second copy:
//!
//! - the origin sets the post's distribution to the subscription targets
//!   and sends its payload to each target's link endpoint
//! - the target checks the subscription signature and adopts its existing
//!   copy as a linked incoming post

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use newsnet_core::meta_keys::{
    DISTRIBUTOR_MIGRATED, DT_COPY_KEYS, DT_ORIGINAL_POST_URL, DT_SUBSCRIPTION_SIGNATURE,
    DT_SUBSCRIPTIONS,
};
use newsnet_core::{
    DistributionError, DistributionResult, MediaSideloader, PostId, SiteStore, SiteUrl,
};

use crate::error::{LinkError, MigrationError, MigrationResult};
use crate::incoming::{IncomingPost, IncomingPostListener};
use crate::outgoing::OutgoingPost;

/// One legacy Distributor subscription, as stored on the origin post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub target_url: String,
    pub signature: String,
    /// Post ID of the copy on the target
    pub remote_post_id: PostId,
}

/// Sends link requests to destination sites
#[async_trait]
pub trait LinkTransport: Send + Sync {
    async fn link(
        &self,
        target: &SiteUrl,
        remote_post_id: PostId,
        signature: &str,
        payload: &Value,
    ) -> Result<(), LinkError>;
}

/// Which posts to migrate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationTarget {
    Post(PostId),
    All,
}

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub target: MigrationTarget,
    /// Posts per run when migrating all; 0 means no limit
    pub batch_size: usize,
    /// Stop at the first failing post
    pub strict: bool,
    /// Remove the legacy subscriptions once linked
    pub delete: bool,
    /// Report the plan without changing anything
    pub dry_run: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            target: MigrationTarget::All,
            batch_size: 50,
            strict: false,
            delete: false,
            dry_run: false,
        }
    }
}

/// A link the migration will (or did) request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedLink {
    pub post_id: PostId,
    pub target: SiteUrl,
    pub remote_post_id: PostId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFailure {
    pub post_id: PostId,
    pub reason: String,
}

/// Outcome of one migration run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub planned: Vec<PlannedLink>,
    /// Posts fully linked on every target
    pub migrated: Vec<PostId>,
    pub failures: Vec<MigrationFailure>,
    /// Set when `strict` stopped the run early
    pub aborted: bool,
    /// Candidates left for a later batch
    pub remaining: usize,
}

/// Origin side of the migration
pub struct DistributorMigrator<'a> {
    site: &'a dyn SiteStore,
    transport: &'a dyn LinkTransport,
}

impl<'a> DistributorMigrator<'a> {
    pub fn new(site: &'a dyn SiteStore, transport: &'a dyn LinkTransport) -> Self {
        Self { site, transport }
    }

    /// Posts carrying Distributor subscriptions that are not yet migrated
    pub fn candidates(&self) -> MigrationResult<Vec<PostId>> {
        let mut posts = Vec::new();
        for post_id in self.site.list_posts()? {
            if self
                .site
                .get_post_meta_values(post_id, DT_SUBSCRIPTIONS)?
                .is_empty()
                || is_migrated(self.site, post_id)?
            {
                continue;
            }
            posts.push(post_id);
        }
        Ok(posts)
    }

    #[instrument(skip(self, options), fields(site = %self.site.site_url()))]
    pub async fn migrate(&self, options: &MigrateOptions) -> MigrationResult<MigrationReport> {
        let mut report = MigrationReport::default();

        let mut posts = match options.target {
            MigrationTarget::Post(post_id) => vec![post_id],
            MigrationTarget::All => self.candidates()?,
        };
        if options.batch_size > 0 && posts.len() > options.batch_size {
            report.remaining = posts.len() - options.batch_size;
            posts.truncate(options.batch_size);
        }

        for post_id in posts {
            match self.migrate_post(post_id, options, &mut report).await {
                Ok(()) => {
                    if !options.dry_run {
                        report.migrated.push(post_id);
                    }
                }
                Err(e) => {
                    warn!(post_id = %post_id, error = %e, "Distributor migration failed");
                    report.failures.push(MigrationFailure {
                        post_id,
                        reason: e.to_string(),
                    });
                    if options.strict {
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        info!(
            migrated = report.migrated.len(),
            failed = report.failures.len(),
            remaining = report.remaining,
            dry_run = options.dry_run,
            "Distributor migration finished"
        );
        Ok(report)
    }

    async fn migrate_post(
        &self,
        post_id: PostId,
        options: &MigrateOptions,
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        let subscriptions = subscriptions(self.site, post_id)?;
        if subscriptions.is_empty() {
            return Err(MigrationError::NoSubscriptions(post_id.0));
        }

        let mut links = Vec::with_capacity(subscriptions.len());
        for subscription in &subscriptions {
            let target = SiteUrl::parse(&subscription.target_url).map_err(|e| {
                MigrationError::MalformedSubscription {
                    post_id: post_id.0,
                    reason: e.to_string(),
                }
            })?;
            links.push(PlannedLink {
                post_id,
                target,
                remote_post_id: subscription.remote_post_id,
            });
        }
        report.planned.extend(links.iter().cloned());

        if options.dry_run {
            return Ok(());
        }

        let outgoing = OutgoingPost::new(self.site, post_id)?;
        let targets: Vec<&str> = links.iter().map(|l| l.target.as_str()).collect();
        outgoing.set_distribution(&targets)?;
        let payload = outgoing.payload()?.to_value()?;

        for (link, subscription) in links.iter().zip(&subscriptions) {
            self.transport
                .link(
                    &link.target,
                    link.remote_post_id,
                    &subscription.signature,
                    &payload,
                )
                .await
                .map_err(|source| MigrationError::Link {
                    target: link.target.to_string(),
                    source,
                })?;
        }

        self.site
            .update_post_meta(post_id, DISTRIBUTOR_MIGRATED, json!(true))?;
        if options.delete {
            self.site.delete_post_meta(post_id, DT_SUBSCRIPTIONS)?;
        }
        Ok(())
    }
}

fn is_migrated(site: &dyn SiteStore, post_id: PostId) -> MigrationResult<bool> {
    Ok(site
        .get_post_meta_single(post_id, DISTRIBUTOR_MIGRATED)?
        .as_ref()
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// Subscriptions stored on a post
///
/// Each meta value is one subscription object or a list of them.
pub fn subscriptions(site: &dyn SiteStore, post_id: PostId) -> MigrationResult<Vec<Subscription>> {
    let malformed = |reason: String| MigrationError::MalformedSubscription {
        post_id: post_id.0,
        reason,
    };

    let mut found = Vec::new();
    for value in site.get_post_meta_values(post_id, DT_SUBSCRIPTIONS)? {
        let entries = match value {
            Value::Array(entries) => entries,
            other => vec![other],
        };
        for entry in entries {
            let subscription: Subscription =
                serde_json::from_value(entry).map_err(|e| malformed(e.to_string()))?;
            found.push(subscription);
        }
    }
    Ok(found)
}

/// Destination side: adopt an existing Distributor copy as a linked post
///
/// The copy keeps its current status. Legacy Distributor meta is removed
/// once the payload is applied.
#[instrument(skip(site, sideloader, signature, payload, listeners), fields(site = %site.site_url()))]
pub async fn link_distributor_copy(
    site: &dyn SiteStore,
    sideloader: &dyn MediaSideloader,
    post_id: PostId,
    signature: &str,
    payload: &Value,
    listeners: &[&dyn IncomingPostListener],
) -> DistributionResult<PostId> {
    let post = site.get_post(post_id)?.ok_or_else(|| {
        DistributionError::invalid_argument(format!("post {post_id} does not exist"))
    })?;

    if site
        .get_post_meta_single(post_id, DT_ORIGINAL_POST_URL)?
        .is_none()
    {
        return Err(DistributionError::invalid_argument(format!(
            "post {post_id} is not a Distributor copy"
        )));
    }

    let stored_signature = site.get_post_meta_single(post_id, DT_SUBSCRIPTION_SIGNATURE)?;
    if stored_signature.as_ref().and_then(Value::as_str) != Some(signature) {
        return Err(DistributionError::invalid_argument(
            "subscription signature mismatch",
        ));
    }

    let mut payload = payload.clone();
    if let Some(object) = payload.as_object_mut() {
        object.insert("status_on_create".into(), json!(post.status.as_str()));
    }

    let mut incoming = IncomingPost::for_post(site, sideloader, post_id, &payload)?;
    for listener in listeners {
        incoming = incoming.with_listener(*listener);
    }
    incoming.insert().await?;

    for key in DT_COPY_KEYS {
        site.delete_post_meta(post_id, key)?;
    }
    info!(post_id = %post_id, "Linked Distributor copy");
    Ok(post_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use newsnet_core::meta_keys::{NETWORK_POST_ID, OPTION_NETWORK_SITES};
    use newsnet_core::{NewPost, PostStatus};
    use newsnet_storage::{MemorySite, ReferenceSideloader};

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(SiteUrl, PostId, String)>>,
        fail_for: Option<SiteUrl>,
    }

    #[async_trait]
    impl LinkTransport for RecordingTransport {
        async fn link(
            &self,
            target: &SiteUrl,
            remote_post_id: PostId,
            signature: &str,
            _payload: &Value,
        ) -> Result<(), LinkError> {
            if self.fail_for.as_ref() == Some(target) {
                return Err(LinkError::Transport("unreachable".into()));
            }
            self.calls
                .lock()
                .unwrap()
                .push((target.clone(), remote_post_id, signature.to_string()));
            Ok(())
        }
    }

    fn origin() -> MemorySite {
        let site = MemorySite::in_memory(SiteUrl::parse("https://a.test").unwrap());
        site.update_option(
            OPTION_NETWORK_SITES,
            json!(["https://a.test", "https://b.test", "https://c.test"]),
        )
        .unwrap();
        site
    }

    fn subscribed_post(site: &MemorySite, targets: &[(&str, u64)]) -> PostId {
        let id = site.insert_post(NewPost::new("Legacy", "x")).unwrap();
        let subs: Vec<Value> = targets
            .iter()
            .map(|(url, remote)| {
                json!({ "target_url": url, "signature": format!("sig-{remote}"), "remote_post_id": remote })
            })
            .collect();
        site.update_post_meta(id, DT_SUBSCRIPTIONS, Value::Array(subs))
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_dry_run_only_plans() {
        let site = origin();
        let id = subscribed_post(&site, &[("https://b.test", 7)]);
        let transport = RecordingTransport::default();

        let report = DistributorMigrator::new(&site, &transport)
            .migrate(&MigrateOptions {
                dry_run: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.planned.len(), 1);
        assert_eq!(report.planned[0].remote_post_id, PostId(7));
        assert!(report.migrated.is_empty());
        assert!(transport.calls.lock().unwrap().is_empty());
        assert!(OutgoingPost::new(&site, id).unwrap().distribution().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_migrate_links_every_subscription() {
        let site = origin();
        let id = subscribed_post(&site, &[("https://b.test", 7), ("https://c.test/", 9)]);
        let transport = RecordingTransport::default();

        let report = DistributorMigrator::new(&site, &transport)
            .migrate(&MigrateOptions {
                target: MigrationTarget::Post(id),
                delete: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.migrated, vec![id]);
        assert_eq!(transport.calls.lock().unwrap().len(), 2);
        assert_eq!(OutgoingPost::new(&site, id).unwrap().distribution().unwrap().len(), 2);
        assert!(subscriptions(&site, id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_strict_stops_at_first_failure() {
        let site = origin();
        subscribed_post(&site, &[("https://elsewhere.test", 1)]);
        subscribed_post(&site, &[("https://b.test", 2)]);
        let transport = RecordingTransport::default();

        let lenient = DistributorMigrator::new(&site, &transport)
            .migrate(&MigrateOptions::default())
            .await
            .unwrap();
        assert_eq!(lenient.failures.len(), 1);
        assert_eq!(lenient.migrated.len(), 1);

        let strict = DistributorMigrator::new(&site, &transport)
            .migrate(&MigrateOptions {
                strict: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(strict.aborted);
        assert!(strict.migrated.is_empty());
    }

    #[tokio::test]
    async fn test_batch_size_limits_run() {
        let site = origin();
        for remote in 1..=3 {
            subscribed_post(&site, &[("https://b.test", remote)]);
        }
        let transport = RecordingTransport::default();

        let report = DistributorMigrator::new(&site, &transport)
            .migrate(&MigrateOptions {
                batch_size: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.migrated.len(), 2);
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test]
    async fn test_batches_advance_past_migrated_posts() {
        let site = origin();
        let ids: Vec<PostId> = (1..=3)
            .map(|remote| subscribed_post(&site, &[("https://b.test", remote)]))
            .collect();
        let transport = RecordingTransport::default();
        let migrator = DistributorMigrator::new(&site, &transport);
        let options = MigrateOptions {
            batch_size: 2,
            ..Default::default()
        };

        let first = migrator.migrate(&options).await.unwrap();
        assert_eq!(first.migrated, ids[..2].to_vec());
        assert_eq!(first.remaining, 1);
        assert_eq!(migrator.candidates().unwrap(), vec![ids[2]]);

        let second = migrator.migrate(&options).await.unwrap();
        assert_eq!(second.migrated, vec![ids[2]]);
        assert_eq!(second.remaining, 0);
        assert!(!subscriptions(&site, ids[2]).unwrap().is_empty());

        let third = migrator.migrate(&options).await.unwrap();
        assert!(third.migrated.is_empty());
        assert!(third.planned.is_empty());
        assert_eq!(transport.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_post_stays_a_candidate() {
        let site = origin();
        let id = subscribed_post(&site, &[("https://b.test", 1)]);
        let transport = RecordingTransport {
            fail_for: Some(SiteUrl::parse("https://b.test").unwrap()),
            ..Default::default()
        };
        let migrator = DistributorMigrator::new(&site, &transport);

        let report = migrator.migrate(&MigrateOptions::default()).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(migrator.candidates().unwrap(), vec![id]);
    }

    fn destination_copy(site: &MemorySite, status: PostStatus) -> PostId {
        let id = site
            .insert_post(NewPost::new("Old copy", "old").with_status(status))
            .unwrap();
        site.update_post_meta(id, DT_ORIGINAL_POST_URL, json!("https://a.test/?p=1"))
            .unwrap();
        site.update_post_meta(id, DT_SUBSCRIPTION_SIGNATURE, json!("sig"))
            .unwrap();
        id
    }

    fn link_payload() -> Value {
        json!({
            "site_url": "https://a.test",
            "post_id": 1,
            "network_post_id": "feedbeef",
            "sites": ["https://b.test"],
            "post_data": {
                "title": "Fresh",
                "date_gmt": "2024-01-01 00:00:00",
                "modified_gmt": "2024-01-02 00:00:00",
                "slug": "fresh",
                "post_type": "post",
                "raw_content": "new",
                "content": "<p>new</p>",
                "post_status": "draft"
            }
        })
    }

    #[tokio::test]
    async fn test_link_adopts_copy_and_keeps_status() {
        let site = MemorySite::in_memory(SiteUrl::parse("https://b.test").unwrap());
        let id = destination_copy(&site, PostStatus::Publish);

        link_distributor_copy(&site, &ReferenceSideloader, id, "sig", &link_payload(), &[])
            .await
            .unwrap();

        let post = site.get_post(id).unwrap().unwrap();
        assert_eq!(post.title, "Fresh");
        assert_eq!(post.status, PostStatus::Publish);
        assert_eq!(post.meta_value(NETWORK_POST_ID), Some(&json!("feedbeef")));
        assert!(post.meta_value(DT_ORIGINAL_POST_URL).is_none());
        assert!(post.meta_value(DT_SUBSCRIPTION_SIGNATURE).is_none());
    }

    #[tokio::test]
    async fn test_link_requires_matching_signature() {
        let site = MemorySite::in_memory(SiteUrl::parse("https://b.test").unwrap());
        let id = destination_copy(&site, PostStatus::Publish);

        let err = link_distributor_copy(&site, &ReferenceSideloader, id, "forged", &link_payload(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
        assert_eq!(site.get_post(id).unwrap().unwrap().title, "Old copy");

        let plain = site.insert_post(NewPost::new("Plain", "")).unwrap();
        let err = link_distributor_copy(&site, &ReferenceSideloader, plain, "sig", &link_payload(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_link_validates_payload() {
        let site = MemorySite::in_memory(SiteUrl::parse("https://b.test").unwrap());
        let id = destination_copy(&site, PostStatus::Publish);
        let mut payload = link_payload();
        payload["sites"] = json!(["https://c.test"]);

        let err = link_distributor_copy(&site, &ReferenceSideloader, id, "sig", &payload, &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_distributed_to_site");
    }
}
