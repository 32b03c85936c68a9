//! Integration tests for the pull protocol
//!
//! Two Nodes exchange events through an in-process Hub event log: the
//! origin flushes its outbox, the destination pulls and applies.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use newsnet_core::meta_keys::OPTION_NETWORK_SITES;
use newsnet_core::{
    EventDraft, NewPost, NewUser, PostId, PostStatus, PostUpdate, SiteStore, SiteUrl, StorageError,
    SyncContext, UserProfile,
};
use newsnet_distribution::{DistributeOptions, OutgoingPost};
use newsnet_storage::backend::ScanResults;
use newsnet_storage::{
    EventQuery, MemoryBackend, MemoryEventLog, MemorySite, RecordBackend, RedbSite,
    RedbStorageConfig, ReferenceSideloader, Site, Table,
};
use newsnet_sync::{
    Dispatcher, HandlerContext, HubClient, Outbox, PullRequest, Puller, SyncError, SyncResult,
    UserUpdateWatcher, last_pull_error, watermark,
};

fn url(s: &str) -> SiteUrl {
    SiteUrl::parse(s).unwrap()
}

/// Hub client answering from an event log in the same process
struct LogHubClient {
    log: MemoryEventLog,
}

#[async_trait]
impl HubClient for LogHubClient {
    async fn pull(&self, request: &PullRequest) -> SyncResult<Vec<Value>> {
        let query = EventQuery::after(request.last_processed_id)
            .with_actions(request.actions.iter().copied())
            .excluding_site(request.site.clone());
        self.log
            .read(&query)?
            .into_iter()
            .map(|event| serde_json::to_value(event).map_err(|e| SyncError::Decode(e.to_string())))
            .collect()
    }

    async fn submit(&self, draft: &EventDraft) -> SyncResult<u64> {
        Ok(self.log.append(draft.clone())?.id)
    }
}

/// Memory backend whose post writes can be switched to fail
#[derive(Default)]
struct FailingPostWrites {
    inner: MemoryBackend,
    failing: AtomicBool,
}

impl RecordBackend for FailingPostWrites {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(table, key)
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if table == Table::Posts && self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::io("posts table unavailable"));
        }
        self.inner.put(table, key, value)
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<bool, StorageError> {
        self.inner.delete(table, key)
    }

    fn scan_from(
        &self,
        table: Table,
        start: &[u8],
        limit: Option<usize>,
    ) -> Result<ScanResults, StorageError> {
        self.inner.scan_from(table, start, limit)
    }

    fn next_sequence(&self, name: &str) -> Result<u64, StorageError> {
        self.inner.next_sequence(name)
    }

    fn append_sequenced(
        &self,
        sequence: &str,
        table: Table,
        build: &dyn Fn(u64) -> Result<Vec<u8>, StorageError>,
    ) -> Result<u64, StorageError> {
        self.inner.append_sequenced(sequence, table, build)
    }
}

/// One Node: its site, outbox, watcher, and puller
struct TestNode {
    site: Arc<dyn SiteStore>,
    outbox: Arc<Outbox>,
    watcher: Arc<UserUpdateWatcher>,
    puller: Puller,
}

fn create_test_node(site: Arc<dyn SiteStore>, hub: Arc<LogHubClient>) -> TestNode {
    site.update_option(
        OPTION_NETWORK_SITES,
        json!(["https://a.test", "https://b.test"]),
    )
    .unwrap();
    let outbox = Arc::new(Outbox::new(site.clone()));
    let watcher = Arc::new(UserUpdateWatcher::new(
        site.site_url().clone(),
        outbox.clone(),
    ));
    let ctx = HandlerContext::new(site.clone(), Arc::new(ReferenceSideloader))
        .with_observer(watcher.clone());
    let puller = Puller::new(ctx, hub, Arc::new(Dispatcher::with_default_handlers()));
    TestNode {
        site,
        outbox,
        watcher,
        puller,
    }
}

fn create_test_network() -> (TestNode, TestNode, Arc<LogHubClient>) {
    let hub = Arc::new(LogHubClient {
        log: MemoryEventLog::new(Arc::new(MemoryBackend::new())),
    });
    let a = create_test_node(Arc::new(MemorySite::in_memory(url("https://a.test"))), hub.clone());
    let b = create_test_node(Arc::new(MemorySite::in_memory(url("https://b.test"))), hub.clone());
    (a, b, hub)
}

fn create_authored_post(node: &TestNode) -> PostId {
    let author = node
        .site
        .insert_user(NewUser {
            login: "writer".into(),
            email: "writer@a.test".into(),
            role: "author".into(),
            profile: UserProfile {
                display_name: Some("Writer".into()),
                ..UserProfile::default()
            },
        })
        .unwrap();
    let mut post = NewPost::new("Hello", "Body");
    post.author = Some(author);
    node.site.insert_post(post).unwrap()
}

fn copy_of(node: &TestNode) -> PostId {
    let posts = node.site.list_posts().unwrap();
    assert_eq!(posts.len(), 1, "expected exactly one copy");
    posts[0]
}

#[tokio::test]
async fn test_distribution_round_trip_through_hub() {
    let (a, b, hub) = create_test_network();
    let post_id = create_authored_post(&a);

    OutgoingPost::new(a.site.as_ref(), post_id)
        .unwrap()
        .distribute(&["https://b.test"], a.outbox.as_ref(), &DistributeOptions::default())
        .unwrap();
    assert_eq!(a.outbox.len().unwrap(), 1);
    a.outbox.flush(hub.as_ref()).await.unwrap();

    let report = b.puller.pull().await.unwrap();
    assert_eq!(report.processed, 1);

    let copy = b.site.get_post(copy_of(&b)).unwrap().unwrap();
    assert_eq!(copy.title, "Hello");
    assert_eq!(copy.status, PostStatus::Draft);

    // The author was ingested without echoing a user update back
    let author = b.site.find_user_by_email("writer@a.test").unwrap().unwrap();
    assert_eq!(copy.author, Some(author.id));
    assert!(b.outbox.is_empty().unwrap());

    // The origin never pulls its own events
    let report = a.puller.pull().await.unwrap();
    assert_eq!(report.received, 0);
}

#[tokio::test]
async fn test_update_and_delete_propagate() {
    let (a, b, hub) = create_test_network();
    let post_id = create_authored_post(&a);
    let outgoing = OutgoingPost::new(a.site.as_ref(), post_id).unwrap();
    outgoing
        .distribute(&["https://b.test"], a.outbox.as_ref(), &DistributeOptions::default())
        .unwrap();
    a.outbox.flush(hub.as_ref()).await.unwrap();
    b.puller.pull().await.unwrap();

    let post = a.site.get_post(post_id).unwrap().unwrap();
    a.site
        .update_post(
            post_id,
            PostUpdate {
                title: Some("Hello again".into()),
                modified_gmt: Some(post.modified_gmt + chrono::Duration::seconds(1)),
                ..PostUpdate::default()
            },
        )
        .unwrap();
    OutgoingPost::new(a.site.as_ref(), post_id)
        .unwrap()
        .enqueue_update(a.outbox.as_ref(), &DistributeOptions::default())
        .unwrap();
    a.outbox.flush(hub.as_ref()).await.unwrap();
    b.puller.pull().await.unwrap();

    let copy_id = copy_of(&b);
    assert_eq!(b.site.get_post(copy_id).unwrap().unwrap().title, "Hello again");

    a.site.trash_post(post_id).unwrap();
    outgoing.enqueue_delete(a.outbox.as_ref()).unwrap();
    a.outbox.flush(hub.as_ref()).await.unwrap();
    let report = b.puller.pull().await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(
        b.site.get_post(copy_id).unwrap().unwrap().status,
        PostStatus::Trash
    );
    assert_eq!(report.watermark, hub.log.latest_id().unwrap());
}

#[tokio::test]
async fn test_stale_replay_is_rejected_and_passed() {
    let (a, b, hub) = create_test_network();
    let post_id = create_authored_post(&a);
    let outgoing = OutgoingPost::new(a.site.as_ref(), post_id).unwrap();
    outgoing.set_distribution(&["https://b.test"]).unwrap();
    let old = outgoing.payload().unwrap().to_value().unwrap();

    let post = a.site.get_post(post_id).unwrap().unwrap();
    a.site
        .update_post(
            post_id,
            PostUpdate {
                title: Some("Newer".into()),
                modified_gmt: Some(post.modified_gmt + chrono::Duration::seconds(5)),
                ..PostUpdate::default()
            },
        )
        .unwrap();
    let new = OutgoingPost::new(a.site.as_ref(), post_id)
        .unwrap()
        .payload()
        .unwrap()
        .to_value()
        .unwrap();

    // Newer payload lands first, the older one follows
    for payload in [new, old] {
        hub.submit(&EventDraft::new(
            newsnet_core::ActionKind::PostUpdated,
            url("https://a.test"),
            payload,
        ))
        .await
        .unwrap();
    }

    let report = b.puller.pull().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(watermark(b.site.as_ref()).unwrap(), 2);
    assert_eq!(b.site.get_post(copy_of(&b)).unwrap().unwrap().title, "Newer");
}

#[tokio::test]
async fn test_local_user_change_reaches_other_node() {
    let (a, b, hub) = create_test_network();
    for node in [&a, &b] {
        node.site
            .insert_user(NewUser {
                login: "sam".into(),
                email: "sam@example.com".into(),
                role: "author".into(),
                profile: UserProfile::default(),
            })
            .unwrap();
    }

    let sam = a.site.find_user_by_email("sam@example.com").unwrap().unwrap();
    a.site
        .update_user_profile(
            sam.id,
            &UserProfile {
                nickname: Some("Sammy".into()),
                ..UserProfile::default()
            },
        )
        .unwrap();
    a.site.update_user_meta(sam.id, "twitter", json!("@sam")).unwrap();
    let sam = a.site.get_user(sam.id).unwrap().unwrap();
    assert!(a.watcher.user_updated(SyncContext::local(), &sam).unwrap());
    a.outbox.flush(hub.as_ref()).await.unwrap();

    b.puller.pull().await.unwrap();
    let mirrored = b.site.find_user_by_email("sam@example.com").unwrap().unwrap();
    assert_eq!(mirrored.profile.nickname.as_deref(), Some("Sammy"));
    assert_eq!(mirrored.meta["twitter"], json!("@sam"));

    // Applying it on b must not bounce it back to the Hub
    assert!(b.outbox.is_empty().unwrap());
}

#[tokio::test]
async fn test_watermark_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let hub = Arc::new(LogHubClient {
        log: MemoryEventLog::new(Arc::new(MemoryBackend::new())),
    });
    for n in 1..=3 {
        hub.submit(&EventDraft::new(
            newsnet_core::ActionKind::ReaderRegistered,
            url("https://a.test"),
            json!({ "email": format!("reader{n}@a.test") }),
        ))
        .await
        .unwrap();
    }

    let config = RedbStorageConfig::in_dir(temp_dir.path());
    {
        let site = Arc::new(RedbSite::open(url("https://b.test"), config.clone()).unwrap());
        let node = create_test_node(site, hub.clone());
        assert_eq!(node.puller.pull().await.unwrap().processed, 3);
    }

    let site = Arc::new(RedbSite::open(url("https://b.test"), config).unwrap());
    assert_eq!(watermark(site.as_ref()).unwrap(), 3);
    let node = create_test_node(site, hub.clone());
    let report = node.puller.pull().await.unwrap();
    assert_eq!(report.received, 0);
    assert!(
        node.site
            .find_user_by_email("reader3@a.test")
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_storage_fault_keeps_event_for_retry() {
    let (a, _, hub) = create_test_network();
    let post_id = a.site.insert_post(NewPost::new("Hello", "Body")).unwrap();
    OutgoingPost::new(a.site.as_ref(), post_id)
        .unwrap()
        .distribute(&["https://b.test"], a.outbox.as_ref(), &DistributeOptions::default())
        .unwrap();
    a.outbox.flush(hub.as_ref()).await.unwrap();

    let backend = Arc::new(FailingPostWrites::default());
    let b = create_test_node(
        Arc::new(Site::new(url("https://b.test"), backend.clone())),
        hub.clone(),
    );

    backend.failing.store(true, Ordering::SeqCst);
    let err = b.puller.pull().await.unwrap_err();
    assert!(!err.is_rejection());
    assert_eq!(watermark(b.site.as_ref()).unwrap(), 0);
    assert!(last_pull_error(b.site.as_ref()).unwrap().is_some());
    assert!(b.site.list_posts().unwrap().is_empty());

    backend.failing.store(false, Ordering::SeqCst);
    let report = b.puller.pull().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.watermark, hub.log.latest_id().unwrap());
    assert!(last_pull_error(b.site.as_ref()).unwrap().is_none());
    assert_eq!(b.site.get_post(copy_of(&b)).unwrap().unwrap().title, "Hello");
}
