//! Integration tests for content distribution
//!
//! Builds payloads on an origin site and applies them on a destination,
//! covering the incoming post lifecycle end to end.

use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;

use newsnet_core::meta_keys::{INCOMING_PAYLOAD, NETWORK_POST_ID, OPTION_NETWORK_SITES, UNLINKED};
use newsnet_core::{
    DistributionError, NewAttachment, NewPost, NewUser, PostId, PostStatus, PostUpdate, SiteStore,
    SiteUrl, UserProfile,
};
use newsnet_distribution::{AuthorIngestor, IncomingPost, OutgoingPost};
use newsnet_storage::{MemorySite, RedbSite, RedbStorageConfig, ReferenceSideloader};

fn url(s: &str) -> SiteUrl {
    SiteUrl::parse(s).unwrap()
}

/// Origin `a.test` in a network with `b.test`, plus the destination site
fn create_test_sites() -> (MemorySite, MemorySite) {
    let origin = MemorySite::in_memory(url("https://a.test"));
    origin
        .update_option(OPTION_NETWORK_SITES, json!(["https://a.test", "https://b.test"]))
        .unwrap();
    let destination = MemorySite::in_memory(url("https://b.test"));
    (origin, destination)
}

/// A published post with terms, meta and a thumbnail, distributed to `b.test`
fn create_distributed_post(origin: &MemorySite) -> PostId {
    let id = origin
        .insert_post(
            NewPost::new("Hello", "<!-- wp:paragraph --><p>Hi</p><!-- /wp:paragraph -->")
                .with_excerpt("Short"),
        )
        .unwrap();
    origin.update_post_meta(id, "single", json!("a")).unwrap();
    origin.add_post_meta(id, "multi", json!(1)).unwrap();
    origin.add_post_meta(id, "multi", json!(2)).unwrap();

    let news = origin.find_or_create_term("category", "News", "news").unwrap();
    let tag = origin.find_or_create_term("post_tag", "Local", "local").unwrap();
    origin.set_post_terms(id, "category", &[news.id]).unwrap();
    origin.set_post_terms(id, "post_tag", &[tag.id]).unwrap();

    let image = origin
        .insert_attachment(NewAttachment {
            url: "https://a.test/wp-content/uploads/hello.jpg".into(),
            source_url: None,
            mime_type: Some("image/jpeg".into()),
            size: 100,
        })
        .unwrap();
    origin.set_thumbnail(id, Some(image)).unwrap();

    OutgoingPost::new(origin, id)
        .unwrap()
        .set_distribution(&["https://b.test"])
        .unwrap();
    id
}

fn payload_of(origin: &MemorySite, id: PostId) -> Value {
    OutgoingPost::new(origin, id)
        .unwrap()
        .payload()
        .unwrap()
        .to_value()
        .unwrap()
}

async fn insert(site: &dyn SiteStore, payload: &Value) -> Result<PostId, DistributionError> {
    IncomingPost::new(site, &ReferenceSideloader, payload)?
        .insert()
        .await
}

fn edit_origin(origin: &MemorySite, id: PostId, update: PostUpdate) -> Value {
    origin.update_post(id, update).unwrap();
    // Payload timestamps have whole seconds; step past the previous one
    let post = origin.get_post(id).unwrap().unwrap();
    origin
        .update_post(
            id,
            PostUpdate {
                modified_gmt: Some(post.modified_gmt + chrono::Duration::seconds(1)),
                ..Default::default()
            },
        )
        .unwrap();
    payload_of(origin, id)
}

#[tokio::test]
async fn test_round_trip_reproduces_post() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);

    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();
    let copy = destination.get_post(local).unwrap().unwrap();
    let source = origin.get_post(id).unwrap().unwrap();

    assert_eq!(copy.title, source.title);
    assert_eq!(copy.content, source.content);
    assert_eq!(copy.excerpt, source.excerpt);
    assert_eq!(copy.slug, source.slug);
    assert_eq!(copy.status, PostStatus::Draft);

    assert_eq!(copy.meta["single"], vec![json!("a")]);
    assert_eq!(copy.meta["multi"], vec![json!(1), json!(2)]);

    let terms = destination.get_post_terms(local, "category").unwrap();
    assert_eq!(terms.len(), 1);
    assert_eq!((terms[0].name.as_str(), terms[0].slug.as_str()), ("News", "news"));
    assert_eq!(destination.get_post_terms(local, "post_tag").unwrap()[0].slug, "local");

    let thumbnail = destination.thumbnail(local).unwrap().unwrap();
    assert_eq!(thumbnail.url, "https://a.test/wp-content/uploads/hello.jpg");

    let network_post_id = OutgoingPost::new(&origin, id).unwrap().network_post_id();
    assert_eq!(
        copy.meta_value(NETWORK_POST_ID),
        Some(&json!(network_post_id.as_str()))
    );
}

#[tokio::test]
async fn test_insert_is_idempotent() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let payload = payload_of(&origin, id);

    let first = insert(&destination, &payload).await.unwrap();
    let before = destination.get_post(first).unwrap().unwrap();
    let attachments_before = before.thumbnail;

    let second = insert(&destination, &payload).await.unwrap();
    let after = destination.get_post(second).unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(before, after);
    assert_eq!(after.thumbnail, attachments_before);
    assert_eq!(destination.list_posts().unwrap().len(), 1);
}

#[tokio::test]
async fn test_example_scenario_staleness() {
    let destination = MemorySite::in_memory(url("https://b.test"));
    let payload = |modified: &str, title: &str| {
        json!({
            "site_url": "https://a.test",
            "post_id": 1,
            "network_post_id": "abc123",
            "sites": ["https://b.test"],
            "post_data": {
                "title": title,
                "date_gmt": "2024-01-01 00:00:00",
                "modified_gmt": modified,
                "slug": "hello",
                "post_type": "post",
                "raw_content": "body",
                "content": "<p>body</p>",
                "post_status": "publish"
            }
        })
    };

    let local = insert(&destination, &payload("2024-01-01 00:00:00", "New"))
        .await
        .unwrap();
    assert_eq!(
        destination.get_post(local).unwrap().unwrap().status,
        PostStatus::Draft
    );

    let err = insert(&destination, &payload("2023-01-01 00:00:00", "Old"))
        .await
        .unwrap_err();
    assert!(matches!(err, DistributionError::OldModifiedDate { .. }));
    assert_eq!(destination.get_post(local).unwrap().unwrap().title, "New");
}

#[tokio::test]
async fn test_updates_apply_and_meta_resyncs() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();

    // Local-only meta is dropped, reserved meta survives
    destination
        .update_post_meta(local, "local_only", json!(true))
        .unwrap();

    origin.delete_post_meta(id, "multi").unwrap();
    origin.update_post_meta(id, "single", json!("b")).unwrap();
    let payload = edit_origin(
        &origin,
        id,
        PostUpdate {
            title: Some("Updated".into()),
            ..Default::default()
        },
    );
    insert(&destination, &payload).await.unwrap();

    let copy = destination.get_post(local).unwrap().unwrap();
    assert_eq!(copy.title, "Updated");
    assert_eq!(copy.meta["single"], vec![json!("b")]);
    assert!(!copy.meta.contains_key("multi"));
    assert!(!copy.meta.contains_key("local_only"));
    assert!(copy.meta.contains_key(NETWORK_POST_ID));
    assert!(copy.meta.contains_key(INCOMING_PAYLOAD));
}

#[tokio::test]
async fn test_terms_are_replaced_and_thumbnail_removed() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();

    let sports = origin.find_or_create_term("category", "Sports", "sports").unwrap();
    origin.set_post_terms(id, "category", &[sports.id]).unwrap();
    origin.set_post_terms(id, "post_tag", &[]).unwrap();
    origin.set_thumbnail(id, None).unwrap();
    let payload = edit_origin(&origin, id, PostUpdate::default());
    insert(&destination, &payload).await.unwrap();

    let categories = destination.get_post_terms(local, "category").unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].name, "Sports");
    assert!(destination.get_post_terms(local, "post_tag").unwrap().is_empty());
    assert!(destination.thumbnail(local).unwrap().is_none());
}

#[tokio::test]
async fn test_reserved_taxonomy_is_untouched() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let byline = origin.find_or_create_term("author", "cap-origin", "cap-origin").unwrap();
    origin.set_post_terms(id, "author", &[byline.id]).unwrap();

    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();
    assert!(destination.get_post_terms(local, "author").unwrap().is_empty());

    let local_byline = destination.find_or_create_term("author", "cap-local", "cap-local").unwrap();
    destination
        .set_post_terms(local, "author", &[local_byline.id])
        .unwrap();
    let payload = edit_origin(&origin, id, PostUpdate::default());
    insert(&destination, &payload).await.unwrap();
    assert_eq!(
        destination.get_post_terms(local, "author").unwrap(),
        vec![local_byline]
    );
}

#[tokio::test]
async fn test_status_is_one_way() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();
    let status = |site: &MemorySite| site.get_post(local).unwrap().unwrap().status;

    // Origin is published; the draft copy stays draft
    let payload = edit_origin(&origin, id, PostUpdate::default());
    insert(&destination, &payload).await.unwrap();
    assert_eq!(status(&destination), PostStatus::Draft);

    // Published locally, then the origin moves to pending
    destination
        .update_post(
            local,
            PostUpdate {
                status: Some(PostStatus::Publish),
                ..Default::default()
            },
        )
        .unwrap();
    let payload = edit_origin(
        &origin,
        id,
        PostUpdate {
            status: Some(PostStatus::Pending),
            ..Default::default()
        },
    );
    insert(&destination, &payload).await.unwrap();
    assert_eq!(status(&destination), PostStatus::Pending);

    // Back to publish at the origin never republishes the copy
    let payload = edit_origin(
        &origin,
        id,
        PostUpdate {
            status: Some(PostStatus::Publish),
            ..Default::default()
        },
    );
    insert(&destination, &payload).await.unwrap();
    assert_eq!(status(&destination), PostStatus::Pending);

    for next in [PostStatus::Private, PostStatus::Draft, PostStatus::Trash] {
        let payload = edit_origin(
            &origin,
            id,
            PostUpdate {
                status: Some(next),
                ..Default::default()
            },
        );
        insert(&destination, &payload).await.unwrap();
        assert_eq!(status(&destination), next);
    }
}

#[tokio::test]
async fn test_unlink_preserves_edits_and_relink_restores() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();
    let network_post_id = OutgoingPost::new(&origin, id).unwrap().network_post_id();

    let mut copy = IncomingPost::from_network_id(&destination, &ReferenceSideloader, &network_post_id)
        .unwrap()
        .unwrap();
    copy.set_unlinked(true).await.unwrap();
    assert!(!copy.is_linked().unwrap());

    destination
        .update_post(
            local,
            PostUpdate {
                title: Some("Local edit".into()),
                content: Some("Local body".into()),
                ..Default::default()
            },
        )
        .unwrap();

    // Updates while unlinked are stored but not applied
    let payload = edit_origin(
        &origin,
        id,
        PostUpdate {
            title: Some("Origin v2".into()),
            ..Default::default()
        },
    );
    insert(&destination, &payload).await.unwrap();
    assert_eq!(destination.get_post(local).unwrap().unwrap().title, "Local edit");

    copy.set_unlinked(false).await.unwrap();
    let restored = destination.get_post(local).unwrap().unwrap();
    assert_eq!(restored.title, "Origin v2");
    assert_eq!(restored.content, origin.get_post(id).unwrap().unwrap().content);
    assert_eq!(restored.meta_value(UNLINKED), Some(&json!(false)));
}

#[tokio::test]
async fn test_relink_restores_thumbnail_changed_while_unlinked() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();
    let first = destination.thumbnail(local).unwrap().unwrap();
    assert_eq!(
        first.source_url.as_deref(),
        Some("https://a.test/wp-content/uploads/hello.jpg")
    );

    let mut copy = IncomingPost::from_post(&destination, &ReferenceSideloader, local).unwrap();
    copy.set_unlinked(true).await.unwrap();

    let replacement = origin
        .insert_attachment(NewAttachment {
            url: "https://a.test/wp-content/uploads/other.jpg".into(),
            source_url: None,
            mime_type: Some("image/jpeg".into()),
            size: 200,
        })
        .unwrap();
    origin.set_thumbnail(id, Some(replacement)).unwrap();
    insert(&destination, &edit_origin(&origin, id, PostUpdate::default()))
        .await
        .unwrap();
    assert_eq!(destination.thumbnail(local).unwrap().unwrap().id, first.id);

    copy.set_unlinked(false).await.unwrap();
    let restored = destination.thumbnail(local).unwrap().unwrap();
    assert_eq!(
        restored.source_url.as_deref(),
        Some("https://a.test/wp-content/uploads/other.jpg")
    );
}

#[tokio::test]
async fn test_local_thumbnail_is_replaced_by_origin() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();

    let own = destination
        .insert_attachment(NewAttachment {
            url: "https://b.test/wp-content/uploads/mine.png".into(),
            source_url: None,
            mime_type: Some("image/png".into()),
            size: 10,
        })
        .unwrap();
    destination.set_thumbnail(local, Some(own)).unwrap();

    insert(&destination, &edit_origin(&origin, id, PostUpdate::default()))
        .await
        .unwrap();
    let thumbnail = destination.thumbnail(local).unwrap().unwrap();
    assert_ne!(thumbnail.id, own);
    assert_eq!(
        thumbnail.source_url.as_deref(),
        Some("https://a.test/wp-content/uploads/hello.jpg")
    );
}

#[tokio::test]
async fn test_delete_trashes_and_keeps_link_meta() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();

    let mut copy = IncomingPost::from_post(&destination, &ReferenceSideloader, local).unwrap();
    copy.delete().unwrap();

    let post = destination.get_post(local).unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Trash);
    assert!(!post.meta.contains_key(INCOMING_PAYLOAD));
    assert!(post.meta.contains_key(NETWORK_POST_ID));
    assert_eq!(copy.origin().unwrap(), Some(url("https://a.test")));

    // Second delete is a no-op on status
    copy.delete().unwrap();
    let again = destination.get_post(local).unwrap().unwrap();
    assert_eq!(again.status, PostStatus::Trash);
    assert_eq!(again.status_before_trash, post.status_before_trash);
}

#[tokio::test]
async fn test_delete_unlinked_copy_keeps_status() {
    let (origin, destination) = create_test_sites();
    let id = create_distributed_post(&origin);
    let local = insert(&destination, &payload_of(&origin, id)).await.unwrap();

    let mut copy = IncomingPost::from_post(&destination, &ReferenceSideloader, local).unwrap();
    copy.set_unlinked(true).await.unwrap();
    copy.delete().unwrap();

    let post = destination.get_post(local).unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Draft);
    assert!(!post.meta.contains_key(INCOMING_PAYLOAD));
    assert_eq!(post.meta_value(UNLINKED), Some(&json!(true)));
}

#[tokio::test]
async fn test_author_is_ingested_on_insert() {
    let (origin, destination) = create_test_sites();
    let author = origin
        .insert_user(NewUser {
            login: "jane".into(),
            email: "jane@a.test".into(),
            role: "author".into(),
            profile: UserProfile {
                display_name: Some("Jane".into()),
                ..Default::default()
            },
        })
        .unwrap();
    origin
        .update_user_meta(author, "newspack_job_title", json!("Reporter"))
        .unwrap();
    let id = create_distributed_post(&origin);
    origin
        .update_post(
            id,
            PostUpdate {
                author: Some(author),
                ..Default::default()
            },
        )
        .unwrap();

    let ingestor = AuthorIngestor::new(Arc::new(ReferenceSideloader));
    let local = IncomingPost::new(&destination, &ReferenceSideloader, &payload_of(&origin, id))
        .unwrap()
        .with_listener(&ingestor)
        .insert()
        .await
        .unwrap();

    let copy = destination.get_post(local).unwrap().unwrap();
    let local_author = destination.get_user(copy.author.unwrap()).unwrap().unwrap();
    assert_eq!(local_author.email, "jane@a.test");
    assert_eq!(local_author.meta["newspack_job_title"], json!("Reporter"));
}

#[tokio::test]
async fn test_persistent_destination() {
    let temp_dir = TempDir::new().unwrap();
    let config = RedbStorageConfig::in_dir(temp_dir.path());
    let (origin, _) = create_test_sites();
    let id = create_distributed_post(&origin);
    let payload = payload_of(&origin, id);

    let local = {
        let destination = RedbSite::open(url("https://b.test"), config.clone()).unwrap();
        insert(&destination, &payload).await.unwrap()
    };

    let destination = RedbSite::open(url("https://b.test"), config).unwrap();
    assert_eq!(insert(&destination, &payload).await.unwrap(), local);
    assert_eq!(destination.list_posts().unwrap(), vec![local]);
}
