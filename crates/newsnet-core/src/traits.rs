//! Core traits
//!
//! - [`SiteStore`]: the local site state every protocol step reads and writes
//! - [`MediaSideloader`]: fetches remote media into a site
//! - [`EventSink`]: queues locally originated events for the Hub
//! - [`UserChangeObserver`]: reacts to local user changes

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::event::EventDraft;
use crate::post::{
    Attachment, AttachmentId, MetaMap, NewAttachment, NewPost, NewUser, PostId, PostRecord,
    PostUpdate, Taxonomy, Term, TermId, UserId, UserProfile, UserRecord,
};
use crate::site::SiteUrl;

/// Abstraction over one site's persistent state
///
/// Calls are synchronous and each one is applied on its own; there are no
/// multi-call transactions. Coordination between concurrent writers relies
/// on row state (meta flags and timestamps), never on locks held across
/// calls.
pub trait SiteStore: Send + Sync {
    /// Canonical URL of this site
    fn site_url(&self) -> &SiteUrl;

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    fn get_post(&self, id: PostId) -> Result<Option<PostRecord>, StorageError>;

    fn insert_post(&self, post: NewPost) -> Result<PostId, StorageError>;

    /// Apply a partial update; fails with `NotFound` for unknown posts
    fn update_post(&self, id: PostId, update: PostUpdate) -> Result<(), StorageError>;

    /// Move a post to the trash
    ///
    /// Returns `false` when the post was already trashed.
    fn trash_post(&self, id: PostId) -> Result<bool, StorageError>;

    /// Restore a trashed post to its previous status
    ///
    /// Returns `false` when the post was not in the trash.
    fn untrash_post(&self, id: PostId) -> Result<bool, StorageError>;

    /// All post IDs, ascending
    fn list_posts(&self) -> Result<Vec<PostId>, StorageError>;

    /// Posts having `key` with a value equal to `value`
    fn find_posts_by_meta(&self, key: &str, value: &Value) -> Result<Vec<PostId>, StorageError>;

    // ------------------------------------------------------------------
    // Post meta
    // ------------------------------------------------------------------

    fn get_post_meta(&self, id: PostId) -> Result<MetaMap, StorageError>;

    /// Replace every value of `key` with a single value
    fn update_post_meta(&self, id: PostId, key: &str, value: Value) -> Result<(), StorageError>;

    /// Append one more value to `key`
    fn add_post_meta(&self, id: PostId, key: &str, value: Value) -> Result<(), StorageError>;

    fn delete_post_meta(&self, id: PostId, key: &str) -> Result<(), StorageError>;

    /// All values of one meta key
    fn get_post_meta_values(&self, id: PostId, key: &str) -> Result<Vec<Value>, StorageError> {
        Ok(self.get_post_meta(id)?.remove(key).unwrap_or_default())
    }

    /// First value of one meta key
    fn get_post_meta_single(&self, id: PostId, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.get_post_meta_values(id, key)?.into_iter().next())
    }

    // ------------------------------------------------------------------
    // Taxonomies
    // ------------------------------------------------------------------

    /// Taxonomies registered for a post type
    fn taxonomies(&self, post_type: &str) -> Result<Vec<Taxonomy>, StorageError>;

    fn get_post_terms(&self, id: PostId, taxonomy: &str) -> Result<Vec<Term>, StorageError>;

    /// Find a term by name within a taxonomy, creating it if missing
    fn find_or_create_term(
        &self,
        taxonomy: &str,
        name: &str,
        slug: &str,
    ) -> Result<Term, StorageError>;

    /// Replace the post's terms in one taxonomy
    fn set_post_terms(
        &self,
        id: PostId,
        taxonomy: &str,
        terms: &[TermId],
    ) -> Result<(), StorageError>;

    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    fn insert_attachment(&self, attachment: NewAttachment) -> Result<AttachmentId, StorageError>;

    fn get_attachment(&self, id: AttachmentId) -> Result<Option<Attachment>, StorageError>;

    /// Set or clear the featured image
    fn set_thumbnail(
        &self,
        id: PostId,
        attachment: Option<AttachmentId>,
    ) -> Result<(), StorageError>;

    /// Featured image of a post, resolved
    fn thumbnail(&self, id: PostId) -> Result<Option<Attachment>, StorageError> {
        let Some(post) = self.get_post(id)? else {
            return Ok(None);
        };
        match post.thumbnail {
            Some(attachment) => self.get_attachment(attachment),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    fn get_user(&self, id: UserId) -> Result<Option<UserRecord>, StorageError>;

    /// Case-insensitive lookup by email
    fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StorageError>;

    fn insert_user(&self, user: NewUser) -> Result<UserId, StorageError>;

    /// Overlay the set fields of `profile`
    fn update_user_profile(&self, id: UserId, profile: &UserProfile) -> Result<(), StorageError>;

    fn update_user_meta(&self, id: UserId, key: &str, value: Value) -> Result<(), StorageError>;

    // ------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------

    fn get_option(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn update_option(&self, key: &str, value: Value) -> Result<(), StorageError>;

    fn delete_option(&self, key: &str) -> Result<(), StorageError>;
}

/// Fetches remote media and registers it as a local attachment
///
/// Failures are reported to the caller, which treats them as non-fatal.
#[async_trait]
pub trait MediaSideloader: Send + Sync {
    async fn sideload(
        &self,
        site: &dyn SiteStore,
        url: &str,
    ) -> Result<AttachmentId, StorageError>;
}

/// Destination of locally originated events
pub trait EventSink: Send + Sync {
    fn enqueue(&self, draft: EventDraft) -> Result<(), StorageError>;
}

/// Call-chain context of a user change
///
/// Changes applied while ingesting network data carry `suppress_echo`, so
/// observers do not send them back to the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncContext {
    pub suppress_echo: bool,
}

impl SyncContext {
    /// A change made by a local actor
    pub fn local() -> Self {
        Self {
            suppress_echo: false,
        }
    }

    /// A change applied from network data
    pub fn ingesting() -> Self {
        Self {
            suppress_echo: true,
        }
    }
}

/// Notified after a user record changes
pub trait UserChangeObserver: Send + Sync {
    fn user_changed(&self, ctx: SyncContext, user: &UserRecord) -> Result<(), StorageError>;
}
