//! [`SiteStore`] over a [`RecordBackend`]
//!
//! Records are stored as JSON because meta values are arbitrary JSON
//! shapes. Read-modify-write sequences on a single record are serialized by
//! a process-local write lock; nothing spans more than one call.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use newsnet_core::{
    Attachment, AttachmentId, MetaMap, NewAttachment, NewPost, NewUser, PostId, PostRecord,
    PostStatus, PostUpdate, SiteStore, SiteUrl, StorageError, Taxonomy, Term, TermId, UserId,
    UserProfile, UserRecord, slugify,
};

use crate::backend::{RecordBackend, Table, id_key};
use crate::error::decode;
use crate::memory::MemoryBackend;
use crate::tables::{RedbStorage, RedbStorageConfig};

/// Taxonomies registered on a fresh site
pub fn default_taxonomies() -> Vec<Taxonomy> {
    vec![
        Taxonomy::public("category"),
        Taxonomy::public("post_tag"),
        Taxonomy::public("author"),
        Taxonomy::public("post_format"),
        Taxonomy::private("nav_menu"),
    ]
}

/// A site whose state lives in a [`RecordBackend`]
pub struct Site<B: RecordBackend> {
    url: SiteUrl,
    backend: Arc<B>,
    taxonomies: RwLock<Vec<Taxonomy>>,
    write_lock: Mutex<()>,
}

impl Site<MemoryBackend> {
    /// A fresh in-memory site
    pub fn in_memory(url: SiteUrl) -> Self {
        Self::new(url, Arc::new(MemoryBackend::new()))
    }
}

impl Site<RedbStorage> {
    /// Open (or create) a persistent site
    pub fn open(url: SiteUrl, config: RedbStorageConfig) -> Result<Self, StorageError> {
        Ok(Self::new(url, Arc::new(RedbStorage::open(config)?)))
    }
}

impl<B: RecordBackend> Site<B> {
    pub fn new(url: SiteUrl, backend: Arc<B>) -> Self {
        Self {
            url,
            backend,
            taxonomies: RwLock::new(default_taxonomies()),
            write_lock: Mutex::new(()),
        }
    }

    /// The backend, for sharing with an [`EventLog`](crate::EventLog)
    pub fn backend(&self) -> Arc<B> {
        Arc::clone(&self.backend)
    }

    /// Register (or replace) a taxonomy
    pub fn register_taxonomy(&self, taxonomy: Taxonomy) {
        let mut taxonomies = self.taxonomies.write();
        taxonomies.retain(|t| t.name != taxonomy.name);
        taxonomies.push(taxonomy);
    }

    fn load<T: DeserializeOwned>(&self, table: Table, id: u64) -> Result<Option<T>, StorageError> {
        self.backend
            .get(table, &id_key(id))?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(decode))
            .transpose()
    }

    fn store<T: Serialize>(&self, table: Table, id: u64, record: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(record)?;
        self.backend.put(table, &id_key(id), &bytes)
    }

    fn load_all<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>, StorageError> {
        self.backend
            .scan_all(table)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(decode))
            .collect()
    }

    fn require_post(&self, id: PostId) -> Result<PostRecord, StorageError> {
        self.load(Table::Posts, id.0)?
            .ok_or_else(|| StorageError::not_found(format!("post {id}")))
    }

    fn require_user(&self, id: UserId) -> Result<UserRecord, StorageError> {
        self.load(Table::Users, id.0)?
            .ok_or_else(|| StorageError::not_found(format!("user {id}")))
    }

    /// Load, mutate and store one post under the write lock
    fn modify_post<R>(
        &self,
        id: PostId,
        f: impl FnOnce(&mut PostRecord) -> R,
    ) -> Result<R, StorageError> {
        let _guard = self.write_lock.lock();
        let mut post = self.require_post(id)?;
        let result = f(&mut post);
        self.store(Table::Posts, id.0, &post)?;
        Ok(result)
    }

    fn modify_user(
        &self,
        id: UserId,
        f: impl FnOnce(&mut UserRecord),
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let mut user = self.require_user(id)?;
        f(&mut user);
        self.store(Table::Users, id.0, &user)
    }

    fn option_key(key: &str) -> Vec<u8> {
        key.as_bytes().to_vec()
    }
}

impl<B: RecordBackend> SiteStore for Site<B> {
    fn site_url(&self) -> &SiteUrl {
        &self.url
    }

    fn get_post(&self, id: PostId) -> Result<Option<PostRecord>, StorageError> {
        self.load(Table::Posts, id.0)
    }

    #[instrument(skip(self, post), fields(site = %self.url, title = %post.title))]
    fn insert_post(&self, post: NewPost) -> Result<PostId, StorageError> {
        let id = PostId(self.backend.next_sequence("post")?);
        let slug = if post.slug.is_empty() {
            slugify(&post.title)
        } else {
            post.slug
        };
        let record = PostRecord {
            id,
            post_type: post.post_type,
            title: post.title,
            slug,
            content: post.content,
            excerpt: post.excerpt,
            status: post.status,
            author: post.author,
            date_gmt: post.date_gmt,
            modified_gmt: post.modified_gmt.unwrap_or_else(Utc::now),
            meta: MetaMap::new(),
            terms: Default::default(),
            thumbnail: None,
            status_before_trash: None,
        };
        self.store(Table::Posts, id.0, &record)?;
        debug!(post_id = %id, "Inserted post");
        Ok(id)
    }

    fn update_post(&self, id: PostId, update: PostUpdate) -> Result<(), StorageError> {
        self.modify_post(id, |post| {
            if let Some(title) = update.title {
                post.title = title;
            }
            if let Some(slug) = update.slug {
                post.slug = slug;
            }
            if let Some(content) = update.content {
                post.content = content;
            }
            if let Some(excerpt) = update.excerpt {
                post.excerpt = excerpt;
            }
            if let Some(status) = update.status {
                if status == PostStatus::Trash && post.status != PostStatus::Trash {
                    post.status_before_trash = Some(post.status);
                }
                post.status = status;
            }
            if let Some(author) = update.author {
                post.author = Some(author);
            }
            if let Some(date) = update.date_gmt {
                post.date_gmt = date;
            }
            post.modified_gmt = update.modified_gmt.unwrap_or_else(Utc::now);
        })
    }

    fn trash_post(&self, id: PostId) -> Result<bool, StorageError> {
        self.modify_post(id, |post| {
            if post.status == PostStatus::Trash {
                return false;
            }
            post.status_before_trash = Some(post.status);
            post.status = PostStatus::Trash;
            true
        })
    }

    fn untrash_post(&self, id: PostId) -> Result<bool, StorageError> {
        self.modify_post(id, |post| {
            if post.status != PostStatus::Trash {
                return false;
            }
            post.status = post.status_before_trash.take().unwrap_or(PostStatus::Draft);
            true
        })
    }

    fn list_posts(&self) -> Result<Vec<PostId>, StorageError> {
        Ok(self
            .load_all::<PostRecord>(Table::Posts)?
            .into_iter()
            .map(|p| p.id)
            .collect())
    }

    fn find_posts_by_meta(&self, key: &str, value: &Value) -> Result<Vec<PostId>, StorageError> {
        Ok(self
            .load_all::<PostRecord>(Table::Posts)?
            .into_iter()
            .filter(|p| p.meta.get(key).is_some_and(|values| values.contains(value)))
            .map(|p| p.id)
            .collect())
    }

    fn get_post_meta(&self, id: PostId) -> Result<MetaMap, StorageError> {
        Ok(self.require_post(id)?.meta)
    }

    fn update_post_meta(&self, id: PostId, key: &str, value: Value) -> Result<(), StorageError> {
        self.modify_post(id, |post| {
            post.meta.insert(key.to_string(), vec![value]);
        })
    }

    fn add_post_meta(&self, id: PostId, key: &str, value: Value) -> Result<(), StorageError> {
        self.modify_post(id, |post| {
            post.meta.entry(key.to_string()).or_default().push(value);
        })
    }

    fn delete_post_meta(&self, id: PostId, key: &str) -> Result<(), StorageError> {
        self.modify_post(id, |post| {
            post.meta.remove(key);
        })
    }

    fn taxonomies(&self, _post_type: &str) -> Result<Vec<Taxonomy>, StorageError> {
        Ok(self.taxonomies.read().clone())
    }

    fn get_post_terms(&self, id: PostId, taxonomy: &str) -> Result<Vec<Term>, StorageError> {
        let post = self.require_post(id)?;
        let mut terms = Vec::new();
        for term_id in post.terms.get(taxonomy).into_iter().flatten() {
            if let Some(term) = self.load::<Term>(Table::Terms, term_id.0)? {
                terms.push(term);
            }
        }
        Ok(terms)
    }

    fn find_or_create_term(
        &self,
        taxonomy: &str,
        name: &str,
        slug: &str,
    ) -> Result<Term, StorageError> {
        let _guard = self.write_lock.lock();
        let existing = self
            .load_all::<Term>(Table::Terms)?
            .into_iter()
            .find(|t| t.taxonomy == taxonomy && t.name == name);
        if let Some(term) = existing {
            return Ok(term);
        }

        let term = Term {
            id: TermId(self.backend.next_sequence("term")?),
            taxonomy: taxonomy.to_string(),
            name: name.to_string(),
            slug: if slug.is_empty() {
                slugify(name)
            } else {
                slug.to_string()
            },
        };
        self.store(Table::Terms, term.id.0, &term)?;
        debug!(taxonomy, name, term_id = %term.id, "Created term");
        Ok(term)
    }

    fn set_post_terms(
        &self,
        id: PostId,
        taxonomy: &str,
        terms: &[TermId],
    ) -> Result<(), StorageError> {
        self.modify_post(id, |post| {
            if terms.is_empty() {
                post.terms.remove(taxonomy);
            } else {
                post.terms.insert(taxonomy.to_string(), terms.to_vec());
            }
        })
    }

    fn insert_attachment(&self, attachment: NewAttachment) -> Result<AttachmentId, StorageError> {
        let id = AttachmentId(self.backend.next_sequence("attachment")?);
        let record = Attachment {
            id,
            url: attachment.url,
            source_url: attachment.source_url,
            mime_type: attachment.mime_type,
            size: attachment.size,
        };
        self.store(Table::Attachments, id.0, &record)?;
        Ok(id)
    }

    fn get_attachment(&self, id: AttachmentId) -> Result<Option<Attachment>, StorageError> {
        self.load(Table::Attachments, id.0)
    }

    fn set_thumbnail(
        &self,
        id: PostId,
        attachment: Option<AttachmentId>,
    ) -> Result<(), StorageError> {
        self.modify_post(id, |post| post.thumbnail = attachment)
    }

    fn get_user(&self, id: UserId) -> Result<Option<UserRecord>, StorageError> {
        self.load(Table::Users, id.0)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StorageError> {
        let email = email.trim();
        Ok(self
            .load_all::<UserRecord>(Table::Users)?
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    fn insert_user(&self, user: NewUser) -> Result<UserId, StorageError> {
        let _guard = self.write_lock.lock();
        let users = self.load_all::<UserRecord>(Table::Users)?;

        let base_login = if user.login.is_empty() {
            user.email.split('@').next().unwrap_or("user").to_string()
        } else {
            user.login
        };
        let mut login = base_login.clone();
        let mut suffix = 2;
        while users.iter().any(|u| u.login == login) {
            login = format!("{base_login}{suffix}");
            suffix += 1;
        }

        let id = UserId(self.backend.next_sequence("user")?);
        let record = UserRecord {
            id,
            login,
            email: user.email.trim().to_string(),
            role: user.role,
            profile: user.profile,
            meta: Default::default(),
        };
        self.store(Table::Users, id.0, &record)?;
        debug!(user_id = %id, "Inserted user");
        Ok(id)
    }

    fn update_user_profile(&self, id: UserId, profile: &UserProfile) -> Result<(), StorageError> {
        self.modify_user(id, |user| user.profile.merge(profile))
    }

    fn update_user_meta(&self, id: UserId, key: &str, value: Value) -> Result<(), StorageError> {
        self.modify_user(id, |user| {
            user.meta.insert(key.to_string(), value);
        })
    }

    fn get_option(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.backend
            .get(Table::Options, &Self::option_key(key))?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(decode))
            .transpose()
    }

    fn update_option(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&value)?;
        self.backend.put(Table::Options, &Self::option_key(key), &bytes)
    }

    fn delete_option(&self, key: &str) -> Result<(), StorageError> {
        self.backend.delete(Table::Options, &Self::option_key(key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::{MemorySite, RedbSite};

    fn site() -> MemorySite {
        MemorySite::in_memory(SiteUrl::parse("https://a.test").unwrap())
    }

    #[test]
    fn test_post_crud() {
        let site = site();
        let id = site.insert_post(NewPost::new("Hello World", "body")).unwrap();

        let post = site.get_post(id).unwrap().unwrap();
        assert_eq!(post.slug, "hello-world");
        assert_eq!(post.status, PostStatus::Publish);

        site.update_post(
            id,
            PostUpdate {
                title: Some("Changed".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(site.get_post(id).unwrap().unwrap().title, "Changed");

        let missing = site.update_post(PostId(999), PostUpdate::default());
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_trash_and_untrash() {
        let site = site();
        let id = site
            .insert_post(NewPost::new("T", "").with_status(PostStatus::Pending))
            .unwrap();

        assert!(site.trash_post(id).unwrap());
        assert!(!site.trash_post(id).unwrap());
        assert_eq!(site.get_post(id).unwrap().unwrap().status, PostStatus::Trash);

        assert!(site.untrash_post(id).unwrap());
        assert_eq!(site.get_post(id).unwrap().unwrap().status, PostStatus::Pending);
        assert!(!site.untrash_post(id).unwrap());
    }

    #[test]
    fn test_meta_single_and_multi() {
        let site = site();
        let id = site.insert_post(NewPost::new("M", "")).unwrap();

        site.update_post_meta(id, "single", json!("a")).unwrap();
        site.update_post_meta(id, "single", json!("b")).unwrap();
        site.add_post_meta(id, "multi", json!(1)).unwrap();
        site.add_post_meta(id, "multi", json!(2)).unwrap();

        let meta = site.get_post_meta(id).unwrap();
        assert_eq!(meta["single"], vec![json!("b")]);
        assert_eq!(meta["multi"], vec![json!(1), json!(2)]);

        site.delete_post_meta(id, "multi").unwrap();
        assert!(site.get_post_meta_values(id, "multi").unwrap().is_empty());
        assert_eq!(site.get_post_meta_single(id, "single").unwrap(), Some(json!("b")));
    }

    #[test]
    fn test_find_posts_by_meta() {
        let site = site();
        let a = site.insert_post(NewPost::new("A", "")).unwrap();
        let b = site.insert_post(NewPost::new("B", "")).unwrap();
        site.update_post_meta(a, "key", json!("x")).unwrap();
        site.update_post_meta(b, "key", json!("y")).unwrap();

        assert_eq!(site.find_posts_by_meta("key", &json!("x")).unwrap(), vec![a]);
        assert!(site.find_posts_by_meta("key", &json!("z")).unwrap().is_empty());
    }

    #[test]
    fn test_terms_find_or_create() {
        let site = site();
        let id = site.insert_post(NewPost::new("T", "")).unwrap();

        let news = site.find_or_create_term("category", "News", "news").unwrap();
        let again = site.find_or_create_term("category", "News", "other-slug").unwrap();
        assert_eq!(news.id, again.id);

        let tag = site.find_or_create_term("post_tag", "News", "").unwrap();
        assert_ne!(tag.id, news.id);
        assert_eq!(tag.slug, "news");

        site.set_post_terms(id, "category", &[news.id]).unwrap();
        let terms = site.get_post_terms(id, "category").unwrap();
        assert_eq!(terms, vec![news]);

        site.set_post_terms(id, "category", &[]).unwrap();
        assert!(site.get_post_terms(id, "category").unwrap().is_empty());
    }

    #[test]
    fn test_register_taxonomy() {
        let site = site();
        site.register_taxonomy(Taxonomy::public("section"));
        site.register_taxonomy(Taxonomy::private("category"));

        let taxonomies = site.taxonomies("post").unwrap();
        assert!(taxonomies.iter().any(|t| t.name == "section" && t.public));
        let category: Vec<_> = taxonomies.iter().filter(|t| t.name == "category").collect();
        assert_eq!(category.len(), 1);
        assert!(!category[0].public);
    }

    #[test]
    fn test_thumbnail() {
        let site = site();
        let id = site.insert_post(NewPost::new("T", "")).unwrap();
        let attachment = site
            .insert_attachment(NewAttachment {
                url: "https://a.test/img.jpg".into(),
                source_url: None,
                mime_type: Some("image/jpeg".into()),
                size: 10,
            })
            .unwrap();

        site.set_thumbnail(id, Some(attachment)).unwrap();
        assert_eq!(
            site.thumbnail(id).unwrap().unwrap().url,
            "https://a.test/img.jpg"
        );

        site.set_thumbnail(id, None).unwrap();
        assert!(site.thumbnail(id).unwrap().is_none());
    }

    #[test]
    fn test_users() {
        let site = site();
        let new_user = |email: &str| NewUser {
            login: String::new(),
            email: email.into(),
            role: "subscriber".into(),
            profile: UserProfile::default(),
        };

        let a = site.insert_user(new_user("reader@x.test")).unwrap();
        let b = site.insert_user(new_user("reader@y.test")).unwrap();

        assert_eq!(site.get_user(a).unwrap().unwrap().login, "reader");
        assert_eq!(site.get_user(b).unwrap().unwrap().login, "reader2");
        assert_eq!(
            site.find_user_by_email("READER@x.test").unwrap().unwrap().id,
            a
        );

        site.update_user_profile(
            a,
            &UserProfile {
                display_name: Some("Reader".into()),
                ..Default::default()
            },
        )
        .unwrap();
        site.update_user_meta(a, "k", json!(true)).unwrap();

        let user = site.get_user(a).unwrap().unwrap();
        assert_eq!(user.profile.display_name.as_deref(), Some("Reader"));
        assert_eq!(user.meta["k"], json!(true));
    }

    #[test]
    fn test_options() {
        let site = site();
        assert!(site.get_option("x").unwrap().is_none());
        site.update_option("x", json!(5)).unwrap();
        assert_eq!(site.get_option("x").unwrap(), Some(json!(5)));
        site.delete_option("x").unwrap();
        assert!(site.get_option("x").unwrap().is_none());
    }

    #[test]
    fn test_redb_site_persists() {
        let temp = TempDir::new().unwrap();
        let config = RedbStorageConfig::in_dir(temp.path());
        let url = SiteUrl::parse("https://b.test").unwrap();

        let id = {
            let site = RedbSite::open(url.clone(), config.clone()).unwrap();
            let id = site.insert_post(NewPost::new("Persisted", "x")).unwrap();
            site.update_post_meta(id, "k", json!({"nested": [1, 2]})).unwrap();
            id
        };

        let site = RedbSite::open(url, config).unwrap();
        let post = site.get_post(id).unwrap().unwrap();
        assert_eq!(post.title, "Persisted");
        assert_eq!(post.meta_value("k"), Some(&json!({"nested": [1, 2]})));
    }
}
