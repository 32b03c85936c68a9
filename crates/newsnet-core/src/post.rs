//! Local site records: posts, terms, attachments, users

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Multi-value post or user meta, keyed by meta key
pub type MetaMap = BTreeMap<String, Vec<Value>>;

macro_rules! local_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

local_id!(
    /// Site-local post ID (not portable across sites)
    PostId
);
local_id!(
    /// Site-local user ID
    UserId
);
local_id!(
    /// Site-local term ID
    TermId
);
local_id!(
    /// Site-local attachment ID
    AttachmentId
);

/// Publication status of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Publish,
    Future,
    Draft,
    Pending,
    Private,
    Trash,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Future => "future",
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Private => "private",
            Self::Trash => "trash",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(Self::Publish),
            "future" => Ok(Self::Future),
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "private" => Ok(Self::Private),
            "trash" => Ok(Self::Trash),
            other => Err(format!("unknown post status: {other}")),
        }
    }
}

/// A post as stored on the local site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: PostId,
    pub post_type: String,
    pub title: String,
    /// URL slug (`post_name`)
    pub slug: String,
    /// Raw (block markup) content
    pub content: String,
    pub excerpt: String,
    pub status: PostStatus,
    pub author: Option<UserId>,
    pub date_gmt: DateTime<Utc>,
    pub modified_gmt: DateTime<Utc>,
    #[serde(default)]
    pub meta: MetaMap,
    /// Assigned terms per taxonomy
    #[serde(default)]
    pub terms: BTreeMap<String, Vec<TermId>>,
    #[serde(default)]
    pub thumbnail: Option<AttachmentId>,
    /// Status to restore when the post leaves the trash
    #[serde(default)]
    pub status_before_trash: Option<PostStatus>,
}

impl PostRecord {
    /// First value of a meta key
    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta.get(key).and_then(|values| values.first())
    }
}

/// Fields for creating a post
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub post_type: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub status: PostStatus,
    pub author: Option<UserId>,
    pub date_gmt: DateTime<Utc>,
    pub modified_gmt: Option<DateTime<Utc>>,
}

impl NewPost {
    /// A published post of type `post` dated now
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            post_type: "post".to_string(),
            slug: slugify(&title),
            title,
            content: content.into(),
            excerpt: String::new(),
            status: PostStatus::Publish,
            author: None,
            date_gmt: Utc::now(),
            modified_gmt: None,
        }
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = excerpt.into();
        self
    }

    pub fn with_post_type(mut self, post_type: impl Into<String>) -> Self {
        self.post_type = post_type.into();
        self
    }
}

/// Partial update of a post's core fields; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<PostStatus>,
    pub author: Option<UserId>,
    pub date_gmt: Option<DateTime<Utc>>,
    /// Explicit modification time; the store stamps `now` when absent
    pub modified_gmt: Option<DateTime<Utc>>,
}

impl PostUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A registered taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub name: String,
    /// Public taxonomies are distributed with posts
    pub public: bool,
}

impl Taxonomy {
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public: true,
        }
    }

    pub fn private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public: false,
        }
    }
}

/// A term of some taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub taxonomy: String,
    pub name: String,
    pub slug: String,
}

/// Portable term reference: name and slug only, IDs stay local
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermRef {
    pub name: String,
    pub slug: String,
}

impl From<&Term> for TermRef {
    fn from(term: &Term) -> Self {
        Self {
            name: term.name.clone(),
            slug: term.slug.clone(),
        }
    }
}

/// A media attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    /// Absolute URL the attachment is served from
    pub url: String,
    /// URL the media was sideloaded from, if any
    pub source_url: Option<String>,
    pub mime_type: Option<String>,
    pub size: u64,
}

/// Fields for registering an attachment
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttachment {
    pub url: String,
    pub source_url: Option<String>,
    pub mime_type: Option<String>,
    pub size: u64,
}

/// A local user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub login: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

/// Profile properties of a user
///
/// All optional so the same type serves as a partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl UserProfile {
    /// Overlay the set fields of `other` onto `self`
    pub fn merge(&mut self, other: &UserProfile) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(display_name, first_name, last_name, description, user_url, nickname);
    }
}

/// Fields for creating a user
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub login: String,
    pub email: String,
    pub role: String,
    pub profile: UserProfile,
}

/// Derive a URL slug from a title
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut dash = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}
