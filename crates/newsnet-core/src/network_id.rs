//! Network post identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::post::PostId;
use crate::site::SiteUrl;

/// Stable cross-site join key for one logical post
///
/// Derived only from the origin post ID and the origin site URL, so it never
/// changes across revisions and two sites can never produce the same key
/// for different posts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkPostId(String);

impl NetworkPostId {
    /// Number of hash bytes kept in the identifier
    pub const LEN_BYTES: usize = 16;

    /// Derive the identifier for a post on its origin site
    pub fn derive(post_id: PostId, site_url: &SiteUrl) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(post_id.to_string().as_bytes());
        hasher.update(b"@");
        hasher.update(site_url.as_str().as_bytes());
        let hash = hasher.finalize();
        Self(hex::encode(&hash.as_bytes()[..Self::LEN_BYTES]))
    }

    /// Wrap an identifier received from another site
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for logs
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for NetworkPostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NetworkPostId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid network post ID: {value:?}"))
    }
}

impl From<NetworkPostId> for String {
    fn from(value: NetworkPostId) -> Self {
        value.0
    }
}
