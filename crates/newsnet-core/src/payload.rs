//! Payload codec
//!
//! A [`Payload`] is the self-describing wire form of one distributed post
//! revision. Decoding and validation are pure: they never touch site state.
//!
//! Validation rules, applied in order:
//!
//! 1. Missing `post_id`, `network_post_id`, `sites` or `post_data`, or any
//!    field of the wrong shape: `invalid_post`
//! 2. Empty `sites`: `not_distributed`
//! 3. Local site not in `sites`: `not_distributed_to_site`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DistributionError, DistributionResult};
use crate::network_id::NetworkPostId;
use crate::post::{MetaMap, PostId, PostStatus, TermRef, UserProfile};
use crate::site::SiteUrl;

/// Current payload format version
pub const PAYLOAD_VERSION: u32 = 1;

/// Top-level fields whose absence makes a payload structurally invalid
pub const REQUIRED_FIELDS: &[&str] = &["post_id", "network_post_id", "sites", "post_data"];

fn default_version() -> u32 {
    PAYLOAD_VERSION
}

/// Wire format for one distributed post revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Origin site
    pub site_url: SiteUrl,
    /// Origin-local post ID
    pub post_id: PostId,
    pub network_post_id: NetworkPostId,
    /// Destination allow-list
    pub sites: Vec<SiteUrl>,
    pub post_data: PostData,
    /// Status for a newly created copy; only set by the migration path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_on_create: Option<PostStatus>,
}

/// Distributable state of a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostData {
    pub title: String,
    #[serde(with = "crate::wp_date")]
    pub date_gmt: DateTime<Utc>,
    #[serde(with = "crate::wp_date")]
    pub modified_gmt: DateTime<Utc>,
    pub slug: String,
    pub post_type: String,
    /// Block markup as stored on the origin
    pub raw_content: String,
    /// Rendered content with embeds left as bare URLs
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    pub post_status: PostStatus,
    /// Public taxonomy terms, by taxonomy name
    #[serde(default)]
    pub taxonomy: BTreeMap<String, Vec<TermRef>>,
    /// Absolute URL of the featured image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub post_meta: MetaMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<DistributedAuthor>,
}

/// Author identity carried by a payload
///
/// The wire tag is `wp_user` or `guest_author`; the legacy spelling
/// `guest-author` is accepted on decode and never emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributedAuthor {
    WpUser(AuthorProfile),
    #[serde(alias = "guest-author")]
    GuestAuthor(AuthorProfile),
}

impl DistributedAuthor {
    pub fn profile(&self) -> &AuthorProfile {
        match self {
            Self::WpUser(profile) | Self::GuestAuthor(profile) => profile,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Self::GuestAuthor(_))
    }
}

/// Profile fields of a distributed author
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorProfile {
    /// Cross-site identity key
    pub email: String,
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

impl Payload {
    /// Decode a payload, checking structure only
    pub fn decode(value: &Value) -> DistributionResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| DistributionError::invalid_post("payload is not an object"))?;

        for field in REQUIRED_FIELDS {
            if object.get(*field).is_none_or(Value::is_null) {
                return Err(DistributionError::invalid_post(format!(
                    "missing field `{field}`"
                )));
            }
        }

        let payload: Payload = serde_json::from_value(value.clone())
            .map_err(|e| DistributionError::invalid_post(e.to_string()))?;

        if payload.version > PAYLOAD_VERSION {
            return Err(DistributionError::invalid_post(format!(
                "unsupported payload version {}",
                payload.version
            )));
        }

        Ok(payload)
    }

    /// Check that this payload applies to `site`
    pub fn validate_for(&self, site: &SiteUrl) -> DistributionResult<()> {
        if self.sites.is_empty() {
            return Err(DistributionError::NotDistributed);
        }
        if !self.sites.contains(site) {
            return Err(DistributionError::NotDistributedToSite(site.to_string()));
        }
        Ok(())
    }

    /// Encode to a JSON value
    pub fn to_value(&self) -> DistributionResult<Value> {
        serde_json::to_value(self).map_err(|e| DistributionError::invalid_post(e.to_string()))
    }

    pub fn modified_gmt(&self) -> DateTime<Utc> {
        self.post_data.modified_gmt
    }
}

/// Decode and validate a payload for the local site in one step
pub fn validate_payload(value: &Value, site: &SiteUrl) -> DistributionResult<Payload> {
    let payload = Payload::decode(value)?;
    payload.validate_for(site)?;
    Ok(payload)
}
