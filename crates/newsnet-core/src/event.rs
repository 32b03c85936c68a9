//! Hub event log entries

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::site::SiteUrl;

/// Actions carried by the Hub event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActionKind {
    /// A reader account was created on a site
    ReaderRegistered,
    /// Watched profile fields of a user changed
    UserUpdated,
    /// A WooCommerce membership changed state
    MembershipUpdated,
    /// A WooCommerce order changed (Hub dashboards only)
    OrderChanged,
    /// A WooCommerce subscription changed (Hub dashboards only)
    SubscriptionChanged,
    /// The Hub's list of network sites changed
    NodesSynced,
    /// A distributed post was created or updated on its origin
    PostUpdated,
    /// A distributed post was trashed or deleted on its origin
    PostDeleted,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        Self::ReaderRegistered,
        Self::UserUpdated,
        Self::MembershipUpdated,
        Self::OrderChanged,
        Self::SubscriptionChanged,
        Self::NodesSynced,
        Self::PostUpdated,
        Self::PostDeleted,
    ];

    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReaderRegistered => "reader_registered",
            Self::UserUpdated => "newspack_network_user_updated",
            Self::MembershipUpdated => "newspack_network_woo_membership_updated",
            Self::OrderChanged => "newspack_node_order_changed",
            Self::SubscriptionChanged => "newspack_node_subscription_changed",
            Self::NodesSynced => "network_nodes_synced",
            Self::PostUpdated => "network_post_updated",
            Self::PostDeleted => "network_post_deleted",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = EventDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| EventDecodeError::UnknownAction(s.to_string()))
    }
}

impl TryFrom<String> for ActionKind {
    type Error = EventDecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActionKind> for String {
    fn from(value: ActionKind) -> Self {
        value.as_str().to_string()
    }
}

/// Why a wire event could not be decoded
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventDecodeError {
    #[error("Event is missing field `{0}`")]
    MissingField(&'static str),

    #[error("Event field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

/// One entry of the Hub event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic log position, assigned by the Hub
    pub id: u64,
    pub action: ActionKind,
    /// Origin site
    pub site: SiteUrl,
    /// Action-specific body
    pub data: Value,
    /// Unix seconds at which the origin recorded the event
    pub timestamp: i64,
}

impl Event {
    /// Decode one event of a pull response
    ///
    /// Every one of `id`, `action`, `site`, `data` and `timestamp` must be
    /// present. IDs and timestamps are accepted as numbers or numeric
    /// strings.
    pub fn from_wire(value: &Value) -> Result<Self, EventDecodeError> {
        let field = |name: &'static str| -> Result<&Value, EventDecodeError> {
            value
                .get(name)
                .filter(|v| !v.is_null())
                .ok_or(EventDecodeError::MissingField(name))
        };

        let action = field("action")?;
        let site = field("site")?;
        let data = field("data")?;
        let timestamp = field("timestamp")?;
        let id = field("id")?;

        let action = action
            .as_str()
            .ok_or(EventDecodeError::InvalidField {
                field: "action",
                reason: "not a string".into(),
            })?
            .parse()?;
        let site = site
            .as_str()
            .and_then(|s| SiteUrl::parse(s).ok())
            .ok_or_else(|| EventDecodeError::InvalidField {
                field: "site",
                reason: format!("not a site URL: {site}"),
            })?;

        Ok(Self {
            id: wire_integer(id, "id")? as u64,
            action,
            site,
            data: data.clone(),
            timestamp: wire_integer(timestamp, "timestamp")?,
        })
    }
}

fn wire_integer(value: &Value, field: &'static str) -> Result<i64, EventDecodeError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed
        .filter(|n| *n >= 0)
        .ok_or_else(|| EventDecodeError::InvalidField {
            field,
            reason: format!("not a non-negative integer: {value}"),
        })
}

/// An event before the Hub assigns it a log position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub action: ActionKind,
    pub site: SiteUrl,
    pub data: Value,
    #[serde(default = "now_timestamp")]
    pub timestamp: i64,
}

fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

impl EventDraft {
    /// Create a draft stamped with the current time
    pub fn new(action: ActionKind, site: SiteUrl, data: Value) -> Self {
        Self {
            action,
            site,
            data,
            timestamp: now_timestamp(),
        }
    }

    /// Assign a log position
    pub fn into_event(self, id: u64) -> Event {
        Event {
            id,
            action: self.action,
            site: self.site,
            data: self.data,
            timestamp: self.timestamp,
        }
    }
}
