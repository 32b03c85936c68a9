//! Handlers for each Hub action a site applies

mod membership;
mod nodes;
mod posts;
mod users;

pub use membership::MembershipUpdated;
pub use nodes::NodesSynced;
pub use posts::{PostDeleted, PostUpdated};
pub use users::{ReaderRegistered, UserUpdated};

use serde_json::Value;

use newsnet_core::Event;

use crate::error::{SyncError, SyncResult};

/// Required string field of an event body
fn required_str<'a>(event: &'a Event, field: &str) -> SyncResult<&'a str> {
    event
        .data
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::invalid_event(event.action, format!("missing `{field}`")))
}

/// Required email field, checked for an `@`
fn required_email(event: &Event) -> SyncResult<&str> {
    let email = required_str(event, "email")?;
    if !email.contains('@') {
        return Err(SyncError::invalid_event(
            event.action,
            format!("not an email: {email}"),
        ));
    }
    Ok(email)
}
