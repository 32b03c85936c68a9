//! Outbound user sync
//!
//! [`UserUpdateWatcher`] turns local changes of watched user fields into
//! `newspack_network_user_updated` events. Changes applied from network
//! data arrive with an ingesting [`SyncContext`] and are not sent back.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use newsnet_core::{
    ActionKind, EventDraft, EventSink, StorageError, SyncContext, UserChangeObserver, UserRecord,
};
use newsnet_distribution::author::watched_meta;

pub struct UserUpdateWatcher {
    sink: Arc<dyn EventSink>,
    site_url: newsnet_core::SiteUrl,
}

impl UserUpdateWatcher {
    pub fn new(site_url: newsnet_core::SiteUrl, sink: Arc<dyn EventSink>) -> Self {
        Self { sink, site_url }
    }

    /// Queue an update event for `user` unless `ctx` suppresses echo
    ///
    /// Returns whether an event was queued.
    pub fn user_updated(&self, ctx: SyncContext, user: &UserRecord) -> Result<bool, StorageError> {
        if ctx.suppress_echo {
            debug!(user_id = %user.id, "Suppressed echo of ingested user change");
            return Ok(false);
        }

        let prop = match serde_json::to_value(&user.profile) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => return Err(StorageError::Serialization(e.to_string())),
        };
        let data = json!({
            "email": user.email,
            "role": user.role,
            "prop": prop,
            "meta": watched_meta(&user.meta),
        });

        self.sink.enqueue(EventDraft::new(
            ActionKind::UserUpdated,
            self.site_url.clone(),
            data,
        ))?;
        debug!(user_id = %user.id, "Queued user update");
        Ok(true)
    }
}

impl UserChangeObserver for UserUpdateWatcher {
    fn user_changed(&self, ctx: SyncContext, user: &UserRecord) -> Result<(), StorageError> {
        self.user_updated(ctx, user).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use parking_lot::Mutex;

    use newsnet_core::{SiteUrl, UserId, UserProfile};

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<EventDraft>>);

    impl EventSink for RecordingSink {
        fn enqueue(&self, draft: EventDraft) -> Result<(), StorageError> {
            self.0.lock().push(draft);
            Ok(())
        }
    }

    fn create_test_user() -> UserRecord {
        let mut meta = BTreeMap::new();
        meta.insert("twitter".to_string(), json!("@jo"));
        meta.insert("session_tokens".to_string(), json!(["secret"]));
        UserRecord {
            id: UserId(5),
            login: "jo".into(),
            email: "jo@example.com".into(),
            role: "author".into(),
            profile: UserProfile {
                display_name: Some("Jo".into()),
                ..UserProfile::default()
            },
            meta,
        }
    }

    #[test]
    fn test_local_change_is_queued_with_watched_fields() {
        let sink = Arc::new(RecordingSink::default());
        let watcher = UserUpdateWatcher::new(SiteUrl::parse("https://a.test").unwrap(), sink.clone());

        assert!(watcher.user_updated(SyncContext::local(), &create_test_user()).unwrap());

        let queued = sink.0.lock();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].action, ActionKind::UserUpdated);
        assert_eq!(queued[0].data["prop"], json!({"display_name": "Jo"}));
        assert_eq!(queued[0].data["meta"], json!({"twitter": "@jo"}));
    }

    #[test]
    fn test_ingested_change_is_not_echoed() {
        let sink = Arc::new(RecordingSink::default());
        let watcher = UserUpdateWatcher::new(SiteUrl::parse("https://a.test").unwrap(), sink.clone());

        watcher
            .user_changed(SyncContext::ingesting(), &create_test_user())
            .unwrap();
        assert!(sink.0.lock().is_empty());
    }
}
