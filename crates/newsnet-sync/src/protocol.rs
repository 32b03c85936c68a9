//! Request and response bodies of the network REST routes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use newsnet_core::{ActionKind, SiteUrl};

/// Body of a pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Watermark of the requesting Node
    pub last_processed_id: u64,
    /// Interest filter
    pub actions: Vec<ActionKind>,
    /// Requesting Node; its own events are not returned
    pub site: SiteUrl,
}

/// Pull response: raw events, decoded one by one by the Node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub data: Vec<Value>,
}

/// Webhook response carrying the assigned log position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub id: u64,
}

/// Body of the `distribute` route
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributeRequest {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_on_create: Option<newsnet_core::PostStatus>,
}

/// Body of the Distributor `link` route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    pub subscription_signature: String,
    pub payload: Value,
}

/// Error body returned by every route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pull_request_wire_shape() {
        let request = PullRequest {
            last_processed_id: 7,
            actions: vec![ActionKind::PostUpdated, ActionKind::PostDeleted],
            site: SiteUrl::parse("https://b.test/").unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "last_processed_id": 7,
                "actions": ["network_post_updated", "network_post_deleted"],
                "site": "https://b.test",
            })
        );
    }

    #[test]
    fn test_pull_response_tolerates_missing_data() {
        let response: PullResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.data.is_empty());
    }
}
