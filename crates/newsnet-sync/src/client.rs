//! Hub and destination HTTP clients
//!
//! [`HubClient`] is the Node's view of the Hub: pull events after a
//! watermark and submit locally originated events. [`HttpHubClient`] talks
//! to a real Hub; [`StaticHubClient`] serves canned events in process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, instrument};

use newsnet_core::{EventDraft, PostId, SiteUrl, routes};
use newsnet_distribution::{LinkError, LinkTransport};

use crate::error::{SyncError, SyncResult};
use crate::protocol::{LinkRequest, PullRequest, PullResponse, WebhookResponse};

/// Header carrying the shared network token
pub const TOKEN_HEADER: &str = "x-newspack-network-token";

/// Connection to the Hub
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Fetch raw events after `request.last_processed_id`, ascending
    async fn pull(&self, request: &PullRequest) -> SyncResult<Vec<Value>>;

    /// Submit one event; returns the log position the Hub assigned
    async fn submit(&self, draft: &EventDraft) -> SyncResult<u64>;
}

fn build_client(timeout: Duration) -> SyncResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::transport(None, e.to_string()))
}

/// Map non-success statuses to a transport error carrying the body
async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::transport(Some(status.as_u16()), body))
}

fn send_error(err: reqwest::Error) -> SyncError {
    SyncError::transport(err.status().map(|s| s.as_u16()), err.to_string())
}

/// [`HubClient`] over HTTP
pub struct HttpHubClient {
    client: Client,
    hub_url: SiteUrl,
    token: Option<String>,
}

impl HttpHubClient {
    pub fn new(hub_url: SiteUrl, timeout: Duration) -> SyncResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            hub_url,
            token: None,
        })
    }

    /// Send the network token with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn hub_url(&self) -> &SiteUrl {
        &self.hub_url
    }

    fn post(&self, route: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(self.hub_url.join_path(route));
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }
}

#[async_trait]
impl HubClient for HttpHubClient {
    #[instrument(skip(self, request), fields(hub = %self.hub_url, after = request.last_processed_id))]
    async fn pull(&self, request: &PullRequest) -> SyncResult<Vec<Value>> {
        let response = self
            .post(routes::PULL)
            .json(request)
            .send()
            .await
            .map_err(send_error)?;
        let body: PullResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Decode(e.to_string()))?;
        debug!(events = body.data.len(), "Pulled events");
        Ok(body.data)
    }

    #[instrument(skip(self, draft), fields(hub = %self.hub_url, action = %draft.action))]
    async fn submit(&self, draft: &EventDraft) -> SyncResult<u64> {
        let response = self
            .post(routes::WEBHOOK)
            .json(draft)
            .send()
            .await
            .map_err(send_error)?;
        let body: WebhookResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Decode(e.to_string()))?;
        Ok(body.id)
    }
}

/// [`LinkTransport`] calling the `distributor-migrator/link` route of each
/// destination
pub struct HttpLinkTransport {
    client: Client,
    token: Option<String>,
}

impl HttpLinkTransport {
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl LinkTransport for HttpLinkTransport {
    async fn link(
        &self,
        target: &SiteUrl,
        remote_post_id: PostId,
        signature: &str,
        payload: &Value,
    ) -> Result<(), LinkError> {
        let url = target.join_path(&routes::with_post_id(
            routes::DISTRIBUTOR_LINK,
            remote_post_id.0,
        ));
        let mut request = self.client.post(url).json(&LinkRequest {
            subscription_signature: signature.to_string(),
            payload: payload.clone(),
        });
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(LinkError::Rejected {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }
}

/// In-process [`HubClient`] serving a fixed list of wire events
///
/// Pulls return every event whose `id` is above the watermark; events
/// without a readable `id` are always returned. Submissions are recorded.
#[derive(Default)]
pub struct StaticHubClient {
    events: Mutex<Vec<Value>>,
    submitted: Mutex<Vec<EventDraft>>,
    requests: Mutex<Vec<PullRequest>>,
    failing: AtomicBool,
}

impl StaticHubClient {
    pub fn new(events: Vec<Value>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Default::default()
        }
    }

    /// Make every call fail with a 503 until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<EventDraft> {
        self.submitted.lock().clone()
    }

    pub fn requests(&self) -> Vec<PullRequest> {
        self.requests.lock().clone()
    }

    fn check_failing(&self) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::transport(Some(503), "hub unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl HubClient for StaticHubClient {
    async fn pull(&self, request: &PullRequest) -> SyncResult<Vec<Value>> {
        self.check_failing()?;
        self.requests.lock().push(request.clone());
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|event| {
                event
                    .get("id")
                    .and_then(Value::as_u64)
                    .is_none_or(|id| id > request.last_processed_id)
            })
            .cloned()
            .collect())
    }

    async fn submit(&self, draft: &EventDraft) -> SyncResult<u64> {
        self.check_failing()?;
        let mut submitted = self.submitted.lock();
        submitted.push(draft.clone());
        Ok(submitted.len() as u64)
    }
}
