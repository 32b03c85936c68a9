//! HTTP routes
//!
//! Every site serves `distribute` and the Distributor `link` route. The
//! Hub adds `pull` and `webhook`; Nodes add `pull-now`.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

use newsnet_core::{EventDraft, PostId, StorageError, routes};
use newsnet_distribution::{
    DistributeOptions, IncomingPostListener, OutgoingPost, link_distributor_copy,
};
use newsnet_sync::{
    DistributeRequest, LinkRequest, PullReport, PullRequest, PullResponse, TOKEN_HEADER,
    WebhookResponse,
};

use crate::app::AppState;
use crate::error::{ServerError, ServerResult};

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route(routes::DISTRIBUTE, post(distribute))
        .route(routes::DISTRIBUTOR_LINK, post(link));

    if state.hub.is_some() {
        router = router
            .route(routes::PULL, post(hub_pull))
            .route(routes::WEBHOOK, post(hub_webhook));
    }
    if state.puller.is_some() {
        router = router.route(routes::PULL_NOW, post(pull_now));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Check the shared network token
///
/// With no token configured, only routes that need a capability are
/// refused.
fn authorize(state: &AppState, headers: &HeaderMap, capability: bool) -> ServerResult<()> {
    let presented = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    match (&state.config.api_token, presented) {
        (Some(expected), Some(presented)) if presented == expected => Ok(()),
        (Some(_), _) => Err(ServerError::Forbidden("invalid network token".into())),
        (None, _) if capability => Err(ServerError::Forbidden(
            "distribution requires a configured network token".into(),
        )),
        (None, _) => Ok(()),
    }
}

async fn health() -> &'static str {
    "OK"
}

/// POST .../content-distribution/distribute/{post_id}
async fn distribute(
    State(state): State<AppState>,
    Path(post_id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<DistributeRequest>,
) -> ServerResult<Json<Vec<String>>> {
    authorize(&state, &headers, true)?;

    let outgoing = OutgoingPost::new(state.ctx.site.as_ref(), PostId(post_id))?;
    let payload = outgoing.distribute(
        &request.urls,
        state.sink.as_ref(),
        &DistributeOptions {
            status_on_create: request.status_on_create,
        },
    )?;
    Ok(Json(payload.sites.into_iter().map(String::from).collect()))
}

/// POST .../distributor-migrator/link/{post_id}
async fn link(
    State(state): State<AppState>,
    Path(post_id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<LinkRequest>,
) -> ServerResult<Json<Value>> {
    authorize(&state, &headers, false)?;

    let ctx = &state.ctx;
    let linked = link_distributor_copy(
        ctx.site.as_ref(),
        ctx.sideloader.as_ref(),
        PostId(post_id),
        &request.subscription_signature,
        &request.payload,
        &[ctx.authors.as_ref() as &dyn IncomingPostListener],
    )
    .await?;
    info!(post_id = %linked, "Linked Distributor copy");
    Ok(Json(json!({ "post_id": linked.0 })))
}

/// POST .../pull-now
async fn pull_now(State(state): State<AppState>, headers: HeaderMap) -> ServerResult<Json<PullReport>> {
    authorize(&state, &headers, false)?;
    let puller = state
        .puller
        .as_ref()
        .ok_or_else(|| ServerError::NotFound("not a node".into()))?;
    Ok(Json(puller.pull().await?))
}

/// POST .../pull
async fn hub_pull(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PullRequest>,
) -> ServerResult<Json<PullResponse>> {
    authorize(&state, &headers, false)?;
    let hub = state
        .hub
        .as_ref()
        .ok_or_else(|| ServerError::NotFound("not the hub".into()))?;

    let data = hub
        .pull(&request)?
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(Json(PullResponse { data }))
}

/// POST .../webhook
async fn hub_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<EventDraft>,
) -> ServerResult<Json<WebhookResponse>> {
    authorize(&state, &headers, false)?;
    let hub = state
        .hub
        .as_ref()
        .ok_or_else(|| ServerError::NotFound("not the hub".into()))?;

    let event = hub.receive(draft).await?;
    Ok(Json(WebhookResponse { id: event.id }))
}
