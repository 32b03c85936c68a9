//! Media sideloading
//!
//! Distributed posts reference their featured image by URL. A destination
//! either downloads it into its own [`BlobStore`] or, where no upload
//! directory is configured, just records the remote URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use newsnet_core::{AttachmentId, MediaSideloader, NewAttachment, SiteStore, StorageError};

use crate::blobs::BlobStore;
use crate::error::io;

/// Public path prefix of sideloaded files
pub const UPLOADS_PATH: &str = "wp-content/uploads/newsnet";

/// Downloads media over HTTP into a [`BlobStore`]
pub struct HttpSideloader {
    client: reqwest::Client,
    blobs: Arc<BlobStore>,
}

impl HttpSideloader {
    pub fn new(blobs: Arc<BlobStore>, timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(io)?;
        Ok(Self { client, blobs })
    }
}

#[async_trait]
impl MediaSideloader for HttpSideloader {
    #[instrument(skip(self, site), fields(site = %site.site_url()))]
    async fn sideload(&self, site: &dyn SiteStore, url: &str) -> Result<AttachmentId, StorageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(io)?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .or_else(|| mime_from_path(url).map(str::to_string));
        let body = response.bytes().await.map_err(io)?;

        let content_ref = self.blobs.put(&body).await?;
        let local_url = site
            .site_url()
            .join_path(&format!("{UPLOADS_PATH}/{}", self.blobs.relative_path(&content_ref)));

        let id = site.insert_attachment(NewAttachment {
            url: local_url,
            source_url: Some(url.to_string()),
            mime_type,
            size: content_ref.size,
        })?;
        debug!(attachment_id = %id, hash = %content_ref.short(), "Sideloaded media");
        Ok(id)
    }
}

/// Registers the remote URL as the attachment without downloading it
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceSideloader;

#[async_trait]
impl MediaSideloader for ReferenceSideloader {
    async fn sideload(&self, site: &dyn SiteStore, url: &str) -> Result<AttachmentId, StorageError> {
        site.insert_attachment(NewAttachment {
            url: url.to_string(),
            source_url: Some(url.to_string()),
            mime_type: mime_from_path(url).map(str::to_string),
            size: 0,
        })
    }
}

fn mime_from_path(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "avif" => Some("image/avif"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}
