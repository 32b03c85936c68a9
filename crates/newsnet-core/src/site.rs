//! Site identity

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Error returned when a string is not a usable site URL
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid site URL '{input}': {reason}")]
pub struct SiteUrlError {
    pub input: String,
    pub reason: String,
}

/// Canonical base URL of a site in the network
///
/// Normalized to `scheme://host[:port][/path]` with no trailing slash,
/// query or fragment, so two spellings of the same site compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteUrl(String);

impl SiteUrl {
    /// Parse and normalize a site URL
    pub fn parse(input: &str) -> Result<Self, SiteUrlError> {
        let err = |reason: &str| SiteUrlError {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(input.trim()).map_err(|e| err(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(err("scheme must be http or https"));
        }
        let host = url.host_str().ok_or_else(|| err("missing host"))?;

        let mut normalized = format!("{}://{}", url.scheme(), host);
        if let Some(port) = url.port() {
            normalized.push_str(&format!(":{port}"));
        }
        normalized.push_str(url.path().trim_end_matches('/'));

        Ok(Self(normalized))
    }

    /// Get the normalized URL string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join an absolute path (e.g. a REST route) onto this base URL
    pub fn join_path(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for SiteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SiteUrl {
    type Error = SiteUrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SiteUrl> for String {
    fn from(value: SiteUrl) -> Self {
        value.0
    }
}

impl std::str::FromStr for SiteUrl {
    type Err = SiteUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
