//! Error types for distribution
//!
//! Protocol failures use [`DistributionError`] from newsnet-core. The
//! Distributor migrator adds the failures of talking to destinations.

use thiserror::Error;

pub use newsnet_core::{DistributionError, DistributionResult};

/// Failure to link a copy on a destination site
#[derive(Debug, Error)]
pub enum LinkError {
    /// The destination answered with an error status
    #[error("Destination rejected link ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The destination could not be reached
    #[error("Link transport error: {0}")]
    Transport(String),
}

/// Errors raised by the Distributor migrator
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Linking post on {target} failed: {source}")]
    Link {
        target: String,
        #[source]
        source: LinkError,
    },

    /// The legacy subscription meta cannot be read
    #[error("Malformed Distributor subscription on post {post_id}: {reason}")]
    MalformedSubscription { post_id: u64, reason: String },

    #[error("Post {0} has no Distributor subscriptions")]
    NoSubscriptions(u64),
}

impl From<newsnet_core::StorageError> for MigrationError {
    fn from(err: newsnet_core::StorageError) -> Self {
        Self::Distribution(err.into())
    }
}

/// Result type alias for migrations
pub type MigrationResult<T> = Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::Link {
            target: "https://b.test".into(),
            source: LinkError::Rejected {
                status: 400,
                message: "invalid_post".into(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("https://b.test"));
        assert!(text.contains("400"));

        let err = MigrationError::from(newsnet_core::StorageError::io("disk"));
        assert!(matches!(err, MigrationError::Distribution(_)));
    }
}
