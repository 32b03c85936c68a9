//! Error types for the Newspack Network protocol

use thiserror::Error;

/// Errors raised by a [`SiteStore`](crate::SiteStore) backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StorageError {
    /// Create a new NotFound error
    pub fn not_found(item: impl Into<String>) -> Self {
        Self::NotFound(item.into())
    }

    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Protocol-level errors of content distribution
///
/// None of the payload-level variants are transient: they say the payload
/// does not apply to this site, so callers must not retry them.
#[derive(Debug, Error)]
pub enum DistributionError {
    /// Payload is structurally invalid, or the post cannot be distributed
    #[error("Invalid post: {0}")]
    InvalidPost(String),

    /// Payload carries an empty destination list
    #[error("Post is not distributed to any site")]
    NotDistributed,

    /// Local site is not among the payload destinations
    #[error("Post is not distributed to {0}")]
    NotDistributedToSite(String),

    /// Stored payload is newer than the incoming one
    #[error("Incoming payload modified at {incoming} is older than stored revision from {stored}")]
    OldModifiedDate { stored: String, incoming: String },

    /// Payload targets a different network post than the local copy
    #[error("Payload network post ID {incoming} does not match local {local}")]
    MismatchedPostId { local: String, incoming: String },

    /// The local post could not be written
    #[error("Failed to insert post: {0}")]
    InsertError(String),

    /// An argument does not name a usable object
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Distribution list names a site outside the network
    #[error("Invalid distribution: {0}")]
    InvalidDistribution(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DistributionError {
    /// Stable machine-readable code, as returned over REST and the CLI
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPost(_) => "invalid_post",
            Self::NotDistributed => "not_distributed",
            Self::NotDistributedToSite(_) => "not_distributed_to_site",
            Self::OldModifiedDate { .. } => "old_modified_date",
            Self::MismatchedPostId { .. } => "mismatched_post_id",
            Self::InsertError(_) => "insert_error",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidDistribution(_) => "invalid_distribution",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Whether the failure may succeed on a later attempt
    ///
    /// Only storage faults qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub fn invalid_post(message: impl Into<String>) -> Self {
        Self::InvalidPost(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Result type alias for distribution operations
pub type DistributionResult<T> = Result<T, DistributionError>;
