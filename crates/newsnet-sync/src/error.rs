//! Error types for the pull protocol

use thiserror::Error;

use newsnet_core::{DistributionError, EventDecodeError, StorageError};

/// Errors that can occur while syncing with the Hub
#[derive(Debug, Error)]
pub enum SyncError {
    /// The Hub or a destination site could not be reached or answered
    /// with an error status
    #[error("Transport error{}: {body}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Transport { status: Option<u16>, body: String },

    /// A response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// An event body does not fit its action
    #[error("Invalid event data for {action}: {reason}")]
    InvalidEvent { action: String, reason: String },

    #[error("Event decode error: {0}")]
    Event(#[from] EventDecodeError),

    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SyncError {
    pub fn transport(status: Option<u16>, body: impl Into<String>) -> Self {
        Self::Transport {
            status,
            body: body.into(),
        }
    }

    pub fn invalid_event(action: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure concerns the event itself rather than this site
    ///
    /// Rejected events are logged and passed over; anything else stops the
    /// pull cycle so the event is retried.
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::InvalidEvent { .. } | Self::Event(_) => true,
            Self::Distribution(e) => !e.is_retryable(),
            Self::Transport { .. } | Self::Decode(_) | Self::Storage(_) => false,
        }
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
