//! Error helpers for storage backends
//!
//! Backends report [`StorageError`] from newsnet-core; these helpers map
//! backend-specific failures onto it.

use std::fmt::Display;

pub use newsnet_core::StorageError;

/// Map a database failure
pub(crate) fn db<E: Display>(err: E) -> StorageError {
    StorageError::Database(err.to_string())
}

/// Map a filesystem failure
pub(crate) fn io<E: Display>(err: E) -> StorageError {
    StorageError::Io(err.to_string())
}

/// Map a record decoding failure
pub(crate) fn decode<E: Display>(err: E) -> StorageError {
    StorageError::Deserialization(err.to_string())
}
