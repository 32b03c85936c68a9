//! Key-value record backend
//!
//! A [`Site`](crate::Site) and an [`EventLog`](crate::EventLog) keep their
//! records as opaque bytes in a handful of named tables. Any store able to
//! get, put, delete and scan by key can host them.

use newsnet_core::StorageError;

/// Logical tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Key: post ID (u64 BE), Value: JSON PostRecord
    Posts,
    /// Key: user ID (u64 BE), Value: JSON UserRecord
    Users,
    /// Key: term ID (u64 BE), Value: JSON Term
    Terms,
    /// Key: attachment ID (u64 BE), Value: JSON Attachment
    Attachments,
    /// Key: option name, Value: JSON value
    Options,
    /// Key: sequence name, Value: last issued number (u64 BE)
    Sequences,
    /// Key: event ID (u64 BE), Value: JSON Event
    Events,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Posts,
        Table::Users,
        Table::Terms,
        Table::Attachments,
        Table::Options,
        Table::Sequences,
        Table::Events,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Posts => "posts",
            Table::Users => "users",
            Table::Terms => "terms",
            Table::Attachments => "attachments",
            Table::Options => "options",
            Table::Sequences => "sequences",
            Table::Events => "events",
        }
    }
}

/// Type alias for scan results to simplify complex type
pub type ScanResults = Vec<(Vec<u8>, Vec<u8>)>;

/// Byte-oriented table storage
pub trait RecordBackend: Send + Sync {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Returns whether a record was removed
    fn delete(&self, table: Table, key: &[u8]) -> Result<bool, StorageError>;

    /// Entries with key >= `start`, in key order, at most `limit` of them
    fn scan_from(
        &self,
        table: Table,
        start: &[u8],
        limit: Option<usize>,
    ) -> Result<ScanResults, StorageError>;

    /// Atomically issue the next number of a named sequence, starting at 1
    fn next_sequence(&self, name: &str) -> Result<u64, StorageError>;

    /// Atomically issue the next sequence number and store a record under it
    ///
    /// The record is built from the issued number, so a log entry can carry
    /// its own position. Either both the sequence and the record are
    /// written, or neither is.
    fn append_sequenced(
        &self,
        sequence: &str,
        table: Table,
        build: &dyn Fn(u64) -> Result<Vec<u8>, StorageError>,
    ) -> Result<u64, StorageError>;

    /// Every entry of a table
    fn scan_all(&self, table: Table) -> Result<ScanResults, StorageError> {
        self.scan_from(table, &[], None)
    }
}

/// Encode a numeric ID as a sortable key
pub fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Decode a numeric key
pub fn key_id(key: &[u8]) -> Option<u64> {
    key.try_into().ok().map(u64::from_be_bytes)
}
