//! In-memory record backend
//!
//! Suitable for testing and simulation environments.

use std::collections::BTreeMap;
use std::ops::Bound;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use newsnet_core::StorageError;

use crate::backend::{RecordBackend, ScanResults, Table, id_key, key_id};

/// In-memory implementation of [`RecordBackend`]
///
/// Uses `DashMap` for concurrent access to each table.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: DashMap<Table, BTreeMap<Vec<u8>, Vec<u8>>>,
    /// Serializes sequence allocation
    sequence_lock: Mutex<()>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a table
    pub fn len(&self, table: Table) -> usize {
        self.tables.get(&table).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, table: Table) -> bool {
        self.len(table) == 0
    }

    fn bump_sequence(&self, name: &str) -> u64 {
        let mut sequences = self.tables.entry(Table::Sequences).or_default();
        let next = sequences
            .get(name.as_bytes())
            .and_then(|v| key_id(v))
            .unwrap_or(0)
            + 1;
        sequences.insert(name.as_bytes().to_vec(), id_key(next).to_vec());
        next
    }
}

impl RecordBackend for MemoryBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.tables.get(&table).and_then(|t| t.get(key).cloned()))
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        trace!(table = table.name(), "put");
        self.tables
            .entry(table)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self
            .tables
            .get_mut(&table)
            .map(|mut t| t.remove(key).is_some())
            .unwrap_or(false))
    }

    fn scan_from(
        &self,
        table: Table,
        start: &[u8],
        limit: Option<usize>,
    ) -> Result<ScanResults, StorageError> {
        let Some(entries) = self.tables.get(&table) else {
            return Ok(Vec::new());
        };
        let range = entries.range::<[u8], _>((Bound::Included(start), Bound::Unbounded));
        Ok(range
            .take(limit.unwrap_or(usize::MAX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn next_sequence(&self, name: &str) -> Result<u64, StorageError> {
        let _guard = self.sequence_lock.lock();
        Ok(self.bump_sequence(name))
    }

    fn append_sequenced(
        &self,
        sequence: &str,
        table: Table,
        build: &dyn Fn(u64) -> Result<Vec<u8>, StorageError>,
    ) -> Result<u64, StorageError> {
        let _guard = self.sequence_lock.lock();
        let current = self
            .get(Table::Sequences, sequence.as_bytes())?
            .and_then(|v| key_id(&v))
            .unwrap_or(0);
        let value = build(current + 1)?;
        let id = self.bump_sequence(sequence);
        self.put(table, &id_key(id), &value)?;
        Ok(id)
    }
}
