//! Persistent [`RecordBackend`] on a single redb file
//!
//! Every [`Table`] maps to a redb table of raw byte keys and values; the
//! site and the Hub event log share the same file.

use std::path::PathBuf;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info, instrument};

use newsnet_core::StorageError;

use crate::backend::{RecordBackend, ScanResults, Table, id_key, key_id};
use crate::error::{db, io};

type RawTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

// Key: post ID, Value: serialized PostRecord
const POSTS: RawTable = TableDefinition::new("posts");

// Key: user ID, Value: serialized UserRecord
const USERS: RawTable = TableDefinition::new("users");

// Key: term ID, Value: serialized Term
const TERMS: RawTable = TableDefinition::new("terms");

// Key: attachment ID, Value: serialized Attachment
const ATTACHMENTS: RawTable = TableDefinition::new("attachments");

// Key: option name, Value: JSON value
const OPTIONS: RawTable = TableDefinition::new("options");

// Key: sequence name, Value: last issued number
const SEQUENCES: RawTable = TableDefinition::new("sequences");

// Key: event ID, Value: serialized Event
const EVENTS: RawTable = TableDefinition::new("events");

fn definition(table: Table) -> RawTable {
    match table {
        Table::Posts => POSTS,
        Table::Users => USERS,
        Table::Terms => TERMS,
        Table::Attachments => ATTACHMENTS,
        Table::Options => OPTIONS,
        Table::Sequences => SEQUENCES,
        Table::Events => EVENTS,
    }
}

#[derive(Debug, Clone)]
pub struct RedbStorageConfig {
    pub db_path: PathBuf,
    /// redb page cache, in bytes
    pub cache_size: usize,
}

impl Default for RedbStorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/newsnet.redb"),
            cache_size: 16 << 20,
        }
    }
}

impl RedbStorageConfig {
    /// Place the database file inside a data directory
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: data_dir.into().join("newsnet.redb"),
            ..Default::default()
        }
    }
}

/// redb-backed record store
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open the file, creating it and its directory on first use
    #[instrument(skip(config), fields(db = %config.db_path.display()))]
    pub fn open(config: RedbStorageConfig) -> Result<Self, StorageError> {
        if let Some(dir) = config.db_path.parent() {
            std::fs::create_dir_all(dir).map_err(io)?;
        }

        let db = redb::Builder::new()
            .set_cache_size(config.cache_size)
            .create(&config.db_path)
            .map_err(db)?;
        let storage = Self { db: Arc::new(db) };
        storage.ensure_tables()?;
        info!("Site database open");
        Ok(storage)
    }

    /// redb only creates a table inside a write transaction
    fn ensure_tables(&self) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(db)?;
        for table in Table::ALL {
            txn.open_table(definition(table)).map_err(db)?;
        }
        txn.commit().map_err(db)?;
        debug!(tables = Table::ALL.len(), "Tables ready");
        Ok(())
    }
}

impl RecordBackend for RedbStorage {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db)?;
        let table = read_txn.open_table(definition(table)).map_err(db)?;

        let value = table.get(key).map_err(db)?.map(|v| v.value().to_vec());

        Ok(value)
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db)?;

        {
            let mut table = write_txn.open_table(definition(table)).map_err(db)?;
            table.insert(key, value).map_err(db)?;
        }

        write_txn.commit().map_err(db)?;

        Ok(())
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<bool, StorageError> {
        let write_txn = self.db.begin_write().map_err(db)?;

        let removed = {
            let mut table = write_txn.open_table(definition(table)).map_err(db)?;
            table.remove(key).map_err(db)?.is_some()
        };

        write_txn.commit().map_err(db)?;

        Ok(removed)
    }

    fn scan_from(
        &self,
        table: Table,
        start: &[u8],
        limit: Option<usize>,
    ) -> Result<ScanResults, StorageError> {
        let read_txn = self.db.begin_read().map_err(db)?;
        let table = read_txn.open_table(definition(table)).map_err(db)?;

        let mut results = Vec::new();
        let range = table.range(start..).map_err(db)?;

        for entry in range.take(limit.unwrap_or(usize::MAX)) {
            let (key, value) = entry.map_err(db)?;
            results.push((key.value().to_vec(), value.value().to_vec()));
        }

        Ok(results)
    }

    fn next_sequence(&self, name: &str) -> Result<u64, StorageError> {
        let write_txn = self.db.begin_write().map_err(db)?;

        let next = {
            let mut table = write_txn.open_table(SEQUENCES).map_err(db)?;
            let current = table
                .get(name.as_bytes())
                .map_err(db)?
                .and_then(|v| key_id(v.value()))
                .unwrap_or(0);
            let next = current + 1;
            table
                .insert(name.as_bytes(), id_key(next).as_slice())
                .map_err(db)?;
            next
        };

        write_txn.commit().map_err(db)?;
        Ok(next)
    }

    fn append_sequenced(
        &self,
        sequence: &str,
        table: Table,
        build: &dyn Fn(u64) -> Result<Vec<u8>, StorageError>,
    ) -> Result<u64, StorageError> {
        let write_txn = self.db.begin_write().map_err(db)?;

        let id = {
            let mut sequences = write_txn.open_table(SEQUENCES).map_err(db)?;
            let current = sequences
                .get(sequence.as_bytes())
                .map_err(db)?
                .and_then(|v| key_id(v.value()))
                .unwrap_or(0);
            let id = current + 1;

            // Dropping the transaction uncommitted rolls both writes back
            let value = build(id)?;

            let mut records = write_txn.open_table(definition(table)).map_err(db)?;
            records.insert(id_key(id).as_slice(), value.as_slice()).map_err(db)?;
            sequences
                .insert(sequence.as_bytes(), id_key(id).as_slice())
                .map_err(db)?;
            id
        };

        write_txn.commit().map_err(db)?;
        Ok(id)
    }
}
