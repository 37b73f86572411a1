use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::FlatCatalog;
use metadata::MetadataPatch;
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition,
    TableError, TransactionError,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

const OVERRIDES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata_overrides");
const SKIP_TABLE: TableDefinition<&str, u64> = TableDefinition::new("skip_cache");
const SNAPSHOT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshot");

const SNAPSHOT_KEY: &str = "catalog";

#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Database>,
}

impl CatalogStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(OVERRIDES_TABLE)?;
            let _ = write_txn.open_table(SKIP_TABLE)?;
            let _ = write_txn.open_table(SNAPSHOT_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_override(&self, path: &str) -> Result<Option<MetadataPatch>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(OVERRIDES_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let patch = match table.get(path)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(patch)
    }

    pub fn set_override(&self, path: &str, patch: &MetadataPatch) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OVERRIDES_TABLE)?;
            let bytes = encode_value(patch)?;
            table.insert(path, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn clear_override(&self, path: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = match write_txn.open_table(OVERRIDES_TABLE) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(false),
                Err(err) => return Err(err.into()),
            };
            let removed = table.remove(path)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    // a differing mtime invalidates the entry
    pub fn is_skipped(&self, path: &str, mtime: u64) -> Result<bool, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SKIP_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        let skipped = match table.get(path)? {
            Some(value) => value.value() == mtime,
            None => false,
        };
        Ok(skipped)
    }

    pub fn record_skip(&self, path: &str, mtime: u64) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SKIP_TABLE)?;
            table.insert(path, mtime)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn load_snapshot(&self) -> Result<Option<FlatCatalog>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SNAPSHOT_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let flat = match table.get(SNAPSHOT_KEY)? {
            Some(value) => match decode_value::<FlatCatalog>(value.value()) {
                Ok(flat) => Some(flat),
                Err(err) => {
                    warn!("discarding unreadable catalog snapshot: {}", err);
                    None
                }
            },
            None => None,
        };
        Ok(flat)
    }

    pub fn save_snapshot(&self, flat: &FlatCatalog) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SNAPSHOT_TABLE)?;
            let bytes = encode_value(flat)?;
            table.insert(SNAPSHOT_KEY, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Redb(redb::Error),
    Database(DatabaseError),
    Table(TableError),
    Transaction(TransactionError),
    Storage(StorageError),
    Commit(CommitError),
    Bincode(Box<bincode::ErrorKind>),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        StoreError::Redb(err)
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Database(err)
    }
}

impl From<TableError> for StoreError {
    fn from(err: TableError) -> Self {
        StoreError::Table(err)
    }
}

impl From<TransactionError> for StoreError {
    fn from(err: TransactionError) -> Self {
        StoreError::Transaction(err)
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Storage(err)
    }
}

impl From<CommitError> for StoreError {
    fn from(err: CommitError) -> Self {
        StoreError::Commit(err)
    }
}

impl From<Box<bincode::ErrorKind>> for StoreError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        StoreError::Bincode(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "io error: {}", err),
            StoreError::Redb(err) => write!(f, "redb error: {}", err),
            StoreError::Database(err) => write!(f, "redb database error: {}", err),
            StoreError::Table(err) => write!(f, "redb table error: {}", err),
            StoreError::Transaction(err) => write!(f, "redb transaction error: {}", err),
            StoreError::Storage(err) => write!(f, "redb storage error: {}", err),
            StoreError::Commit(err) => write!(f, "redb commit error: {}", err),
            StoreError::Bincode(err) => write!(f, "bincode error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            StoreError::Redb(err) => Some(err),
            StoreError::Database(err) => Some(err),
            StoreError::Table(err) => Some(err),
            StoreError::Transaction(err) => Some(err),
            StoreError::Storage(err) => Some(err),
            StoreError::Commit(err) => Some(err),
            StoreError::Bincode(err) => Some(err),
        }
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &tempfile::TempDir) -> CatalogStore {
        CatalogStore::open(&dir.path().join("catalog.redb")).unwrap()
    }

    #[test]
    fn override_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert!(store.get_override("/music/a.flac").unwrap().is_none());
        let patch = MetadataPatch {
            title: Some("Fixed".to_string()),
            ..MetadataPatch::default()
        };
        store.set_override("/music/a.flac", &patch).unwrap();
        assert_eq!(store.get_override("/music/a.flac").unwrap(), Some(patch));
        assert!(store.clear_override("/music/a.flac").unwrap());
        assert!(!store.clear_override("/music/a.flac").unwrap());
    }

    #[test]
    fn skip_cache_invalidates_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        assert!(!store.is_skipped("/music/bad.flac", 100).unwrap());
        store.record_skip("/music/bad.flac", 100).unwrap();
        assert!(store.is_skipped("/music/bad.flac", 100).unwrap());
        assert!(!store.is_skipped("/music/bad.flac", 101).unwrap());
    }

    #[test]
    fn snapshot_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.redb");
        let flat = FlatCatalog {
            songs: Vec::new(),
            albums: Vec::new(),
            artists: vec![common::Artist {
                key: "R0".to_string(),
                name: "Someone".to_string(),
                songs: Vec::new(),
                albums: Vec::new(),
            }],
        };
        {
            let store = CatalogStore::open(&path).unwrap();
            assert!(store.load_snapshot().unwrap().is_none());
            store.save_snapshot(&flat).unwrap();
        }
        let store = CatalogStore::open(&path).unwrap();
        assert_eq!(store.load_snapshot().unwrap(), Some(flat));
    }
}
