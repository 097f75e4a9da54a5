//! Origin-scoped local storage written by the UI and drained by sync replay.
//!
//! Values are JSON documents under fixed keys. Every write bumps a monotonic
//! per-key version; concurrent writers resolve as last-write-wins.

pub mod cart;
pub mod keys;
pub mod repository;
pub mod search;
pub mod settings;

use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::db::{Database, StorageError};

/// A stored value with its write version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
  pub value: String,
  pub version: u64,
}

/// Key-value backend shared by every page of the origin.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<VersionedValue>, StorageError>;

  /// Write a value, returning its new version.
  fn set(&self, key: &str, value: &str) -> Result<u64, StorageError>;

  /// Remove a key. Returns false if it was absent.
  fn remove(&self, key: &str) -> Result<bool, StorageError>;

  fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// SQLite-backed key-value store.
pub struct SqliteKeyValueStore {
  db: Database,
}

impl SqliteKeyValueStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

impl KeyValueStore for SqliteKeyValueStore {
  fn get(&self, key: &str) -> Result<Option<VersionedValue>, StorageError> {
    let conn = self.db.conn()?;
    let row = conn
      .query_row(
        "SELECT value, version FROM local_storage WHERE key = ?",
        params![key],
        |row| {
          Ok(VersionedValue {
            value: row.get(0)?,
            version: row.get::<_, i64>(1)? as u64,
          })
        },
      )
      .optional()?;
    Ok(row)
  }

  fn set(&self, key: &str, value: &str) -> Result<u64, StorageError> {
    let conn = self.db.conn()?;
    let version: i64 = conn.query_row(
      "INSERT INTO local_storage (key, value, version, updated_at)
       VALUES (?1, ?2, 1, datetime('now'))
       ON CONFLICT(key) DO UPDATE SET
         value = excluded.value,
         version = local_storage.version + 1,
         updated_at = excluded.updated_at
       RETURNING version",
      params![key, value],
      |row| row.get(0),
    )?;
    Ok(version as u64)
  }

  fn remove(&self, key: &str) -> Result<bool, StorageError> {
    let conn = self.db.conn()?;
    let removed = conn.execute("DELETE FROM local_storage WHERE key = ?", params![key])?;
    Ok(removed > 0)
  }

  fn keys(&self) -> Result<Vec<String>, StorageError> {
    let conn = self.db.conn()?;
    let mut stmt = conn.prepare("SELECT key FROM local_storage ORDER BY key")?;
    let keys = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(keys)
  }
}

/// Typed JSON access on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalStorage {
  inner: Arc<dyn KeyValueStore>,
}

impl LocalStorage {
  pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
    Self { inner }
  }

  pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
    match self.inner.get(key)? {
      Some(stored) => Ok(Some(serde_json::from_str(&stored.value)?)),
      None => Ok(None),
    }
  }

  /// Read a list, treating a missing key as empty.
  pub fn get_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StorageError> {
    Ok(self.get_json(key)?.unwrap_or_default())
  }

  pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<u64, StorageError> {
    let value = serde_json::to_string(value)?;
    self.inner.set(key, &value)
  }

  pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
    self.inner.remove(key)
  }

  pub fn version(&self, key: &str) -> Result<Option<u64>, StorageError> {
    Ok(self.inner.get(key)?.map(|v| v.version))
  }

  pub fn keys(&self) -> Result<Vec<String>, StorageError> {
    self.inner.keys()
  }
}

#[cfg(test)]
pub(crate) fn memory_storage() -> LocalStorage {
  let db = Database::in_memory().expect("in-memory database");
  LocalStorage::new(Arc::new(SqliteKeyValueStore::new(db)))
}
