//! Cache storage trait and SQLite implementation.

use rusqlite::{params, Connection, OptionalExtension};

use super::traits::{CachedResponse, RequestKey};
use crate::db::{parse_datetime, Database, StorageError};
use crate::http::Response;

/// Trait for cache bucket backends.
///
/// Buckets are shared by every controller instance of the same origin.
/// Writes are last-writer-wins per request key.
pub trait CacheStorage: Send + Sync {
  fn has_bucket(&self, name: &str) -> Result<bool, StorageError>;

  /// Bucket names in creation order.
  fn bucket_names(&self) -> Result<Vec<String>, StorageError>;

  /// Delete a bucket and its entries. Returns false if it did not exist.
  fn delete_bucket(&self, name: &str) -> Result<bool, StorageError>;

  /// Store a single entry, creating the bucket when needed.
  fn put(&self, bucket: &str, key: &RequestKey, response: &Response) -> Result<(), StorageError>;

  /// Store a batch of entries atomically: either every entry lands or none does.
  fn put_all(&self, bucket: &str, entries: &[(RequestKey, Response)]) -> Result<(), StorageError>;

  /// Look up an entry in one bucket.
  fn match_in(&self, bucket: &str, key: &RequestKey)
    -> Result<Option<CachedResponse>, StorageError>;

  /// Look up an entry across all buckets, oldest bucket first.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StorageError>;

  /// Keys stored in a bucket, in URL order.
  fn keys(&self, bucket: &str) -> Result<Vec<RequestKey>, StorageError>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Database,
  /// Upper bound on the body bytes held by any single bucket
  quota: Option<u64>,
}

impl SqliteStorage {
  pub fn new(db: Database) -> Self {
    Self { db, quota: None }
  }

  /// Limit the body bytes a bucket may hold.
  pub fn with_quota(mut self, quota: Option<u64>) -> Self {
    self.quota = quota;
    self
  }

  fn ensure_bucket(conn: &Connection, name: &str) -> Result<(), StorageError> {
    conn.execute(
      "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
      params![name],
    )?;
    Ok(())
  }

  fn check_quota(
    &self,
    conn: &Connection,
    bucket: &str,
    incoming: u64,
  ) -> Result<(), StorageError> {
    let Some(quota) = self.quota else {
      return Ok(());
    };

    let used: i64 = conn.query_row(
      "SELECT COALESCE(SUM(length(body)), 0) FROM cache_entries WHERE bucket = ?",
      params![bucket],
      |row| row.get(0),
    )?;
    let used = used as u64 + incoming;
    if used > quota {
      return Err(StorageError::QuotaExceeded {
        bucket: bucket.to_string(),
        used,
        quota,
      });
    }
    Ok(())
  }

  fn insert_entry(
    conn: &Connection,
    bucket: &str,
    key: &RequestKey,
    response: &Response,
  ) -> Result<(), StorageError> {
    let headers = serde_json::to_string(&response.headers)?;
    conn.execute(
      "INSERT OR REPLACE INTO cache_entries
         (bucket, key_hash, method, url, status, response_type, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        bucket,
        key.cache_hash(),
        key.method(),
        key.url(),
        response.status,
        response.response_type.as_str(),
        headers,
        response.body,
      ],
    )?;
    Ok(())
  }
}

/// Columns selected for every cached response lookup.
const ENTRY_COLUMNS: &str =
  "e.status, e.response_type, e.headers, e.body, e.cached_at, e.bucket";

type EntryRow = (u16, String, String, Vec<u8>, String, String);

fn read_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
  ))
}

fn into_cached(row: EntryRow) -> Result<CachedResponse, StorageError> {
  let (status, response_type, headers, body, cached_at, bucket) = row;
  let response_type = response_type.parse().map_err(StorageError::Corrupt)?;
  Ok(CachedResponse {
    response: Response {
      status,
      response_type,
      headers: serde_json::from_str(&headers)?,
      body,
    },
    bucket,
    cached_at: parse_datetime(&cached_at)?,
  })
}

impl CacheStorage for SqliteStorage {
  fn has_bucket(&self, name: &str) -> Result<bool, StorageError> {
    let conn = self.db.conn()?;
    let found = conn
      .query_row(
        "SELECT 1 FROM cache_buckets WHERE name = ?",
        params![name],
        |_| Ok(()),
      )
      .optional()?;
    Ok(found.is_some())
  }

  fn bucket_names(&self) -> Result<Vec<String>, StorageError> {
    let conn = self.db.conn()?;
    let mut stmt = conn.prepare("SELECT name FROM cache_buckets ORDER BY rowid")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn delete_bucket(&self, name: &str) -> Result<bool, StorageError> {
    let mut conn = self.db.conn()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM cache_entries WHERE bucket = ?", params![name])?;
    let removed = tx.execute("DELETE FROM cache_buckets WHERE name = ?", params![name])?;
    tx.commit()?;
    Ok(removed > 0)
  }

  fn put(&self, bucket: &str, key: &RequestKey, response: &Response) -> Result<(), StorageError> {
    let mut conn = self.db.conn()?;
    let tx = conn.transaction()?;
    Self::ensure_bucket(&tx, bucket)?;
    self.check_quota(&tx, bucket, response.body.len() as u64)?;
    Self::insert_entry(&tx, bucket, key, response)?;
    tx.commit()?;
    Ok(())
  }

  fn put_all(&self, bucket: &str, entries: &[(RequestKey, Response)]) -> Result<(), StorageError> {
    let mut conn = self.db.conn()?;
    // Dropping the transaction without commit rolls every write back
    let tx = conn.transaction()?;
    Self::ensure_bucket(&tx, bucket)?;
    let incoming: u64 = entries.iter().map(|(_, r)| r.body.len() as u64).sum();
    self.check_quota(&tx, bucket, incoming)?;
    for (key, response) in entries {
      Self::insert_entry(&tx, bucket, key, response)?;
    }
    tx.commit()?;
    Ok(())
  }

  fn match_in(
    &self,
    bucket: &str,
    key: &RequestKey,
  ) -> Result<Option<CachedResponse>, StorageError> {
    let conn = self.db.conn()?;
    let sql = format!(
      "SELECT {} FROM cache_entries e WHERE e.bucket = ? AND e.key_hash = ?",
      ENTRY_COLUMNS
    );
    let row = conn
      .query_row(&sql, params![bucket, key.cache_hash()], read_entry_row)
      .optional()?;
    row.map(into_cached).transpose()
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StorageError> {
    let conn = self.db.conn()?;
    let sql = format!(
      "SELECT {} FROM cache_entries e
       INNER JOIN cache_buckets b ON b.name = e.bucket
       WHERE e.key_hash = ?
       ORDER BY b.rowid
       LIMIT 1",
      ENTRY_COLUMNS
    );
    let row = conn
      .query_row(&sql, params![key.cache_hash()], read_entry_row)
      .optional()?;
    row.map(into_cached).transpose()
  }

  fn keys(&self, bucket: &str) -> Result<Vec<RequestKey>, StorageError> {
    let conn = self.db.conn()?;
    let mut stmt =
      conn.prepare("SELECT method, url FROM cache_entries WHERE bucket = ? ORDER BY url, method")?;
    let keys = stmt
      .query_map(params![bucket], |row| {
        Ok(RequestKey::from_parts(row.get(0)?, row.get(1)?))
      })?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
  }
}
