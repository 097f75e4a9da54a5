//! Recent searches and search history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{keys, LocalStorage};
use crate::db::StorageError;

const MAX_RECENT: usize = 10;
/// Also bounds the `search-sync` queue
pub const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEntry {
  pub query: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  pub searched_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SearchHistoryStore {
  local: LocalStorage,
}

impl SearchHistoryStore {
  pub fn new(local: LocalStorage) -> Self {
    Self { local }
  }

  /// Record a search in the recent list, the history and the `search-sync` queue.
  ///
  /// The queue holds at most `MAX_HISTORY` entries, newest last.
  ///
  /// Blank queries are ignored and return `None`.
  pub fn record(
    &self,
    query: &str,
    category: Option<&str>,
  ) -> Result<Option<SearchEntry>, StorageError> {
    let query = query.trim();
    if query.is_empty() {
      return Ok(None);
    }

    let entry = SearchEntry {
      query: query.to_string(),
      category: category.map(String::from),
      searched_at: Utc::now(),
    };

    let mut recent: Vec<String> = self.local.get_list(keys::RECENT_SEARCHES)?;
    recent.retain(|q| !q.eq_ignore_ascii_case(query));
    recent.insert(0, query.to_string());
    recent.truncate(MAX_RECENT);
    self.local.set_json(keys::RECENT_SEARCHES, &recent)?;

    let mut history: Vec<SearchEntry> = self.local.get_list(keys::SEARCH_HISTORY)?;
    history.insert(0, entry.clone());
    history.truncate(MAX_HISTORY);
    self.local.set_json(keys::SEARCH_HISTORY, &history)?;

    let mut pending: Vec<SearchEntry> = self.local.get_list(keys::PENDING_SEARCH_SYNC)?;
    pending.push(entry.clone());
    // Oldest entries go first when the endpoint stays unreachable
    let overflow = pending.len().saturating_sub(MAX_HISTORY);
    pending.drain(..overflow);
    self.local.set_json(keys::PENDING_SEARCH_SYNC, &pending)?;

    Ok(Some(entry))
  }

  /// Most recent distinct queries, newest first.
  pub fn recent(&self) -> Result<Vec<String>, StorageError> {
    self.local.get_list(keys::RECENT_SEARCHES)
  }

  pub fn history(&self) -> Result<Vec<SearchEntry>, StorageError> {
    self.local.get_list(keys::SEARCH_HISTORY)
  }

  pub fn clear_recent(&self) -> Result<(), StorageError> {
    self.local.remove(keys::RECENT_SEARCHES)?;
    Ok(())
  }

  pub fn pending_sync(&self) -> Result<Vec<SearchEntry>, StorageError> {
    self.local.get_list(keys::PENDING_SEARCH_SYNC)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::memory_storage;

  #[test]
  fn test_recent_searches_dedupe_and_order() {
    let store = SearchHistoryStore::new(memory_storage());
    store.record("bike", None).unwrap();
    store.record("desk", Some("product")).unwrap();
    store.record("  Bike ", None).unwrap();

    assert_eq!(store.recent().unwrap(), vec!["Bike", "desk"]);
    assert_eq!(store.history().unwrap().len(), 3);
    assert_eq!(store.history().unwrap()[1].category.as_deref(), Some("product"));
  }

  #[test]
  fn test_recent_is_capped() {
    let store = SearchHistoryStore::new(memory_storage());
    for i in 0..15 {
      store.record(&format!("query {}", i), None).unwrap();
    }
    let recent = store.recent().unwrap();
    assert_eq!(recent.len(), MAX_RECENT);
    assert_eq!(recent[0], "query 14");
  }

  #[test]
  fn test_blank_queries_are_ignored() {
    let store = SearchHistoryStore::new(memory_storage());
    assert!(store.record("   ", None).unwrap().is_none());
    assert!(store.recent().unwrap().is_empty());
    assert!(store.pending_sync().unwrap().is_empty());
  }

  #[test]
  fn test_every_search_is_queued_for_sync() {
    let store = SearchHistoryStore::new(memory_storage());
    store.record("camera", None).unwrap();
    store.record("camera", None).unwrap();
    store.clear_recent().unwrap();

    assert!(store.recent().unwrap().is_empty());
    assert_eq!(store.pending_sync().unwrap().len(), 2);
  }

  #[test]
  fn test_pending_queue_is_capped() {
    let store = SearchHistoryStore::new(memory_storage());
    for i in 0..(MAX_HISTORY + 25) {
      store.record(&format!("query {}", i), None).unwrap();
    }

    let pending = store.pending_sync().unwrap();
    assert_eq!(pending.len(), MAX_HISTORY);
    assert_eq!(pending[0].query, "query 25");
    assert_eq!(pending[MAX_HISTORY - 1].query, format!("query {}", MAX_HISTORY + 24));
  }
}
