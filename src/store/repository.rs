//! Repository abstraction for swappable data sets.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use thiserror::Error;

use super::LocalStorage;
use crate::db::StorageError;

#[derive(Debug, Error)]
pub enum RepoError {
  #[error("record {0} not found")]
  NotFound(u64),
  #[error("record {0} already exists")]
  Duplicate(u64),
  #[error(transparent)]
  Storage(#[from] StorageError),
}

/// Records addressable by a numeric id.
pub trait Entity: Clone + Send + Sync {
  fn id(&self) -> u64;
  fn set_id(&mut self, id: u64);
}

/// Get/list/add/update/delete over one record type.
pub trait Repository<T: Entity>: Send + Sync {
  fn get(&self, id: u64) -> Result<Option<T>, RepoError>;

  /// All records in id order.
  fn list(&self) -> Result<Vec<T>, RepoError>;

  /// Insert a record. An id of 0 is replaced with the next free id.
  fn add(&self, record: T) -> Result<T, RepoError>;

  fn update(&self, record: T) -> Result<(), RepoError>;

  /// Returns false if the id was unknown.
  fn delete(&self, id: u64) -> Result<bool, RepoError>;
}

/// Repository kept as one JSON list under a local storage key.
pub struct LocalRepository<T> {
  local: LocalStorage,
  key: &'static str,
  records: PhantomData<fn() -> T>,
}

impl<T> LocalRepository<T>
where
  T: Entity + Serialize + DeserializeOwned,
{
  pub fn new(local: LocalStorage, key: &'static str) -> Self {
    Self {
      local,
      key,
      records: PhantomData,
    }
  }

  /// Open the repository, writing `seed` only if the key was never written.
  ///
  /// Once seeded, deletions stick: an emptied list is not refilled.
  pub fn seeded(
    local: LocalStorage,
    key: &'static str,
    seed: impl IntoIterator<Item = T>,
  ) -> Result<Self, RepoError> {
    let repo = Self::new(local, key);
    if repo.local.version(key)?.is_none() {
      let mut records = BTreeMap::new();
      for record in seed {
        insert(&mut records, record)?;
      }
      repo.save(&records)?;
    }
    Ok(repo)
  }

  fn load(&self) -> Result<BTreeMap<u64, T>, RepoError> {
    let records: Vec<T> = self.local.get_list(self.key)?;
    Ok(records.into_iter().map(|r| (r.id(), r)).collect())
  }

  fn save(&self, records: &BTreeMap<u64, T>) -> Result<(), RepoError> {
    let list: Vec<&T> = records.values().collect();
    self.local.set_json(self.key, &list)?;
    Ok(())
  }
}

fn insert<T: Entity>(records: &mut BTreeMap<u64, T>, mut record: T) -> Result<T, RepoError> {
  if record.id() == 0 {
    let next = records.keys().next_back().map_or(1, |last| last + 1);
    record.set_id(next);
  } else if records.contains_key(&record.id()) {
    return Err(RepoError::Duplicate(record.id()));
  }
  records.insert(record.id(), record.clone());
  Ok(record)
}

impl<T> Repository<T> for LocalRepository<T>
where
  T: Entity + Serialize + DeserializeOwned,
{
  fn get(&self, id: u64) -> Result<Option<T>, RepoError> {
    Ok(self.load()?.remove(&id))
  }

  fn list(&self) -> Result<Vec<T>, RepoError> {
    Ok(self.load()?.into_values().collect())
  }

  fn add(&self, record: T) -> Result<T, RepoError> {
    let mut records = self.load()?;
    let record = insert(&mut records, record)?;
    self.save(&records)?;
    Ok(record)
  }

  fn update(&self, record: T) -> Result<(), RepoError> {
    let mut records = self.load()?;
    match records.get_mut(&record.id()) {
      Some(existing) => *existing = record,
      None => return Err(RepoError::NotFound(record.id())),
    }
    self.save(&records)
  }

  fn delete(&self, id: u64) -> Result<bool, RepoError> {
    let mut records = self.load()?;
    if records.remove(&id).is_none() {
      return Ok(false);
    }
    self.save(&records)?;
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::memory_storage;
  use serde::Deserialize;

  const NOTES: &str = "notes";

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    id: u64,
    text: String,
  }

  impl Entity for Note {
    fn id(&self) -> u64 {
      self.id
    }

    fn set_id(&mut self, id: u64) {
      self.id = id;
    }
  }

  fn note(id: u64, text: &str) -> Note {
    Note {
      id,
      text: text.to_string(),
    }
  }

  #[test]
  fn test_add_assigns_ids() {
    let repo = LocalRepository::new(memory_storage(), NOTES);
    assert_eq!(repo.add(note(0, "a")).unwrap().id, 1);
    assert_eq!(repo.add(note(10, "b")).unwrap().id, 10);
    assert_eq!(repo.add(note(0, "c")).unwrap().id, 11);
    assert!(matches!(
      repo.add(note(10, "dup")),
      Err(RepoError::Duplicate(10))
    ));
    assert_eq!(repo.list().unwrap().len(), 3);
  }

  #[test]
  fn test_update_and_delete() {
    let repo = LocalRepository::seeded(memory_storage(), NOTES, [note(1, "a")]).unwrap();
    repo.update(note(1, "changed")).unwrap();
    assert_eq!(repo.get(1).unwrap().unwrap().text, "changed");
    assert!(matches!(
      repo.update(note(2, "x")),
      Err(RepoError::NotFound(2))
    ));

    assert!(repo.delete(1).unwrap());
    assert!(!repo.delete(1).unwrap());
    assert!(repo.get(1).unwrap().is_none());
  }

  #[test]
  fn test_records_persist_and_are_seeded_once() {
    let local = memory_storage();
    let seed = [note(1, "a"), note(2, "b")];
    let first = LocalRepository::seeded(local.clone(), NOTES, seed).unwrap();
    first.delete(1).unwrap();
    first.delete(2).unwrap();

    let reopened: LocalRepository<Note> =
      LocalRepository::seeded(local.clone(), NOTES, [note(1, "a")]).unwrap();
    assert!(reopened.list().unwrap().is_empty());
    assert_eq!(local.get_list::<Note>(NOTES).unwrap(), vec![]);
  }

  #[test]
  fn test_duplicate_seed_is_rejected() {
    let result = LocalRepository::seeded(memory_storage(), NOTES, [note(1, "a"), note(1, "b")]);
    assert!(matches!(result, Err(RepoError::Duplicate(1))));
  }

  #[test]
  fn test_usable_behind_trait_object() {
    let repo: Box<dyn Repository<Note>> = Box::new(LocalRepository::new(memory_storage(), NOTES));
    repo.add(note(0, "a")).unwrap();
    assert_eq!(repo.list().unwrap(), vec![note(1, "a")]);
  }
}
