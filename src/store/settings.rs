//! Accessibility flags, notification opt-in and language preference.

use serde::{Deserialize, Serialize};

use super::{keys, LocalStorage};
use crate::db::StorageError;

pub const DEFAULT_LANGUAGE: &str = "ko";
pub const SUPPORTED_LANGUAGES: &[&str] = &["ko", "en"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
  pub high_contrast: bool,
  pub large_text: bool,
  pub reduce_motion: bool,
  pub screen_reader: bool,
  pub notifications: bool,
}

impl Default for UserSettings {
  fn default() -> Self {
    Self {
      high_contrast: false,
      large_text: false,
      reduce_motion: false,
      screen_reader: false,
      notifications: true,
    }
  }
}

#[derive(Clone)]
pub struct SettingsStore {
  local: LocalStorage,
}

impl SettingsStore {
  pub fn new(local: LocalStorage) -> Self {
    Self { local }
  }

  pub fn load(&self) -> Result<UserSettings, StorageError> {
    Ok(self.local.get_json(keys::SETTINGS)?.unwrap_or_default())
  }

  pub fn save(&self, settings: &UserSettings) -> Result<(), StorageError> {
    self.local.set_json(keys::SETTINGS, settings)?;
    Ok(())
  }

  /// Apply `change` to the stored settings and persist the result.
  pub fn update(
    &self,
    change: impl FnOnce(&mut UserSettings),
  ) -> Result<UserSettings, StorageError> {
    let mut settings = self.load()?;
    change(&mut settings);
    self.save(&settings)?;
    Ok(settings)
  }

  pub fn language(&self) -> Result<String, StorageError> {
    Ok(
      self
        .local
        .get_json(keys::LANGUAGE)?
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
    )
  }

  /// Store the language code. Returns false for unsupported codes.
  pub fn set_language(&self, code: &str) -> Result<bool, StorageError> {
    let code = code.trim().to_ascii_lowercase();
    if !SUPPORTED_LANGUAGES.contains(&code.as_str()) {
      return Ok(false);
    }
    self.local.set_json(keys::LANGUAGE, &code)?;
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::memory_storage;

  #[test]
  fn test_defaults_when_missing() {
    let store = SettingsStore::new(memory_storage());
    assert_eq!(store.load().unwrap(), UserSettings::default());
    assert_eq!(store.language().unwrap(), "ko");
  }

  #[test]
  fn test_update_persists() {
    let store = SettingsStore::new(memory_storage());
    store.update(|s| s.high_contrast = true).unwrap();
    let loaded = store.load().unwrap();
    assert!(loaded.high_contrast);
    assert!(loaded.notifications);
  }

  #[test]
  fn test_partial_record_fills_defaults() {
    let local = memory_storage();
    local
      .set_json(keys::SETTINGS, &serde_json::json!({ "largeText": true }))
      .unwrap();
    let loaded = SettingsStore::new(local).load().unwrap();
    assert!(loaded.large_text);
    assert!(loaded.notifications);
  }

  #[test]
  fn test_language_validation() {
    let store = SettingsStore::new(memory_storage());
    assert!(store.set_language("EN").unwrap());
    assert_eq!(store.language().unwrap(), "en");
    assert!(!store.set_language("fr").unwrap());
    assert_eq!(store.language().unwrap(), "en");
  }
}
