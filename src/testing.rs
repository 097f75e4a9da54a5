//! Shared fixtures for controller tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::cache::{CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::http::{Request, Response, ResponseType};
use crate::net::{Network, NetworkError};
use crate::store::{memory_storage, LocalStorage};
use crate::worker::{NotificationPayload, Notifier, NotifyError, OfflineController, WorkerSettings};

const ORIGIN: &str = "https://swumarket.test/";

/// Scripted network: staged responses by URL, 404 for everything else.
#[derive(Default)]
pub struct MockNetwork {
  responses: Mutex<HashMap<String, Response>>,
  failing: Mutex<HashSet<String>>,
  offline: AtomicBool,
  calls: AtomicUsize,
  requests: Mutex<Vec<Request>>,
}

impl MockNetwork {
  pub fn stage(&self, url: &str, response: Response) {
    self.responses.lock().unwrap().insert(url.to_string(), response);
  }

  /// Make requests for this URL fail as unreachable.
  pub fn fail(&self, url: &str) {
    self.failing.lock().unwrap().insert(url.to_string());
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn last_request(&self) -> Option<Request> {
    self.requests.lock().unwrap().last().cloned()
  }
}

#[async_trait]
impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requests.lock().unwrap().push(request.clone());

    let url = request.url.to_string();
    if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&url) {
      return Err(NetworkError::Unreachable(url));
    }

    let staged = self.responses.lock().unwrap().get(&url).cloned();
    Ok(staged.unwrap_or_else(|| Response::new(404, ResponseType::Basic, "not found")))
  }
}

/// Keeps every notification it is asked to show.
#[derive(Default)]
pub struct RecordingNotifier {
  shown: Mutex<Vec<NotificationPayload>>,
  denied: AtomicBool,
}

impl RecordingNotifier {
  pub fn deny(&self) {
    self.denied.store(true, Ordering::SeqCst);
  }

  pub fn shown(&self) -> Vec<NotificationPayload> {
    self.shown.lock().unwrap().clone()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn show(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
    if self.denied.load(Ordering::SeqCst) {
      return Err(NotifyError::PermissionDenied);
    }
    self.shown.lock().unwrap().push(payload.clone());
    Ok(())
  }
}

/// One origin's worth of shared state: cache buckets, local storage, network.
pub struct Harness {
  pub config: Config,
  pub storage: Arc<SqliteStorage>,
  pub network: Arc<MockNetwork>,
  pub local: LocalStorage,
  pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
  pub fn new() -> Self {
    let mut config = Config {
      origin: Url::parse(ORIGIN).unwrap(),
      ..Config::default()
    };
    config.cache.static_prefix = "static".to_string();
    config.cache.dynamic_prefix = "dynamic".to_string();
    config.cache.manifest = vec![
      "/".to_string(),
      "/offline.html".to_string(),
      "/static/js/bundle.js".to_string(),
    ];

    Self {
      config,
      storage: Arc::new(SqliteStorage::new(Database::in_memory().unwrap())),
      network: Arc::new(MockNetwork::default()),
      local: memory_storage(),
      notifier: Arc::new(RecordingNotifier::default()),
    }
  }

  pub fn url(&self, path: &str) -> String {
    self.parsed(path).to_string()
  }

  pub fn parsed(&self, path: &str) -> Url {
    self.config.origin.join(path).unwrap()
  }

  /// Body served for a staged manifest asset.
  pub fn body_for(&self, path: &str) -> String {
    format!("<!-- swumarket {} -->", path)
  }

  pub fn stage_manifest(&self) {
    for path in &self.config.cache.manifest {
      self.network.stage(
        &self.url(path),
        Response::basic(self.body_for(path)).with_header("content-type", "text/html"),
      );
    }
  }

  /// A fresh, uninstalled controller for `version`.
  pub fn controller(&self, version: &str) -> OfflineController {
    let mut config = self.config.clone();
    config.cache.version = version.to_string();
    let settings = WorkerSettings::from_config(&config).unwrap();

    OfflineController::new(
      settings,
      self.storage.clone(),
      self.network.clone(),
      self.local.clone(),
      self.notifier.clone(),
    )
  }

  /// A controller that has been installed from the staged manifest and activated.
  pub async fn active_controller(&self, version: &str) -> OfflineController {
    self.stage_manifest();
    let worker = self.controller(version);
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    worker
  }

  /// Bucket contents in a comparable form, ignoring write timestamps.
  pub fn static_snapshot(&self, bucket: &str) -> Vec<(String, Response)> {
    self
      .storage
      .keys(bucket)
      .unwrap()
      .into_iter()
      .map(|key| {
        let hit = self.storage.match_in(bucket, &key).unwrap().unwrap();
        (key.to_string(), hit.response)
      })
      .collect()
  }
}
