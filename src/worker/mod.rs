//! The offline cache controller.
//!
//! One controller instance exists per cache version. The host runtime drives it
//! through install and activation, then routes fetch, sync, push and
//! notification-click events to whichever instance is active. Every handler is
//! an async fn; the host awaits it before moving the lifecycle forward.

mod lifecycle;
mod push;
mod registration;
mod sync;

use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{BucketNames, CacheLayer, CacheResult, CacheStorage, RequestKey};
use crate::config::Config;
use crate::db::StorageError;
use crate::http::{Method, Request, Response};
use crate::net::{Network, NetworkError};
use crate::store::LocalStorage;

pub use lifecycle::WorkerState;
pub use push::{ClickOutcome, LogNotifier, NotificationPayload, Notifier};
#[cfg(test)]
pub use push::NotifyError;
pub use registration::{Registration, UpdateOutcome};
pub use sync::{SyncTag, CART_SYNC, SEARCH_SYNC};

#[derive(Debug, Error)]
pub enum WorkerError {
  #[error("install failed on {url}: {reason}")]
  Install { url: String, reason: String },
  #[error("invalid lifecycle transition from {from} to {to}")]
  InvalidTransition { from: WorkerState, to: WorkerState },
  #[error("unknown sync tag `{0}`")]
  UnknownSyncTag(String),
  #[error("sync `{tag}` failed: {source}")]
  Sync { tag: SyncTag, source: NetworkError },
  #[error("fetch rejected for {key}: {source}")]
  Rejected { key: String, source: NetworkError },
  #[error(transparent)]
  Storage(#[from] StorageError),
  #[error("invalid URL: {0}")]
  Url(#[from] url::ParseError),
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Notification presentation settings.
#[derive(Debug, Clone)]
pub struct PushSettings {
  pub title: String,
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  /// Page opened by the "explore" action
  pub root: Url,
}

/// Everything a controller needs from configuration, with paths resolved.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub version: String,
  pub buckets: BucketNames,
  pub manifest: Vec<Url>,
  pub offline_page: Url,
  pub cart_endpoint: Url,
  pub search_endpoint: Url,
  pub clear_search_queue_on_success: bool,
  pub push: PushSettings,
}

impl WorkerSettings {
  pub fn from_config(config: &Config) -> Result<Self, WorkerError> {
    let origin = &config.origin;
    let manifest = config
      .cache
      .manifest
      .iter()
      .map(|path| origin.join(path))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self {
      version: config.cache.version.clone(),
      buckets: config.cache.bucket_names(),
      manifest,
      offline_page: origin.join(&config.cache.offline_page)?,
      cart_endpoint: origin.join(&config.sync.cart_endpoint)?,
      search_endpoint: origin.join(&config.sync.search_endpoint)?,
      clear_search_queue_on_success: config.sync.clear_search_queue_on_success,
      push: PushSettings {
        title: config.push.title.clone(),
        default_body: config.push.default_body.clone(),
        icon: config.push.icon.clone(),
        badge: config.push.badge.clone(),
        vibrate: config.push.vibrate.clone(),
        root: origin.join(&config.push.root_path)?,
      },
    })
  }
}

/// Result of dispatching a fetch to the controller.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Not intercepted; the host performs the request itself
  PassThrough,
  Responded(CacheResult<Response>),
}

pub struct OfflineController {
  settings: WorkerSettings,
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
  cache: CacheLayer,
  network: Arc<dyn Network>,
  local: LocalStorage,
  notifier: Arc<dyn Notifier>,
}

impl OfflineController {
  pub fn new(
    settings: WorkerSettings,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    local: LocalStorage,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    let offline_page = RequestKey::new(&Method::GET, &settings.offline_page);
    let cache = CacheLayer::new(storage, settings.buckets.clone(), offline_page);

    Self {
      settings,
      state: Mutex::new(WorkerState::Uninstalled),
      skip_waiting: AtomicBool::new(false),
      cache,
      network,
      local,
      notifier,
    }
  }

  pub fn version(&self) -> &str {
    &self.settings.version
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn state(&self) -> WorkerState {
    *self.lock_state()
  }

  fn transition(&self, to: WorkerState) -> Result<(), WorkerError> {
    let mut state = self.lock_state();
    let from = *state;
    if !from.can_transition_to(to) {
      return Err(WorkerError::InvalidTransition { from, to });
    }
    *state = to;
    debug!(version = %self.settings.version, %from, %to, "lifecycle transition");
    Ok(())
  }

  /// Whether install asked to activate without waiting for old pages to close.
  pub fn wants_skip_waiting(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Re-attach after a host restart: a fresh controller whose static bucket
  /// already exists goes straight to ACTIVE.
  pub fn restore(&self) -> Result<bool, WorkerError> {
    let mut state = self.lock_state();
    if *state != WorkerState::Uninstalled {
      return Ok(false);
    }
    if !self.cache.storage().has_bucket(&self.settings.buckets.static_bucket)? {
      return Ok(false);
    }
    *state = WorkerState::Active;
    info!(version = %self.settings.version, "restored active controller");
    Ok(true)
  }

  /// Fetch every manifest asset and store them in the static bucket as one batch.
  ///
  /// Any failed or non-OK fetch fails the install and nothing is written.
  pub async fn install(&self) -> Result<(), WorkerError> {
    self.transition(WorkerState::Installing)?;
    info!(
      version = %self.settings.version,
      assets = self.settings.manifest.len(),
      "installing"
    );

    match self.precache().await {
      Ok(()) => {
        self.transition(WorkerState::Installed)?;
        self.skip_waiting.store(true, Ordering::SeqCst);
        info!(version = %self.settings.version, "installed");
        Ok(())
      }
      Err(e) => {
        error!(version = %self.settings.version, error = %e, "install failed");
        self.transition(WorkerState::Redundant)?;
        Err(e)
      }
    }
  }

  async fn precache(&self) -> Result<(), WorkerError> {
    let fetches = self.settings.manifest.iter().map(|url| {
      let request = Request::get(url.clone());
      let network = Arc::clone(&self.network);
      async move {
        let response = network
          .fetch(&request)
          .await
          .map_err(|e| WorkerError::Install {
            url: request.url.to_string(),
            reason: e.to_string(),
          })?;
        if !response.ok() {
          return Err(WorkerError::Install {
            url: request.url.to_string(),
            reason: format!("status {}", response.status),
          });
        }
        Ok((request.key(), response))
      }
    });

    let entries = try_join_all(fetches).await?;
    self.cache.precache(&entries)?;
    Ok(())
  }

  /// Delete buckets from other versions and start intercepting.
  ///
  /// Returns the names of the evicted buckets.
  pub async fn activate(&self) -> Result<Vec<String>, WorkerError> {
    self.transition(WorkerState::Activating)?;

    match self.cache.evict_stale() {
      Ok(evicted) => {
        self.transition(WorkerState::Active)?;
        info!(version = %self.settings.version, evicted = evicted.len(), "activated");
        Ok(evicted)
      }
      Err(e) => {
        error!(version = %self.settings.version, error = %e, "activation failed");
        self.transition(WorkerState::Redundant)?;
        Err(e.into())
      }
    }
  }

  /// Retire this controller after a newer one took over.
  pub fn mark_redundant(&self) {
    let mut state = self.lock_state();
    let from = *state;
    if from != WorkerState::Redundant {
      debug!(version = %self.settings.version, %from, "marked redundant");
      *state = WorkerState::Redundant;
    }
  }

  /// Handle an intercepted request.
  ///
  /// Non-GET and non-http(s) requests, and any request reaching a controller
  /// that is not active, pass through untouched.
  pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, WorkerError> {
    if self.state() != WorkerState::Active || request.method != Method::GET || !request.is_http() {
      return Ok(FetchOutcome::PassThrough);
    }

    let network = Arc::clone(&self.network);
    let outgoing = request.clone();
    let result = self
      .cache
      .fetch(request, move || async move { network.fetch(&outgoing).await })
      .await
      .map_err(|source| {
        warn!(url = %request.url, error = %source, "fetch failed with no cached fallback");
        WorkerError::Rejected {
          key: request.key().to_string(),
          source,
        }
      })?;

    Ok(FetchOutcome::Responded(result))
  }

  /// Wait for background cache writes to land.
  pub async fn settle(&self) {
    self.cache.settle().await;
  }
}
