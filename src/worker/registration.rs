//! The host side of the controller: which instance is active for the scope,
//! which pages it controls, and where lifecycle events get routed.

use tracing::{debug, info, warn};
use url::Url;

use super::sync::{SyncAttempt, SyncRegistry, SyncTag};
use super::{ClickOutcome, FetchOutcome, NotificationPayload, OfflineController, WorkerError};
use crate::http::Request;

/// An open page within the scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
  pub id: u64,
  pub url: Url,
  /// Version of the controller handling this page's requests
  pub controller: Option<String>,
  pub focused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
  /// The new controller took over; lists the buckets it evicted
  Activated { evicted: Vec<String> },
  /// The active controller already runs this version
  Unchanged,
}

pub struct Registration {
  scope: Url,
  active: Option<OfflineController>,
  clients: Vec<Client>,
  next_client_id: u64,
  sync: SyncRegistry,
}

impl Registration {
  pub fn new(scope: Url, max_sync_retries: u32) -> Self {
    Self {
      scope,
      active: None,
      clients: Vec::new(),
      next_client_id: 1,
      sync: SyncRegistry::new(max_sync_retries),
    }
  }

  pub fn active(&self) -> Option<&OfflineController> {
    self.active.as_ref()
  }

  /// Pages under the scope URL are the only ones a controller may claim.
  fn in_scope(&self, url: &Url) -> bool {
    url.as_str().starts_with(self.scope.as_str())
  }

  pub fn clients(&self) -> &[Client] {
    &self.clients
  }

  pub fn pending_sync(&self) -> Vec<SyncTag> {
    self.sync.pending().iter().map(|r| r.tag).collect()
  }

  /// Install a controller and, once installed, let it take over immediately.
  ///
  /// If install fails the previous controller stays active and the error is
  /// returned; the failed instance is left redundant.
  pub async fn update(&mut self, worker: OfflineController) -> Result<UpdateOutcome, WorkerError> {
    if let Some(active) = &self.active {
      if active.version() == worker.version() {
        debug!(version = %worker.version(), "controller version unchanged");
        return Ok(UpdateOutcome::Unchanged);
      }
    }

    worker.install().await?;
    debug!(
      version = %worker.version(),
      skip_waiting = worker.wants_skip_waiting(),
      clients = self.clients.len(),
      "taking over"
    );
    let evicted = worker.activate().await?;
    self.promote(worker);
    Ok(UpdateOutcome::Activated { evicted })
  }

  /// Re-attach a controller whose install survived a restart.
  ///
  /// Returns false when its static bucket is gone and a full update is needed.
  pub fn resume(&mut self, worker: OfflineController) -> Result<bool, WorkerError> {
    if !worker.restore()? {
      return Ok(false);
    }
    self.promote(worker);
    Ok(true)
  }

  fn promote(&mut self, worker: OfflineController) {
    let version = worker.version().to_string();
    if let Some(previous) = self.active.replace(worker) {
      previous.mark_redundant();
    }

    // Claim every open page in scope
    let scope = self.scope.as_str();
    let mut claimed = 0;
    for client in &mut self.clients {
      if client.url.as_str().starts_with(scope) {
        client.controller = Some(version.clone());
        claimed += 1;
      }
    }
    info!(%version, clients = claimed, "controller active");
  }

  /// Track a newly opened page. It is controlled by the active controller
  /// when it falls under the scope.
  pub fn open_client(&mut self, url: Url) -> u64 {
    let id = self.next_client_id;
    self.next_client_id += 1;
    let controller = match &self.active {
      Some(active) if self.in_scope(&url) => Some(active.version().to_string()),
      _ => None,
    };
    self.clients.push(Client {
      id,
      url,
      controller,
      focused: false,
    });
    id
  }

  /// Route a fetch to the active controller.
  pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome, WorkerError> {
    match &self.active {
      Some(active) => active.handle_fetch(request).await,
      None => Ok(FetchOutcome::PassThrough),
    }
  }

  /// Ask for a sync event once connectivity returns. False if already pending.
  pub fn register_sync(&mut self, tag: &str) -> Result<bool, WorkerError> {
    let tag: SyncTag = tag.parse()?;
    Ok(self.sync.register(tag))
  }

  /// Connectivity is back: fire every pending sync registration.
  pub async fn flush_sync(&mut self) -> Vec<SyncAttempt> {
    match &self.active {
      Some(active) => self.sync.flush(active).await,
      None => {
        debug!("no active controller, sync deferred");
        Vec::new()
      }
    }
  }

  pub async fn push(&self, data: Option<&[u8]>) -> Option<NotificationPayload> {
    match &self.active {
      Some(active) => Some(active.handle_push(data).await),
      None => {
        warn!("push received with no active controller");
        None
      }
    }
  }

  /// Handle a notification click, focusing an open page at the target or
  /// opening a new one. Returns the focused client.
  pub fn notification_click(&mut self, action: Option<&str>) -> Option<u64> {
    let outcome = self.active.as_ref()?.handle_notification_click(action);
    let ClickOutcome::Open(url) = outcome else {
      return None;
    };

    let id = match self.clients.iter().find(|c| c.url == url) {
      Some(existing) => existing.id,
      None => self.open_client(url),
    };
    for client in &mut self.clients {
      client.focused = client.id == id;
    }
    Some(id)
  }
}
