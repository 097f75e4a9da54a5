//! Background sync: replaying locally queued actions to the remote endpoints.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};
use url::Url;

use super::{OfflineController, WorkerError};
use crate::http::Request;
use crate::store::keys;

pub const CART_SYNC: &str = "cart-sync";
pub const SEARCH_SYNC: &str = "search-sync";

/// Deferred actions the controller knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTag {
  Cart,
  Search,
}

impl SyncTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      SyncTag::Cart => CART_SYNC,
      SyncTag::Search => SEARCH_SYNC,
    }
  }

  /// Local storage key holding this tag's queued entries.
  pub fn queue_key(&self) -> &'static str {
    match self {
      SyncTag::Cart => keys::PENDING_CART_SYNC,
      SyncTag::Search => keys::PENDING_SEARCH_SYNC,
    }
  }
}

impl fmt::Display for SyncTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SyncTag {
  type Err = WorkerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      CART_SYNC => Ok(SyncTag::Cart),
      SEARCH_SYNC => Ok(SyncTag::Search),
      other => Err(WorkerError::UnknownSyncTag(other.to_string())),
    }
  }
}

/// Outcome of one replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
  pub tag: SyncTag,
  /// Entries posted (0 when the queue was empty and nothing was sent)
  pub sent: usize,
  /// Endpoint status, if a request was made
  pub status: Option<u16>,
  /// Whether the sent entries were removed from the queue
  pub cleared: bool,
}

impl SyncReport {
  /// Nothing left to retry: the queue was empty or the endpoint accepted the batch.
  pub fn delivered(&self) -> bool {
    match self.status {
      None => true,
      Some(status) => (200..300).contains(&status),
    }
  }
}

impl OfflineController {
  /// Replay the queue behind a sync tag.
  ///
  /// Queued entries are posted verbatim as a JSON array. They are only removed
  /// after the endpoint answers with a 2xx; a network error or any other
  /// status leaves them queued for the next trigger.
  pub async fn handle_sync(&self, tag: &str) -> Result<SyncReport, WorkerError> {
    let tag: SyncTag = tag.parse()?;
    match tag {
      SyncTag::Cart => self.replay(tag, &self.settings.cart_endpoint, true).await,
      // Search history is kept after delivery unless configured otherwise
      SyncTag::Search => {
        let clear = self.settings.clear_search_queue_on_success;
        self.replay(tag, &self.settings.search_endpoint, clear).await
      }
    }
  }

  async fn replay(
    &self,
    tag: SyncTag,
    endpoint: &Url,
    clear_on_success: bool,
  ) -> Result<SyncReport, WorkerError> {
    let queued: Vec<Value> = self.local.get_list(tag.queue_key())?;
    if queued.is_empty() {
      debug!(%tag, "nothing queued");
      return Ok(SyncReport {
        tag,
        sent: 0,
        status: None,
        cleared: false,
      });
    }

    let request = Request::post_json(endpoint.clone(), &queued)?;
    let response = self.network.fetch(&request).await.map_err(|source| {
      warn!(%tag, error = %source, queued = queued.len(), "sync replay failed");
      WorkerError::Sync { tag, source }
    })?;

    if !response.ok() {
      warn!(%tag, status = response.status, "sync endpoint rejected batch, keeping queue");
      return Ok(SyncReport {
        tag,
        sent: queued.len(),
        status: Some(response.status),
        cleared: false,
      });
    }

    let cleared = clear_on_success && self.drain(tag, &queued)?;
    info!(%tag, sent = queued.len(), cleared, "sync replay delivered");
    Ok(SyncReport {
      tag,
      sent: queued.len(),
      status: Some(response.status),
      cleared,
    })
  }

  /// Remove the delivered entries, keeping anything another page queued meanwhile.
  fn drain(&self, tag: SyncTag, sent: &[Value]) -> Result<bool, WorkerError> {
    let current: Vec<Value> = self.local.get_list(tag.queue_key())?;
    if !current.starts_with(sent) {
      debug!(%tag, "queue replaced during replay, leaving it in place");
      return Ok(false);
    }

    let remaining = &current[sent.len()..];
    if remaining.is_empty() {
      self.local.remove(tag.queue_key())?;
    } else {
      self.local.set_json(tag.queue_key(), remaining)?;
    }
    Ok(true)
  }
}

/// A tag waiting for the next sync trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRegistration {
  pub tag: SyncTag,
  /// Failed or undelivered replays so far
  pub attempts: u32,
}

/// One fired registration.
#[derive(Debug)]
pub struct SyncAttempt {
  pub tag: SyncTag,
  pub result: Result<SyncReport, WorkerError>,
}

/// Tags registered while offline, fired when connectivity returns.
#[derive(Debug)]
pub struct SyncRegistry {
  registrations: Vec<SyncRegistration>,
  max_retries: u32,
}

impl SyncRegistry {
  pub fn new(max_retries: u32) -> Self {
    Self {
      registrations: Vec::new(),
      max_retries: max_retries.max(1),
    }
  }

  /// Register a tag. Returns false if it is already pending.
  pub fn register(&mut self, tag: SyncTag) -> bool {
    if self.registrations.iter().any(|r| r.tag == tag) {
      return false;
    }
    self.registrations.push(SyncRegistration { tag, attempts: 0 });
    true
  }

  pub fn pending(&self) -> &[SyncRegistration] {
    &self.registrations
  }

  /// Fire every pending tag. Each replay is independent; delivered tags are
  /// dropped and the rest stay registered until `max_retries` is reached.
  pub async fn flush(&mut self, controller: &OfflineController) -> Vec<SyncAttempt> {
    let registrations = std::mem::take(&mut self.registrations);
    let mut attempts = Vec::with_capacity(registrations.len());

    for mut registration in registrations {
      let tag = registration.tag;
      let result = controller.handle_sync(tag.as_str()).await;
      let delivered = matches!(&result, Ok(report) if report.delivered());

      if !delivered {
        registration.attempts += 1;
        if registration.attempts >= self.max_retries {
          warn!(
            %tag,
            attempts = registration.attempts,
            "abandoning sync registration, queued data kept"
          );
        } else {
          self.registrations.push(registration);
        }
      }

      attempts.push(SyncAttempt { tag, result });
    }

    attempts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::{Method, Response, ResponseType};
  use crate::store::cart::{CartItem, CartStore, Variant};
  use crate::store::search::{SearchHistoryStore, MAX_HISTORY};
  use crate::testing::Harness;

  fn queue_cart(harness: &Harness) {
    let cart = CartStore::new(harness.local.clone());
    cart
      .add(CartItem {
        product_id: 1,
        name: "Road bike".to_string(),
        unit_price: 320_000,
        quantity: 1,
        variant: Variant::new().with("size", "M"),
      })
      .unwrap();
    cart.queue_for_sync().unwrap();
  }

  #[test]
  fn test_parse_tags() {
    assert_eq!("cart-sync".parse::<SyncTag>().unwrap(), SyncTag::Cart);
    assert_eq!("search-sync".parse::<SyncTag>().unwrap(), SyncTag::Search);
    assert!(matches!(
      "photo-sync".parse::<SyncTag>(),
      Err(WorkerError::UnknownSyncTag(_))
    ));
  }

  #[tokio::test]
  async fn test_cart_sync_drains_queue_on_success() {
    let harness = Harness::new();
    let worker = harness.active_controller("v1").await;
    queue_cart(&harness);
    harness
      .network
      .stage(&harness.url("/api/cart/sync"), Response::basic("{}"));

    let report = worker.handle_sync(CART_SYNC).await.unwrap();

    assert_eq!(report.sent, 1);
    assert!(report.cleared);
    let cart = CartStore::new(harness.local.clone());
    assert!(cart.pending_sync().unwrap().is_empty());
    // The cart itself is untouched
    assert_eq!(cart.items().unwrap().len(), 1);

    let posted = harness.network.last_request().unwrap();
    assert_eq!(posted.method, Method::POST);
    let body: Vec<Value> = serde_json::from_slice(posted.body.as_deref().unwrap()).unwrap();
    assert_eq!(body[0]["productId"], 1);
    assert_eq!(body[0]["variant"]["size"], "M");
  }

  #[tokio::test]
  async fn test_cart_sync_keeps_queue_on_network_failure() {
    let harness = Harness::new();
    let worker = harness.active_controller("v1").await;
    queue_cart(&harness);
    harness.network.set_offline(true);

    let err = worker.handle_sync(CART_SYNC).await.unwrap_err();

    assert!(matches!(err, WorkerError::Sync { tag: SyncTag::Cart, .. }));
    let cart = CartStore::new(harness.local.clone());
    assert_eq!(cart.pending_sync().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_cart_sync_keeps_queue_on_error_status() {
    let harness = Harness::new();
    let worker = harness.active_controller("v1").await;
    queue_cart(&harness);
    harness.network.stage(
      &harness.url("/api/cart/sync"),
      Response::new(503, ResponseType::Basic, "busy"),
    );

    let report = worker.handle_sync(CART_SYNC).await.unwrap();

    assert_eq!(report.status, Some(503));
    assert!(!report.cleared);
    assert!(!report.delivered());
    assert_eq!(CartStore::new(harness.local.clone()).pending_sync().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_empty_queue_sends_nothing() {
    let harness = Harness::new();
    let worker = harness.active_controller("v1").await;
    let before = harness.network.calls();

    let report = worker.handle_sync(CART_SYNC).await.unwrap();

    assert_eq!(report.sent, 0);
    assert!(report.delivered());
    assert_eq!(harness.network.calls(), before);
  }

  #[tokio::test]
  async fn test_search_sync_keeps_history_queue_by_default() {
    let harness = Harness::new();
    let worker = harness.active_controller("v1").await;
    let searches = SearchHistoryStore::new(harness.local.clone());
    searches.record("bike", None).unwrap();
    harness
      .network
      .stage(&harness.url("/api/search/sync"), Response::basic("{}"));

    let report = worker.handle_sync(SEARCH_SYNC).await.unwrap();

    assert!(report.delivered());
    assert!(!report.cleared);
    assert_eq!(searches.pending_sync().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_search_sync_clears_when_configured() {
    let mut harness = Harness::new();
    harness.config.sync.clear_search_queue_on_success = true;
    let worker = harness.active_controller("v1").await;
    let searches = SearchHistoryStore::new(harness.local.clone());
    searches.record("bike", None).unwrap();
    harness
      .network
      .stage(&harness.url("/api/search/sync"), Response::basic("{}"));

    let report = worker.handle_sync(SEARCH_SYNC).await.unwrap();

    assert!(report.cleared);
    assert!(searches.pending_sync().unwrap().is_empty());
    assert_eq!(searches.history().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_kept_search_queue_stays_bounded_across_syncs() {
    let harness = Harness::new();
    let worker = harness.active_controller("v1").await;
    let searches = SearchHistoryStore::new(harness.local.clone());
    harness
      .network
      .stage(&harness.url("/api/search/sync"), Response::basic("{}"));

    let mut largest = 0;
    for i in 0..200 {
      searches.record(&format!("query {}", i), None).unwrap();
      let report = worker.handle_sync(SEARCH_SYNC).await.unwrap();
      assert!(report.delivered());
      largest = largest.max(report.sent);
    }

    assert_eq!(largest, MAX_HISTORY);
    let body = harness.network.last_request().unwrap().body.unwrap();
    let batch: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(batch.len(), MAX_HISTORY);
    assert_eq!(batch[MAX_HISTORY - 1]["query"], "query 199");
  }

  #[tokio::test]
  async fn test_drain_keeps_entries_queued_during_replay() {
    let harness = Harness::new();
    let worker = harness.active_controller("v1").await;
    let searches = SearchHistoryStore::new(harness.local.clone());
    searches.record("bike", None).unwrap();
    let sent: Vec<Value> = harness.local.get_list(keys::PENDING_SEARCH_SYNC).unwrap();
    searches.record("desk", None).unwrap();

    assert!(worker.drain(SyncTag::Search, &sent).unwrap());

    let remaining = searches.pending_sync().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].query, "desk");
  }

  #[tokio::test]
  async fn test_registry_retries_until_delivered() {
    let harness = Harness::new();
    let worker = harness.active_controller("v1").await;
    queue_cart(&harness);
    let mut registry = SyncRegistry::new(3);
    assert!(registry.register(SyncTag::Cart));
    assert!(!registry.register(SyncTag::Cart));
    assert!(registry.register(SyncTag::Search));

    harness.network.set_offline(true);
    let attempts = registry.flush(&worker).await;
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].result.is_err());
    // Nothing queued for search, so it counts as delivered
    assert!(attempts[1].result.is_ok());
    assert_eq!(
      registry.pending(),
      &[SyncRegistration {
        tag: SyncTag::Cart,
        attempts: 1
      }]
    );

    harness.network.set_offline(false);
    harness
      .network
      .stage(&harness.url("/api/cart/sync"), Response::basic("{}"));
    let attempts = registry.flush(&worker).await;
    assert!(attempts[0].result.as_ref().unwrap().cleared);
    assert!(registry.pending().is_empty());
  }

  #[tokio::test]
  async fn test_registry_abandons_after_max_retries() {
    let harness = Harness::new();
    let worker = harness.active_controller("v1").await;
    queue_cart(&harness);
    harness.network.set_offline(true);
    let mut registry = SyncRegistry::new(2);
    registry.register(SyncTag::Cart);

    registry.flush(&worker).await;
    assert_eq!(registry.pending().len(), 1);
    registry.flush(&worker).await;
    assert!(registry.pending().is_empty());

    // Data survives for a later manual trigger
    assert_eq!(CartStore::new(harness.local.clone()).pending_sync().unwrap().len(), 1);
  }
}
