//! Push messages and notification clicks.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::OfflineController;
use crate::store::settings::SettingsStore;

pub const EXPLORE_ACTION: &str = "explore";
pub const CLOSE_ACTION: &str = "close";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  /// Milliseconds since the epoch when the push arrived
  pub date_of_arrival: i64,
  pub primary_key: u64,
}

/// What gets handed to the platform notification API. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
  #[error("notifications are not permitted")]
  PermissionDenied,
  #[error("failed to show notification: {0}")]
  Platform(String),
}

/// Platform notification surface.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn show(&self, payload: &NotificationPayload) -> Result<(), NotifyError>;
}

/// Writes notifications to the log; used when no desktop surface is attached.
/// Nothing is shown once the user opts out of notifications.
#[derive(Clone)]
pub struct LogNotifier {
  settings: SettingsStore,
}

impl LogNotifier {
  pub fn new(settings: SettingsStore) -> Self {
    Self { settings }
  }
}

#[async_trait]
impl Notifier for LogNotifier {
  async fn show(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
    let settings = self
      .settings
      .load()
      .map_err(|e| NotifyError::Platform(e.to_string()))?;
    if !settings.notifications {
      return Err(NotifyError::PermissionDenied);
    }
    info!(title = %payload.title, body = %payload.body, "notification");
    Ok(())
  }
}

/// What happened after the user interacted with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// Open or focus this page
  Open(Url),
  /// Notification dismissed, nothing else to do
  Closed,
}

#[derive(Deserialize)]
struct PushMessage {
  title: Option<String>,
  body: Option<String>,
}

/// Extract a (title, body) pair from raw push data.
///
/// JSON objects may carry `title` and `body`; anything else that decodes as
/// UTF-8 is used as the body text.
fn parse_push(data: Option<&[u8]>) -> (Option<String>, Option<String>) {
  let Some(text) = data.and_then(|bytes| std::str::from_utf8(bytes).ok()) else {
    return (None, None);
  };
  let text = text.trim();
  if text.is_empty() {
    return (None, None);
  }

  if text.starts_with('{') {
    if let Ok(message) = serde_json::from_str::<PushMessage>(text) {
      let non_blank = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
      return (non_blank(message.title), non_blank(message.body));
    }
  }

  (None, Some(text.to_string()))
}

impl OfflineController {
  /// Build and show a notification for an incoming push message.
  ///
  /// Missing or unreadable data falls back to the default body. A notifier
  /// failure is logged; the payload is returned either way.
  pub async fn handle_push(&self, data: Option<&[u8]>) -> NotificationPayload {
    let push = &self.settings.push;
    let (title, body) = parse_push(data);
    if data.is_some() && body.is_none() && title.is_none() {
      debug!("push data unreadable, using default body");
    }

    let payload = NotificationPayload {
      title: title.unwrap_or_else(|| push.title.clone()),
      body: body.unwrap_or_else(|| push.default_body.clone()),
      icon: push.icon.clone(),
      badge: push.badge.clone(),
      vibrate: push.vibrate.clone(),
      data: NotificationData {
        date_of_arrival: Utc::now().timestamp_millis(),
        primary_key: 1,
      },
      actions: vec![
        NotificationAction {
          action: EXPLORE_ACTION.to_string(),
          title: "Explore".to_string(),
          icon: push.icon.clone(),
        },
        NotificationAction {
          action: CLOSE_ACTION.to_string(),
          title: "Close".to_string(),
          icon: push.icon.clone(),
        },
      ],
    };

    if let Err(e) = self.notifier.show(&payload).await {
      warn!(error = %e, "failed to display notification");
    }
    payload
  }

  /// Resolve a notification click. Only "explore" leads anywhere.
  pub fn handle_notification_click(&self, action: Option<&str>) -> ClickOutcome {
    match action {
      Some(EXPLORE_ACTION) => ClickOutcome::Open(self.settings.push.root.clone()),
      _ => ClickOutcome::Closed,
    }
  }
}
