//! Network access used by the controller for fetches and sync replay.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::http::{Request, RequestMode, Response, ResponseType};

#[derive(Debug, Clone, Error)]
pub enum NetworkError {
  #[error("network unreachable: {0}")]
  Unreachable(String),
  #[error("request timed out")]
  Timeout,
  #[error("request failed: {0}")]
  Request(String),
}

impl From<reqwest::Error> for NetworkError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      NetworkError::Timeout
    } else if e.is_connect() {
      NetworkError::Unreachable(e.to_string())
    } else {
      NetworkError::Request(e.to_string())
    }
  }
}

/// Performs requests on behalf of the controller.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// reqwest-backed network that classifies responses relative to an origin.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(origin: Url, timeout: Duration) -> Result<Self, NetworkError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| NetworkError::Request(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self { client, origin })
  }

  /// Classify by the URL the response came from, which differs from the
  /// request URL once redirects are followed.
  fn classify(&self, final_url: &Url, mode: RequestMode) -> ResponseType {
    if final_url.origin() == self.origin.origin() {
      ResponseType::Basic
    } else if mode == RequestMode::NoCors {
      ResponseType::Opaque
    } else {
      ResponseType::Cors
    }
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await?;
    let response_type = self.classify(response.url(), request.mode);

    // No-cors responses hide everything from the page
    if response_type == ResponseType::Opaque {
      return Ok(Response::opaque());
    }

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response.bytes().await?.to_vec();

    Ok(Response {
      status,
      response_type,
      headers,
      body,
    })
  }
}
