//! The HTTP seam.
//!
//! [`ReqwestTransport`] talks to the real API. [`FnTransport`] routes every
//! request through a closure and is what tests and offline replays use.

use std::{future::Future, time::Duration};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ClientError, Result};

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://api-seller.ozon.ru";

/// Per-shop API credentials, sent as two static headers on every request.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
  pub client_id: String,
  pub api_key:   String,
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Credentials")
      .field("client_id", &self.client_id)
      .field("api_key", &"<redacted>")
      .finish()
  }
}

/// A raw HTTP response, before status interpretation.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
  pub status:      u16,
  pub retry_after: Option<Duration>,
  pub body:        Bytes,
}

impl HttpResponse {
  pub fn ok(body: &Value) -> Self {
    Self { status: 200, retry_after: None, body: Bytes::from(body.to_string()) }
  }

  pub fn status(status: u16) -> Self { Self { status, ..Default::default() } }

  pub fn with_retry_after(mut self, after: Duration) -> Self {
    self.retry_after = Some(after);
    self
  }

  pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}

/// Abstraction over the HTTP layer.
pub trait Transport: Send + Sync {
  /// POST a JSON body to an API path such as `/v3/product/list`.
  fn post<'a>(
    &'a self,
    path: &'a str,
    body: &'a Value,
  ) -> impl Future<Output = Result<HttpResponse>> + Send + 'a;

  /// GET an absolute URL (report files). No API credentials are attached.
  fn download<'a>(&'a self, url: &'a str) -> impl Future<Output = Result<HttpResponse>> + Send + 'a;
}

// ─── reqwest ─────────────────────────────────────────────────────────────────

/// [`Transport`] over [`reqwest`].
///
/// Cheap to clone. The inner clients are `Arc`-based.
#[derive(Clone)]
pub struct ReqwestTransport {
  api:      reqwest::Client,
  files:    reqwest::Client,
  base_url: String,
}

fn header(value: &str, name: &str) -> Result<HeaderValue> {
  let mut v =
    HeaderValue::from_str(value).map_err(|e| ClientError::Request(format!("{name} header: {e}")))?;
  v.set_sensitive(true);
  Ok(v)
}

fn map_reqwest(e: reqwest::Error) -> ClientError {
  if e.is_builder() {
    ClientError::Request(e.to_string())
  } else {
    ClientError::Transport(e.to_string())
  }
}

impl ReqwestTransport {
  pub fn new(base_url: impl Into<String>, creds: &Credentials, timeout: Duration) -> Result<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("client-id"), header(&creds.client_id, "Client-Id")?);
    headers.insert(HeaderName::from_static("api-key"), header(&creds.api_key, "Api-Key")?);

    let api = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(timeout)
      .build()
      .map_err(map_reqwest)?;
    let files = reqwest::Client::builder()
      .timeout(timeout * 2)
      .build()
      .map_err(map_reqwest)?;

    Ok(Self { api, files, base_url: base_url.into() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }

  async fn collect(resp: reqwest::Response) -> Result<HttpResponse> {
    let status = resp.status().as_u16();
    let retry_after = resp
      .headers()
      .get(RETRY_AFTER)
      .and_then(|v| v.to_str().ok())
      .and_then(|s| s.trim().parse::<u64>().ok())
      .map(Duration::from_secs);
    let body = resp.bytes().await.map_err(map_reqwest)?;
    Ok(HttpResponse { status, retry_after, body })
  }
}

impl Transport for ReqwestTransport {
  async fn post<'a>(&'a self, path: &'a str, body: &'a Value) -> Result<HttpResponse> {
    let resp = self.api.post(self.url(path)).json(body).send().await.map_err(map_reqwest)?;
    Self::collect(resp).await
  }

  async fn download<'a>(&'a self, url: &'a str) -> Result<HttpResponse> {
    let resp = self.files.get(url).send().await.map_err(map_reqwest)?;
    Self::collect(resp).await
  }
}

// ─── Closure-backed ──────────────────────────────────────────────────────────

/// [`Transport`] that answers from a closure `(path_or_url, body) → response`.
/// Downloads are routed through the same closure with a `null` body.
pub struct FnTransport<F> {
  handler: F,
}

impl<F> FnTransport<F>
where
  F: Fn(&str, &Value) -> Result<HttpResponse> + Send + Sync,
{
  pub fn new(handler: F) -> Self { Self { handler } }
}

impl<F> Transport for FnTransport<F>
where
  F: Fn(&str, &Value) -> Result<HttpResponse> + Send + Sync,
{
  async fn post<'a>(&'a self, path: &'a str, body: &'a Value) -> Result<HttpResponse> {
    (self.handler)(path, body)
  }

  async fn download<'a>(&'a self, url: &'a str) -> Result<HttpResponse> {
    (self.handler)(url, &Value::Null)
  }
}
