//! [`ApiClient`]: a retrying JSON client over a [`Transport`].

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::{
  ClientError, Result,
  retry::{CallStats, RetryPolicy, execute_with_retry},
  transport::{HttpResponse, ReqwestTransport, Transport},
};

/// Longest response body excerpt kept in errors.
const BODY_EXCERPT: usize = 512;

/// Marketplace API client.
///
/// Cheap to clone. The transport and counters are shared.
pub struct ApiClient<T = ReqwestTransport> {
  transport: Arc<T>,
  policy:    RetryPolicy,
  stats:     Arc<CallStats>,
}

impl<T> Clone for ApiClient<T> {
  fn clone(&self) -> Self {
    Self {
      transport: Arc::clone(&self.transport),
      policy:    self.policy.clone(),
      stats:     Arc::clone(&self.stats),
    }
  }
}

fn check(path: &str, resp: HttpResponse) -> Result<HttpResponse> {
  if resp.is_success() {
    return Ok(resp);
  }
  let body = String::from_utf8_lossy(&resp.body).chars().take(BODY_EXCERPT).collect();
  Err(ClientError::Status {
    path: path.to_owned(),
    status: resp.status,
    body,
    retry_after: resp.retry_after,
  })
}

impl<T: Transport> ApiClient<T> {
  pub fn new(transport: T, policy: RetryPolicy) -> Self {
    Self { transport: Arc::new(transport), policy, stats: Arc::new(CallStats::new()) }
  }

  /// A client sharing this one's transport but counting into fresh stats.
  /// Each job runs on its own scoped client.
  pub fn scoped(&self) -> Self {
    Self {
      transport: Arc::clone(&self.transport),
      policy:    self.policy.clone(),
      stats:     Arc::new(CallStats::new()),
    }
  }

  pub fn stats(&self) -> &CallStats { &self.stats }

  pub fn policy(&self) -> &RetryPolicy { &self.policy }

  /// POST with retries and decode the body as `R`.
  pub async fn post<R: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<R> {
    let transport = &*self.transport;
    let resp = execute_with_retry(&self.policy, &self.stats, path, move || async move {
      check(path, transport.post(path, body).await?)
    })
    .await?;

    serde_json::from_slice(&resp.body)
      .map_err(|source| ClientError::Decode { path: path.to_owned(), source })
  }

  /// Like [`post`](Self::post), but a call that exhausted its retries on
  /// transient errors yields `Ok(None)` instead of failing. The exhaustion is
  /// recorded in [`CallStats::exhausted`].
  pub async fn post_best_effort<R: DeserializeOwned>(
    &self,
    path: &str,
    body: &Value,
  ) -> Result<Option<R>> {
    match self.post(path, body).await {
      Ok(r) => Ok(Some(r)),
      Err(e) if e.is_exhausted() => {
        warn!(path, error = %e, "giving up on call, continuing with partial data");
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  /// GET a report file with retries.
  pub async fn download(&self, url: &str) -> Result<Bytes> {
    let transport = &*self.transport;
    let resp = execute_with_retry(&self.policy, &self.stats, "download", move || async move {
      check(url, transport.download(url).await?)
    })
    .await?;
    Ok(resp.body)
  }
}
