//! Asynchronous report generation: create, poll, download.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::{ApiClient, ClientError, Result, sheet::Sheet, transport::Transport};

/// Poll `report_info(code)` until the report is ready and return its file URL.
///
/// `failed`/`error` and exceeding `timeout` are fatal.
pub async fn wait_for_report<T: Transport>(
  client: &ApiClient<T>,
  code: &str,
  poll_interval: Duration,
  timeout: Duration,
) -> Result<String> {
  let started = Instant::now();
  loop {
    let info = client.report_info(code).await?;
    match info.status.to_ascii_lowercase().as_str() {
      "success" => {
        if info.file.is_empty() {
          return Err(ClientError::MissingField { path: "/v1/report/info".into(), field: "file" });
        }
        info!(code, waited_ms = started.elapsed().as_millis() as u64, "report ready");
        return Ok(info.file);
      }
      "failed" | "error" => {
        return Err(ClientError::ReportFailed {
          code:   code.to_owned(),
          status: info.status,
          error:  info.error,
        });
      }
      status => debug!(code, status, "report not ready yet"),
    }

    let waited = started.elapsed();
    if waited + poll_interval > timeout {
      return Err(ClientError::ReportTimeout { code: code.to_owned(), waited });
    }
    tokio::time::sleep(poll_interval).await;
  }
}

/// Download a generated spreadsheet and decode its first sheet.
pub async fn download_sheet<T: Transport>(client: &ApiClient<T>, url: &str) -> Result<Sheet> {
  let bytes = client.download(url).await?;
  Sheet::from_xlsx(&bytes)
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
  };

  use serde_json::json;

  use super::*;
  use crate::{
    RetryPolicy,
    transport::{FnTransport, HttpResponse},
  };

  fn scripted(statuses: &'static [&'static str]) -> (ApiClient<impl Transport>, Arc<AtomicU32>) {
    let polls = Arc::new(AtomicU32::new(0));
    let p = Arc::clone(&polls);
    let client = ApiClient::new(
      FnTransport::new(move |_, _| {
        let i = p.fetch_add(1, Ordering::SeqCst) as usize;
        let status = statuses[i.min(statuses.len() - 1)];
        let file = if status == "success" { "https://files/report.xlsx" } else { "" };
        Ok(HttpResponse::ok(&json!({
          "result": { "code": "R1", "status": status, "file": file, "error": "bad period" }
        })))
      }),
      RetryPolicy { max_attempts: 1, base_delay_ms: 1, max_delay_ms: 1, jitter_ms: 0 },
    );
    (client, polls)
  }

  #[tokio::test]
  async fn polls_until_success() {
    let (client, polls) = scripted(&["waiting", "processing", "success"]);
    let url = wait_for_report(&client, "R1", Duration::from_millis(1), Duration::from_secs(5))
      .await
      .unwrap();
    assert_eq!(url, "https://files/report.xlsx");
    assert_eq!(polls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn failed_status_is_fatal() {
    let (client, _) = scripted(&["processing", "failed"]);
    let err = wait_for_report(&client, "R1", Duration::from_millis(1), Duration::from_secs(5))
      .await
      .unwrap_err();
    assert!(matches!(err, ClientError::ReportFailed { ref status, .. } if status == "failed"));
  }

  #[tokio::test]
  async fn gives_up_after_timeout() {
    let (client, polls) = scripted(&["processing"]);
    let err = wait_for_report(&client, "R1", Duration::from_millis(5), Duration::from_millis(30))
      .await
      .unwrap_err();
    assert!(matches!(err, ClientError::ReportTimeout { .. }));
    assert!(polls.load(Ordering::SeqCst) >= 2);
  }
}
