//! Concrete endpoint helpers.
//!
//! Each helper maps one API listing onto the chunking, paging and pooling
//! rules it needs. Chunks and pages go through
//! [`post_best_effort`](ApiClient::post_best_effort): a batch that exhausts its
//! retries contributes nothing and is counted in the client's stats.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::{
  ApiClient, ClientError, Result,
  paginate::{Page, PageRequest, Paged, Protocol, paginate},
  pool::{WorkerPool, chunk},
  records::*,
  transport::Transport,
};

/// Supply-order detail accepts at most this many ids per call.
pub const SUPPLY_GET_CHUNK: usize = 100;

/// Batching knobs for one job.
#[derive(Debug, Clone, Copy)]
pub struct Batching {
  /// Ids per call for array-accepting endpoints.
  pub chunk_size: usize,
  /// `limit` sent on paged endpoints.
  pub page_size:  u64,
  /// Safety cap on pages per listing.
  pub max_pages:  usize,
  pub pool:       WorkerPool,
}

impl Default for Batching {
  fn default() -> Self {
    Self { chunk_size: 1000, page_size: 1000, max_pages: 500, pool: WorkerPool::new(4) }
  }
}

/// Timestamp format the posting and returns filters accept.
pub fn iso_z(dt: DateTime<Utc>) -> String { dt.format("%Y-%m-%dT%H:%M:%SZ").to_string() }

/// Split `[start, end)` at calendar month boundaries (UTC).
pub fn month_ranges(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
  let mut out = Vec::new();
  let mut current = start;
  while current < end {
    let (y, m) = if current.month() == 12 {
      (current.year() + 1, 1)
    } else {
      (current.year(), current.month() + 1)
    };
    let Some(next) = NaiveDate::from_ymd_opt(y, m, 1)
      .and_then(|d| d.and_hms_opt(0, 0, 0))
      .map(|n| Utc.from_utc_datetime(&n))
    else {
      break;
    };
    let bound = next.min(end);
    out.push((current, bound));
    current = bound;
  }
  out
}

const PRODUCT_LIST: &str = "/v3/product/list";
const PRODUCT_INFO: &str = "/v3/product/info/list";
const PRODUCT_STOCKS: &str = "/v4/product/info/stocks";
const PRODUCT_PRICES: &str = "/v5/product/info/prices";
const ANALYTICS_STOCKS: &str = "/v1/analytics/stocks";
const CLUSTER_LIST: &str = "/v1/cluster/list";
const WAREHOUSE_LIST: &str = "/v2/warehouse/list";
const FBO_LIST: &str = "/v2/posting/fbo/list";
const FBS_LIST: &str = "/v3/posting/fbs/list";
const RETURNS_LIST: &str = "/v1/returns/list";
const SUPPLY_LIST: &str = "/v3/supply-order/list";
const SUPPLY_GET: &str = "/v3/supply-order/get";
const PLACEMENT_CREATE: &str = "/v1/report/placement/by-products/create";
const REPORT_INFO: &str = "/v1/report/info";

impl<T: Transport> ApiClient<T> {
  /// Run one best-effort call per chunk of `ids` on the pool and flatten the
  /// extracted items in chunk order.
  async fn chunked<I, R, O>(
    &self,
    path: &'static str,
    ids: &[I],
    chunk_size: usize,
    pool: WorkerPool,
    body: impl Fn(&[I]) -> Value,
    extract: impl Fn(R) -> Vec<O>,
  ) -> Result<Vec<O>>
  where
    I: Clone,
    R: DeserializeOwned,
  {
    let results = pool
      .run(chunk(ids, chunk_size), |part| {
        let payload = body(&part);
        async move { self.post_best_effort::<R>(path, &payload).await }
      })
      .await;

    let mut out = Vec::new();
    for r in results {
      if let Some(resp) = r? {
        out.extend(extract(resp));
      }
    }
    Ok(out)
  }

  // ── catalog ──

  /// Every product, paged by `last_id`.
  pub async fn list_products(&self, b: &Batching) -> Result<Paged<ProductListItem>> {
    paginate(Protocol::Cursor, b.page_size, b.max_pages, move |req: PageRequest| async move {
      let body = json!({
        "filter": { "visibility": "ALL" },
        "last_id": req.cursor.unwrap_or_default(),
        "limit": req.limit,
      });
      Ok(match self.post_best_effort::<ProductListResponse>(PRODUCT_LIST, &body).await? {
        Some(r) => Page::new(r.result.items).with_cursor(r.result.last_id),
        None => Page::new(Vec::new()),
      })
    })
    .await
  }

  pub async fn product_info(&self, product_ids: &[i64], b: &Batching) -> Result<Vec<ProductInfo>> {
    self
      .chunked(
        PRODUCT_INFO,
        product_ids,
        b.chunk_size,
        b.pool,
        |ids| json!({ "product_id": ids }),
        ProductInfoResponse::into_items,
      )
      .await
  }

  pub async fn product_stocks(&self, product_ids: &[i64], b: &Batching) -> Result<Vec<ProductStocks>> {
    self
      .chunked(
        PRODUCT_STOCKS,
        product_ids,
        b.chunk_size,
        b.pool,
        |ids| json!({ "filter": { "product_id": ids, "visibility": "ALL" }, "limit": ids.len() }),
        |r: ProductStocksResponse| r.items,
      )
      .await
  }

  /// Prices per chunk of `product_ids`, following the response `cursor`
  /// inside each chunk.
  pub async fn product_prices(&self, product_ids: &[i64], b: &Batching) -> Result<Vec<ProductPrice>> {
    let chunks = b
      .pool
      .run(chunk(product_ids, b.chunk_size), |part| async move {
        paginate(Protocol::Cursor, b.page_size, b.max_pages, |req: PageRequest| {
          let body = json!({
            "filter": { "product_id": &part, "visibility": "ALL" },
            "cursor": req.cursor.unwrap_or_default(),
            "limit": req.limit,
          });
          async move {
            Ok(match self.post_best_effort::<ProductPricesResponse>(PRODUCT_PRICES, &body).await? {
              Some(r) => Page::new(r.items).with_cursor(r.cursor),
              None => Page::new(Vec::new()),
            })
          }
        })
        .await
      })
      .await;

    let mut out = Vec::new();
    for c in chunks {
      out.extend(c?.items);
    }
    Ok(out)
  }

  // ── stocks & clusters ──

  /// Stock analytics for `skus`, optionally restricted to `cluster_ids`.
  pub async fn analytics_stocks(
    &self,
    skus: &[String],
    cluster_ids: &[i64],
    b: &Batching,
  ) -> Result<Vec<AnalyticsStock>> {
    self
      .chunked(
        ANALYTICS_STOCKS,
        skus,
        b.chunk_size,
        b.pool,
        |part| {
          let mut body = json!({ "skus": part, "warehouse_ids": [], "limit": part.len() });
          if !cluster_ids.is_empty() {
            body["cluster_ids"] = json!(cluster_ids);
          }
          body
        },
        |r: AnalyticsStocksResponse| r.items,
      )
      .await
  }

  pub async fn clusters(&self, kind: ClusterType) -> Result<Vec<Cluster>> {
    let body = json!({ "cluster_ids": [], "cluster_type": kind.as_str() });
    Ok(
      self
        .post_best_effort::<ClusterListResponse>(CLUSTER_LIST, &body)
        .await?
        .map(|r| r.clusters)
        .unwrap_or_default(),
    )
  }

  /// Domestic clusters first, then CIS.
  pub async fn all_clusters(&self) -> Result<Vec<Cluster>> {
    let mut out = self.clusters(ClusterType::Ozon).await?;
    out.extend(self.clusters(ClusterType::Cis).await?);
    Ok(out)
  }

  pub async fn warehouses(&self) -> Result<Vec<WarehouseRef>> {
    Ok(
      self
        .post_best_effort::<WarehouseListResponse>(WAREHOUSE_LIST, &json!({}))
        .await?
        .map(|r| r.result)
        .unwrap_or_default(),
    )
  }

  // ── postings ──

  /// FBO postings in `[since, to)`, fetched per calendar month on the pool.
  pub async fn fbo_postings(
    &self,
    since: DateTime<Utc>,
    to: DateTime<Utc>,
    status: Option<&str>,
    b: &Batching,
  ) -> Result<Vec<Posting>> {
    let months = b
      .pool
      .run(month_ranges(since, to), |(from, until)| async move {
        paginate(Protocol::Offset, b.page_size, b.max_pages, move |req: PageRequest| async move {
          let mut filter = json!({ "since": iso_z(from), "to": iso_z(until) });
          if let Some(s) = status {
            filter["status"] = json!(s);
          }
          let body = json!({
            "dir": "DESC",
            "filter": filter,
            "limit": req.limit,
            "offset": req.offset,
            "translit": true,
            "with": { "analytics_data": false, "financial_data": false },
          });
          Ok(match self.post_best_effort::<FboPostingsResponse>(FBO_LIST, &body).await? {
            Some(r) => Page::new(r.result),
            None => Page::new(Vec::new()),
          })
        })
        .await
      })
      .await;

    let mut out = Vec::new();
    for m in months {
      out.extend(m?.items);
    }
    Ok(out)
  }

  /// FBS postings in `[since, to)`, paged by offset until `has_next` is false.
  pub async fn fbs_postings(
    &self,
    since: DateTime<Utc>,
    to: DateTime<Utc>,
    status: Option<&str>,
    b: &Batching,
  ) -> Result<Vec<Posting>> {
    self.fbs_list(since, to, status, false, b).await
  }

  /// FBS postings with their financial block (prices, actions, destination
  /// cluster).
  pub async fn fbs_postings_detailed(
    &self,
    since: DateTime<Utc>,
    to: DateTime<Utc>,
    b: &Batching,
  ) -> Result<Vec<Posting>> {
    self.fbs_list(since, to, None, true, b).await
  }

  async fn fbs_list(
    &self,
    since: DateTime<Utc>,
    to: DateTime<Utc>,
    status: Option<&str>,
    detailed: bool,
    b: &Batching,
  ) -> Result<Vec<Posting>> {
    let paged = paginate(Protocol::OffsetHasNext, b.page_size, b.max_pages, move |req: PageRequest| async move {
      let mut filter = json!({ "since": iso_z(since), "to": iso_z(to) });
      if let Some(s) = status {
        filter["status"] = json!(s);
      }
      let body = json!({
        "dir": "DESC",
        "filter": filter,
        "limit": req.limit,
        "offset": req.offset,
        "with": { "analytics_data": detailed, "financial_data": detailed },
      });
      Ok(match self.post_best_effort::<FbsPostingsResponse>(FBS_LIST, &body).await? {
        Some(r) => Page::new(r.result.postings).with_has_next(r.result.has_next),
        None => Page::new(Vec::new()),
      })
    })
    .await?;
    Ok(paged.items)
  }

  // ── returns & supplies ──

  /// Returns whose status changed in `[since, to]`, paged by the last item's id.
  pub async fn returns(
    &self,
    since: DateTime<Utc>,
    to: DateTime<Utc>,
    b: &Batching,
  ) -> Result<Paged<ReturnItem>> {
    paginate(Protocol::LastId, b.page_size, b.max_pages, move |req: PageRequest| async move {
      let last_id = req.cursor.as_deref().and_then(|c| c.parse::<i64>().ok()).unwrap_or(0);
      let body = json!({
        "filter": {
          "visual_status_change_moment": { "time_from": iso_z(since), "time_to": iso_z(to) },
        },
        "limit": req.limit,
        "last_id": last_id,
      });
      let Some(r) = self.post_best_effort::<ReturnsResponse>(RETURNS_LIST, &body).await? else {
        return Ok(Page::new(Vec::new()));
      };
      let next = r.returns.last().and_then(|it| it.id).filter(|id| *id != 0);
      let page = Page::new(r.returns);
      Ok(match next {
        Some(id) => page.with_cursor(id.to_string()),
        None => page,
      })
    })
    .await
  }

  /// Ids of supply orders in any of `states`, newest first.
  pub async fn supply_order_ids(&self, states: &[&str], b: &Batching) -> Result<Vec<i64>> {
    let paged = paginate(Protocol::Cursor, b.page_size, b.max_pages, move |req: PageRequest| async move {
      let mut body = json!({
        "filter": { "states": states },
        "limit": req.limit,
        "sort_by": "ORDER_CREATION",
        "sort_dir": "DESC",
      });
      if let Some(c) = req.cursor {
        body["last_id"] = json!(c);
      }
      Ok(match self.post_best_effort::<SupplyOrderListResponse>(SUPPLY_LIST, &body).await? {
        Some(r) => Page::new(r.order_ids).with_cursor(r.last_id),
        None => Page::new(Vec::new()),
      })
    })
    .await?;
    Ok(paged.items)
  }

  /// Supply-order details, [`SUPPLY_GET_CHUNK`] ids per call.
  pub async fn supply_orders(&self, order_ids: &[i64], b: &Batching) -> Result<Vec<SupplyOrder>> {
    self
      .chunked(
        SUPPLY_GET,
        order_ids,
        SUPPLY_GET_CHUNK.min(b.chunk_size.max(1)),
        b.pool,
        |ids| json!({ "order_ids": ids }),
        |r: SupplyOrderGetResponse| r.orders,
      )
      .await
  }

  // ── generated reports ──

  /// Request a placement (storage cost) report; returns its code.
  pub async fn create_placement_report(&self, date_from: NaiveDate, date_to: NaiveDate) -> Result<String> {
    let body = json!({
      "date_from": date_from.format("%Y-%m-%d").to_string(),
      "date_to": date_to.format("%Y-%m-%d").to_string(),
    });
    let resp: ReportCreateResponse = self.post(PLACEMENT_CREATE, &body).await?;
    if resp.code.is_empty() {
      return Err(ClientError::MissingField { path: PLACEMENT_CREATE.to_owned(), field: "code" });
    }
    Ok(resp.code)
  }

  pub async fn report_info(&self, code: &str) -> Result<ReportInfo> {
    let resp: ReportInfoResponse = self.post(REPORT_INFO, &json!({ "code": code })).await?;
    Ok(resp.result)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;
  use crate::{RetryPolicy, transport::{FnTransport, HttpResponse}};

  fn fast() -> RetryPolicy {
    RetryPolicy { max_attempts: 2, base_delay_ms: 1, max_delay_ms: 2, jitter_ms: 0 }
  }

  fn batching(chunk_size: usize, page_size: u64) -> Batching {
    Batching { chunk_size, page_size, max_pages: 50, pool: WorkerPool::new(3) }
  }

  fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap() }

  #[test]
  fn month_ranges_split_at_boundaries() {
    let ranges = month_ranges(utc(2024, 11, 20), utc(2025, 1, 10));
    assert_eq!(
      ranges,
      vec![
        (utc(2024, 11, 20), utc(2024, 12, 1)),
        (utc(2024, 12, 1), utc(2025, 1, 1)),
        (utc(2025, 1, 1), utc(2025, 1, 10)),
      ]
    );
    assert!(month_ranges(utc(2024, 1, 2), utc(2024, 1, 1)).is_empty());
  }

  #[tokio::test]
  async fn product_info_is_chunked_and_ordered() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let client = ApiClient::new(
      FnTransport::new(move |path, body| {
        assert_eq!(path, PRODUCT_INFO);
        let ids: Vec<i64> = serde_json::from_value(body["product_id"].clone()).unwrap();
        s.lock().unwrap().push(ids.len());
        let items: Vec<Value> = ids.iter().map(|id| json!({ "id": id, "offer_id": format!("o{id}") })).collect();
        Ok(HttpResponse::ok(&json!({ "items": items })))
      }),
      fast(),
    );

    let ids: Vec<i64> = (1..=25).collect();
    let out = client.product_info(&ids, &batching(10, 1000)).await.unwrap();
    assert_eq!(out.iter().map(|p| p.id.unwrap()).collect::<Vec<_>>(), ids);
    let mut sizes = seen.lock().unwrap().clone();
    sizes.sort();
    assert_eq!(sizes, vec![5, 10, 10]);
  }

  #[tokio::test]
  async fn exhausted_chunk_yields_nothing_but_others_survive() {
    let client = ApiClient::new(
      FnTransport::new(|_, body| {
        let first = body["product_id"][0].as_i64().unwrap();
        if first == 1 {
          Ok(HttpResponse::status(503))
        } else {
          Ok(HttpResponse::ok(&json!({ "items": [{ "id": first }] })))
        }
      }),
      fast(),
    );

    let out = client.product_info(&[1, 2, 3, 4], &batching(2, 1000)).await.unwrap();
    assert_eq!(out.iter().map(|p| p.id.unwrap()).collect::<Vec<_>>(), vec![3]);
    assert_eq!(client.stats().snapshot().exhausted, 1);
  }

  #[tokio::test]
  async fn fatal_chunk_fails_the_call() {
    let client = ApiClient::new(FnTransport::new(|_, _| Ok(HttpResponse::status(403))), fast());
    let err = client.product_prices(&[1, 2], &batching(1, 1000)).await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 403, .. }));
  }

  #[tokio::test]
  async fn prices_follow_the_cursor_inside_each_chunk() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let c = Arc::clone(&calls);
    let client = ApiClient::new(
      FnTransport::new(move |path, body| {
        assert_eq!(path, PRODUCT_PRICES);
        let first = body["filter"]["product_id"][0].as_i64().unwrap();
        let cursor = body["cursor"].as_str().unwrap().to_owned();
        c.lock().unwrap().push((first, cursor.clone()));
        let resp = match (first, cursor.as_str()) {
          (1, "") => json!({ "items": [{ "product_id": 1 }, { "product_id": 2 }], "cursor": "n1" }),
          (1, "n1") => json!({ "items": [{ "product_id": 9 }], "cursor": "" }),
          _ => json!({ "items": [{ "product_id": first }] }),
        };
        Ok(HttpResponse::ok(&resp))
      }),
      fast(),
    );

    let out = client.product_prices(&[1, 2, 3], &batching(2, 2)).await.unwrap();
    assert_eq!(out.iter().map(|p| p.product_id.unwrap()).collect::<Vec<_>>(), vec![1, 2, 9, 3]);
    assert_eq!(calls.lock().unwrap().len(), 3);
  }

  #[tokio::test]
  async fn returns_page_by_last_item_id() {
    let client = ApiClient::new(
      FnTransport::new(|_, body| {
        let last = body["last_id"].as_i64().unwrap();
        let page = match last {
          0 => json!([{ "id": 10 }, { "id": 11 }]),
          11 => json!([{ "id": 12 }]),
          _ => json!([]),
        };
        Ok(HttpResponse::ok(&json!({ "returns": page })))
      }),
      fast(),
    );
    let out = client.returns(utc(2024, 1, 1), utc(2024, 1, 31), &batching(10, 2)).await.unwrap();
    assert_eq!(out.items.iter().map(|r| r.id.unwrap()).collect::<Vec<_>>(), vec![10, 11, 12]);
    assert_eq!(out.pages, 3);
  }

  #[tokio::test]
  async fn fbs_postings_follow_has_next() {
    let client = ApiClient::new(
      FnTransport::new(|path, body| {
        assert_eq!(path, FBS_LIST);
        let offset = body["offset"].as_u64().unwrap();
        Ok(HttpResponse::ok(&json!({
          "result": {
            "postings": [{ "posting_number": format!("p{offset}") }],
            "has_next": offset == 0,
          }
        })))
      }),
      fast(),
    );
    let out = client
      .fbs_postings(utc(2024, 1, 1), utc(2024, 2, 1), Some("delivered"), &batching(10, 1))
      .await
      .unwrap();
    assert_eq!(out.iter().map(|p| p.posting_number.as_str()).collect::<Vec<_>>(), vec!["p0", "p1"]);
  }

  #[tokio::test]
  async fn fbo_postings_query_each_month() {
    let months = Arc::new(Mutex::new(Vec::new()));
    let m = Arc::clone(&months);
    let client = ApiClient::new(
      FnTransport::new(move |_, body| {
        m.lock().unwrap().push(body["filter"]["since"].as_str().unwrap().to_owned());
        Ok(HttpResponse::ok(&json!({ "result": [{ "posting_number": "x" }] })))
      }),
      fast(),
    );
    let out = client
      .fbo_postings(utc(2024, 1, 15), utc(2024, 3, 2), None, &batching(10, 1000))
      .await
      .unwrap();
    assert_eq!(out.len(), 3);
    let mut seen = months.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["2024-01-15T00:00:00Z", "2024-02-01T00:00:00Z", "2024-03-01T00:00:00Z"]);
  }

  #[tokio::test]
  async fn placement_report_without_code_is_fatal() {
    let client = ApiClient::new(FnTransport::new(|_, _| Ok(HttpResponse::ok(&json!({})))), fast());
    let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let err = client.create_placement_report(d, d).await.unwrap_err();
    assert!(matches!(err, ClientError::MissingField { field: "code", .. }));
  }
}
