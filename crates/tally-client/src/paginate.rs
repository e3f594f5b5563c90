//! Generic pagination driver.
//!
//! The API uses three paging styles. The driver owns the termination rules
//! so each endpoint helper only has to map one page request to one page.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

/// How the next page is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
  /// `offset += limit`; stop on a short page.
  Offset,
  /// `offset += limit`; stop when the response's `has_next` is not true.
  OffsetHasNext,
  /// Opaque token returned by each page; stop on absent, repeated or short.
  Cursor,
  /// Watermark taken from the last item's id; stop on absent or repeated.
  LastId,
}

/// What the driver asks the endpoint for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
  pub offset: u64,
  pub limit:  u64,
  /// `None` on the first page of cursor/last-id protocols.
  pub cursor: Option<String>,
}

/// One page as returned by the endpoint.
#[derive(Debug, Clone)]
pub struct Page<T> {
  pub items:    Vec<T>,
  pub has_next: Option<bool>,
  pub cursor:   Option<String>,
}

impl<T> Page<T> {
  pub fn new(items: Vec<T>) -> Self { Self { items, has_next: None, cursor: None } }

  pub fn with_has_next(mut self, has_next: bool) -> Self {
    self.has_next = Some(has_next);
    self
  }

  pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
    let c = cursor.into();
    self.cursor = if c.is_empty() { None } else { Some(c) };
    self
  }
}

/// All items fetched, plus how the loop ended.
#[derive(Debug, Clone)]
pub struct Paged<T> {
  pub items:     Vec<T>,
  pub pages:     usize,
  /// The page cap was hit before the source ran out.
  pub truncated: bool,
}

/// Fetch pages until a termination condition holds.
pub async fn paginate<T, F, Fut>(
  protocol: Protocol,
  limit: u64,
  max_pages: usize,
  mut fetch: F,
) -> Result<Paged<T>>
where
  F: FnMut(PageRequest) -> Fut,
  Fut: Future<Output = Result<Page<T>>>,
{
  let mut items = Vec::new();
  let mut request = PageRequest { offset: 0, limit, cursor: None };
  let mut pages = 0;

  loop {
    if pages >= max_pages {
      warn!(?protocol, pages, "pagination cap reached");
      return Ok(Paged { items, pages, truncated: true });
    }

    let page = fetch(request.clone()).await?;
    pages += 1;
    let count = page.items.len() as u64;
    if count == 0 {
      break;
    }
    items.extend(page.items);

    match protocol {
      Protocol::Offset => {
        if count < limit {
          break;
        }
        request.offset += limit;
      }
      Protocol::OffsetHasNext => {
        if page.has_next != Some(true) {
          break;
        }
        request.offset += limit;
      }
      Protocol::Cursor | Protocol::LastId => {
        let Some(next) = page.cursor else { break };
        if request.cursor.as_deref() == Some(next.as_str()) {
          warn!(?protocol, cursor = %next, "cursor repeated, stopping");
          break;
        }
        if protocol == Protocol::Cursor && count < limit {
          break;
        }
        request.cursor = Some(next);
      }
    }
  }

  Ok(Paged { items, pages, truncated: false })
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  #[tokio::test]
  async fn repeated_cursor_terminates() {
    let script = ["c1", "c2", "c2", "c3"];
    let seen = &Mutex::new(Vec::new());
    let out = paginate(Protocol::Cursor, 2, 100, move |req| async move {
      let mut seen = seen.lock().unwrap();
      let i = seen.len();
      seen.push(req.cursor.clone());
      Ok(Page::new(vec![i, i]).with_cursor(script[i]))
    })
    .await
    .unwrap();

    assert_eq!(out.pages, 3);
    assert_eq!(
      *seen.lock().unwrap(),
      vec![None, Some("c1".to_string()), Some("c2".to_string())]
    );
    assert!(!out.truncated);
  }

  #[tokio::test]
  async fn offset_stops_on_short_page() {
    let out = paginate(Protocol::Offset, 3, 100, |req| async move {
      let n = if req.offset < 6 { 3 } else { 1 };
      Ok(Page::new((0..n).map(|i| req.offset + i).collect()))
    })
    .await
    .unwrap();
    assert_eq!(out.items, vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(out.pages, 3);
  }

  #[tokio::test]
  async fn has_next_false_stops() {
    let out = paginate(Protocol::OffsetHasNext, 2, 100, |req| async move {
      Ok(Page::new(vec![req.offset, req.offset + 1]).with_has_next(req.offset < 2))
    })
    .await
    .unwrap();
    assert_eq!(out.items.len(), 4);
  }

  #[tokio::test]
  async fn empty_page_stops() {
    let out = paginate(Protocol::LastId, 2, 100, |req| async move {
      Ok(match req.cursor {
        None => Page::new(vec![1u64]).with_cursor("1"),
        Some(_) => Page::new(vec![]),
      })
    })
    .await
    .unwrap();
    assert_eq!(out.items, vec![1]);
    assert_eq!(out.pages, 2);
  }

  #[tokio::test]
  async fn cap_truncates() {
    let out = paginate(Protocol::Offset, 1, 5, |req| async move { Ok(Page::new(vec![req.offset])) })
      .await
      .unwrap();
    assert_eq!(out.pages, 5);
    assert!(out.truncated);
  }
}
