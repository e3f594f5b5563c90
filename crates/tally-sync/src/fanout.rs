//! Dimension-valued queries and the cluster slot table.
//!
//! Some endpoints answer for one dimension value (a logistics cluster) per
//! call, or for several at once when every result item says which value it
//! belongs to. [`fan_out`] packs values when it can and falls back to one call
//! per value when a packed answer cannot be split.

use std::{
  collections::{BTreeMap, HashSet},
  future::Future,
};

use tally_client::WorkerPool;
use tally_core::store::ReportStore;
use tracing::{debug, info, warn};

use crate::{Result, SyncError};

/// Results of a fan-out, grouped by dimension value.
#[derive(Debug)]
pub struct FanOut<R> {
  pub by_dim:    BTreeMap<i64, Vec<R>>,
  /// Calls issued, packed and fallback together.
  pub calls:     usize,
  /// Packed calls that had to be replayed per value.
  pub fallbacks: usize,
}

impl<R> FanOut<R> {
  pub fn items(&self, dim: i64) -> &[R] { self.by_dim.get(&dim).map(Vec::as_slice).unwrap_or(&[]) }
}

/// Query every value of `dims`, `pack_size` values per call.
///
/// `demux` reads the dimension value off a result item. A packed call whose
/// items carry no such value is discarded and its values are queried one by
/// one. Single-value calls are never demultiplexed.
pub async fn fan_out<R, F, Fut, D>(
  dims: &[i64],
  pack_size: usize,
  pool: WorkerPool,
  fetch: F,
  demux: D,
) -> Result<FanOut<R>>
where
  F: Fn(Vec<i64>) -> Fut,
  Fut: Future<Output = Result<Vec<R>>>,
  D: Fn(&R) -> Option<i64>,
{
  let mut seen = HashSet::new();
  let dims: Vec<i64> = dims.iter().copied().filter(|d| seen.insert(*d)).collect();
  let packs: Vec<Vec<i64>> = dims.chunks(pack_size.max(1)).map(<[i64]>::to_vec).collect();

  let fetch = &fetch;
  let packed = pool
    .run(packs, |pack| async move {
      let items = fetch(pack.clone()).await;
      (pack, items)
    })
    .await;

  let mut out = FanOut { by_dim: BTreeMap::new(), calls: 0, fallbacks: 0 };
  let mut replay = Vec::new();
  for (pack, items) in packed {
    out.calls += 1;
    let items = items?;
    if let [only] = pack.as_slice() {
      out.by_dim.entry(*only).or_default().extend(items);
      continue;
    }
    if !items.iter().any(|it| demux(it).is_some()) {
      debug!(pack = ?pack, "packed answer has no dimension field, querying one by one");
      out.fallbacks += 1;
      replay.extend(pack);
      continue;
    }
    let wanted: HashSet<i64> = pack.iter().copied().collect();
    let mut stray = 0usize;
    for it in items {
      match demux(&it) {
        Some(d) if wanted.contains(&d) => out.by_dim.entry(d).or_default().push(it),
        _ => stray += 1,
      }
    }
    if stray > 0 {
      warn!(stray, "packed answer had items outside the requested values");
    }
  }

  let single = pool
    .run(replay, |dim| async move { (dim, fetch(vec![dim]).await) })
    .await;
  for (dim, items) in single {
    out.calls += 1;
    out.by_dim.entry(dim).or_default().extend(items?);
  }
  Ok(out)
}

/// Bindings of `codes` to dimension values, in `codes` order.
///
/// Codes already bound keep their value. Unbound codes take, in order, the
/// loaded candidates not yet bound to another code, and the new bindings are
/// persisted. `load_candidates` is only called when some code is unbound.
/// Codes left without a candidate are absent from the result.
pub async fn assign_slots<S, F, Fut>(
  store: &S,
  shop_id: i64,
  codes: &[String],
  load_candidates: F,
) -> Result<Vec<(String, i64)>>
where
  S: ReportStore,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Vec<i64>>>,
{
  let mut bound = store.cluster_slots(shop_id, codes).await.map_err(SyncError::store)?;

  if codes.iter().any(|c| !bound.contains_key(c)) {
    let taken: HashSet<i64> = bound.values().copied().collect();
    let mut free = load_candidates().await?.into_iter().filter(|id| !taken.contains(id));
    let mut added = 0usize;
    for code in codes {
      if bound.contains_key(code) {
        continue;
      }
      let Some(id) = free.next() else { break };
      store.bind_cluster_slot(shop_id, code, id).await.map_err(SyncError::store)?;
      bound.insert(code.clone(), id);
      added += 1;
    }
    info!(shop_id, added, total = bound.len(), "cluster slots bound");
  }

  Ok(codes.iter().filter_map(|c| bound.get(c).map(|id| (c.clone(), *id))).collect())
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  };

  use tally_store_sqlite::SqliteStore;

  use super::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Item {
    cluster: Option<i64>,
    value:   i64,
  }

  #[tokio::test]
  async fn packed_answer_without_field_falls_back_per_value() {
    let requests = Mutex::new(Vec::new());
    let requests = &requests;
    let out = fan_out(
      &[1, 2, 3],
      10,
      WorkerPool::new(2),
      |pack| async move {
        requests.lock().unwrap().push(pack.clone());
        Ok(pack.iter().map(|d| Item { cluster: None, value: d * 10 }).collect::<Vec<_>>())
      },
      |it: &Item| it.cluster,
    )
    .await
    .unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0], vec![1, 2, 3]);
    let mut singles: Vec<_> = requests[1..].to_vec();
    singles.sort();
    assert_eq!(singles, vec![vec![1], vec![2], vec![3]]);
    assert_eq!(out.calls, 4);
    assert_eq!(out.fallbacks, 1);
    assert_eq!(out.items(2), &[Item { cluster: None, value: 20 }]);
  }

  #[tokio::test]
  async fn demultiplexes_packed_answers() {
    let calls = AtomicUsize::new(0);
    let calls = &calls;
    let out = fan_out(
      &[7, 8, 7],
      10,
      WorkerPool::new(1),
      |pack| async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(pack.iter().map(|d| Item { cluster: Some(*d), value: *d }).collect::<Vec<_>>())
      },
      |it: &Item| it.cluster,
    )
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(out.fallbacks, 0);
    assert_eq!(out.items(7).len(), 1);
    assert_eq!(out.items(8)[0].value, 8);
    assert!(out.items(9).is_empty());
  }

  #[tokio::test]
  async fn slots_are_populated_once() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let codes: Vec<String> = ["AM", "AN", "AO"].iter().map(|s| s.to_string()).collect();
    let loads = AtomicUsize::new(0);

    let first = assign_slots(&store, 1, &codes, || async {
      loads.fetch_add(1, Ordering::SeqCst);
      Ok(vec![501, 502, 503, 504])
    })
    .await
    .unwrap();
    assert_eq!(
      first,
      vec![("AM".to_string(), 501), ("AN".to_string(), 502), ("AO".to_string(), 503)]
    );

    let second = assign_slots(&store, 1, &codes, || async {
      loads.fetch_add(1, Ordering::SeqCst);
      Ok(vec![999, 998, 997])
    })
    .await
    .unwrap();
    assert_eq!(second, first);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn new_codes_skip_taken_values() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store.bind_cluster_slot(1, "AN", 501).await.unwrap();
    let codes: Vec<String> = ["AM", "AN"].iter().map(|s| s.to_string()).collect();

    let slots = assign_slots(&store, 1, &codes, || async { Ok(vec![501, 502]) }).await.unwrap();
    assert_eq!(slots, vec![("AM".to_string(), 502), ("AN".to_string(), 501)]);
  }
}
