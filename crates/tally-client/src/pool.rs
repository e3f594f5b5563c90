//! Bounded concurrency for independent API batches.

use std::future::Future;

use futures::{StreamExt as _, stream};

/// Runs up to `size` futures at once and returns results in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
  size: usize,
}

impl WorkerPool {
  pub fn new(size: usize) -> Self { Self { size: size.max(1) } }

  pub fn size(&self) -> usize { self.size }

  /// Apply `f` to every input with bounded parallelism.
  pub async fn run<I, F, Fut, T>(&self, inputs: I, f: F) -> Vec<T>
  where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
  {
    stream::iter(inputs).map(f).buffered(self.size).collect().await
  }
}

/// Split `items` into owned chunks of at most `size`.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
  items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
  };

  use super::*;

  #[test]
  fn chunks_cover_input() {
    let v: Vec<u32> = (0..2_501).collect();
    let parts = chunk(&v, 1_000);
    assert_eq!(parts.iter().map(Vec::len).collect::<Vec<_>>(), vec![1_000, 1_000, 501]);
    assert!(chunk::<u32>(&[], 10).is_empty());
  }

  #[tokio::test]
  async fn bounded_and_ordered() {
    let pool = WorkerPool::new(3);
    let active = &AtomicUsize::new(0);
    let peak = &AtomicUsize::new(0);

    let out = pool
      .run(0..12u64, move |i| async move {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(12 - i)).await;
        active.fetch_sub(1, Ordering::SeqCst);
        i * 2
      })
      .await;

    assert_eq!(out, (0..12u64).map(|i| i * 2).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= 3);
  }
}
