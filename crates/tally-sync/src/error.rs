//! Error type for `tally-sync`.

use tally_client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("api error: {0}")]
  Client(#[from] ClientError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  /// Two merge sources write the same canonical column.
  #[error("invalid merge plan: {0}")]
  Plan(String),

  /// Settings that do not fit the sheet layout.
  #[error("invalid config: {0}")]
  Config(String),

  /// A generated report did not have the expected shape.
  #[error("unexpected report layout: {0}")]
  Layout(String),
}

impl SyncError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self { Self::Store(Box::new(e)) }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
