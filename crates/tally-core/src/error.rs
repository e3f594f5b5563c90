//! Error types for `tally-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("bad column key: {0:?}")]
  BadColumn(String),

  #[error("unknown data type: {0:?}")]
  UnknownDataType(String),

  #[error("unknown sync status: {0:?}")]
  UnknownStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
