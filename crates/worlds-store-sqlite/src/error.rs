//! Error type for `worlds-store-sqlite`.
//!
//! Everything except wrapped core errors is an infrastructure failure and
//! surfaces to callers as [`worlds_core::Error::StorageUnavailable`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] worlds_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row no longer decodes into a domain value.
  #[error("corrupt row: {0}")]
  CorruptRow(String),
}

impl From<Error> for worlds_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      other => worlds_core::Error::StorageUnavailable(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
