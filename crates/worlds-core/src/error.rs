//! Error taxonomy shared by every Worlds crate.
//!
//! Variants fall into three classes: client errors (bad input, never
//! retried), infrastructure errors (retryable by the caller) and
//! `RateLimiterExhaustedRetries`, which is fatal but still infrastructure.
//! Quota denial is not an error at all; see [`crate::limits::Decision`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed RDF: {0}")]
  MalformedRdf(String),

  #[error("format {0} cannot represent named graphs")]
  UnsupportedGraph(&'static str),

  #[error("invalid term: {0}")]
  InvalidTerm(String),

  #[error("SPARQL syntax error: {0}")]
  SparqlSyntax(String),

  #[error("unsupported query form: {0}")]
  UnsupportedQueryForm(String),

  #[error("SPARQL evaluation error: {0}")]
  Evaluation(String),

  #[error("query cancelled")]
  Cancelled,

  #[error("world not found: {0}")]
  WorldNotFound(String),

  #[error("invalid world id: {0:?}")]
  InvalidWorldId(String),

  #[error("world already exists: {0}")]
  WorldExists(String),

  #[error("storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("rate limiter could not commit bucket {0} after {1} attempts")]
  RateLimiterExhaustedRetries(String, usize),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// True for errors caused by the request itself (4xx-equivalent).
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      Self::MalformedRdf(_)
        | Self::UnsupportedGraph(_)
        | Self::InvalidTerm(_)
        | Self::SparqlSyntax(_)
        | Self::UnsupportedQueryForm(_)
        | Self::Evaluation(_)
        | Self::WorldNotFound(_)
        | Self::InvalidWorldId(_)
        | Self::WorldExists(_)
    )
  }

  /// True for infrastructure failures the caller may retry.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::StorageUnavailable(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
