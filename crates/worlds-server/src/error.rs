//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Client errors carry their message back to the caller. Infrastructure
//! failures are logged in full and answered with a generic body.

use axum::{
  Json,
  http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use worlds_core::{Error as CoreError, limits::Decision};

pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unsupported media type: {0}")]
  UnsupportedMediaType(String),

  #[error("no acceptable representation")]
  NotAcceptable,

  #[error("query timed out")]
  Timeout,

  #[error("rate limit exceeded")]
  RateLimited(Decision),

  #[error(transparent)]
  Core(#[from] CoreError),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Write `RateLimit-Remaining` and `RateLimit-Reset` (seconds from now).
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
  headers.insert(RATELIMIT_REMAINING, HeaderValue::from(decision.remaining_whole()));
  if let Some(secs) = reset_secs(decision) {
    headers.insert(RATELIMIT_RESET, HeaderValue::from(secs));
  }
}

fn reset_secs(decision: &Decision) -> Option<u64> {
  let reset_at = decision.reset_at?;
  let millis = (reset_at - Utc::now()).num_milliseconds().max(0);
  Some((millis as u64).div_ceil(1000))
}

fn core_status(e: &CoreError) -> StatusCode {
  match e {
    CoreError::WorldNotFound(_) => StatusCode::NOT_FOUND,
    CoreError::WorldExists(_) => StatusCode::CONFLICT,
    e if e.is_client_error() => StatusCode::BAD_REQUEST,
    CoreError::Cancelled | CoreError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::UnsupportedMediaType(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string()),
      ApiError::NotAcceptable => (StatusCode::NOT_ACCEPTABLE, self.to_string()),
      ApiError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
      ApiError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
      ApiError::Core(e) if e.is_client_error() => (core_status(e), e.to_string()),
      ApiError::Core(e) => {
        tracing::error!(error = %e, "request failed");
        let status = core_status(e);
        (status, status.canonical_reason().unwrap_or("error").to_owned())
      }
    };

    let mut res = (status, Json(json!({ "error": message }))).into_response();
    match &self {
      ApiError::Unauthorized => {
        res
          .headers_mut()
          .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer realm=\"worlds\""));
      }
      ApiError::RateLimited(decision) => {
        insert_rate_limit_headers(res.headers_mut(), decision);
        if let Some(secs) = reset_secs(decision) {
          res.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
      }
      _ => {}
    }
    res
  }
}
