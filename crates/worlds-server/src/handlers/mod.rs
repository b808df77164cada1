//! Route handlers. Each module covers one resource under `/v1`.

pub mod quads;
pub mod search;
pub mod sparql;
pub mod usage;
pub mod worlds;

use axum::{
  http::HeaderMap,
  response::{IntoResponse, Response},
};
use worlds_core::limits::Decision;

use crate::error::insert_rate_limit_headers;

/// Attach the rate-limit headers for `decision` to any response.
pub(crate) fn limited(decision: &Decision, body: impl IntoResponse) -> Response {
  let mut headers = HeaderMap::new();
  insert_rate_limit_headers(&mut headers, decision);
  (headers, body).into_response()
}
