//! Handler for `GET /worlds/{id}/search`.

use axum::{
  Json,
  extract::{Path, Query, State},
  response::Response,
};
use serde::Deserialize;
use worlds_core::search::SearchQuery;

use super::limited;
use crate::{AppState, auth::Principal, error::Result};

/// Hard cap on `limit`.
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  pub q:     String,
  pub limit: Option<usize>,
}

/// `GET /worlds/{id}/search?q=<text>[&limit=<n>]`
pub async fn handler(
  State(state): State<AppState>,
  who: Principal,
  Path(id): Path<String>,
  Query(params): Query<SearchParams>,
) -> Result<Response> {
  let query = SearchQuery {
    text:  params.q,
    limit: params.limit.unwrap_or(10).min(MAX_LIMIT),
  };
  let out = state.service.search(&who, &id, &query).await?;
  Ok(limited(&out.decision, Json(out.value)))
}
