//! Handler for `GET /usage`.

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use worlds_core::usage::UsageTotals;

use crate::{AppState, auth::Principal, error::Result};

#[derive(Debug, Deserialize, Default)]
pub struct UsageParams {
  /// Defaults to 30 days ago.
  pub since: Option<DateTime<Utc>>,
}

/// `GET /usage[?since=<rfc3339>]`: the caller's totals per resource kind.
pub async fn handler(
  State(state): State<AppState>,
  who: Principal,
  Query(params): Query<UsageParams>,
) -> Result<Json<UsageTotals>> {
  let since = params.since.unwrap_or_else(|| Utc::now() - Duration::days(30));
  Ok(Json(state.service.usage(&who, since).await?))
}
