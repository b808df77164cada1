//! Handlers for `/worlds` endpoints.
//!
//! | Method   | Path                     | Notes |
//! |----------|--------------------------|-------|
//! | `GET`    | `/worlds`                | The caller's worlds |
//! | `POST`   | `/worlds`                | Body: `{"world_id":"…","description":"…"}` |
//! | `GET`    | `/worlds/{id}`           | Metadata; 404 if absent or not owned |
//! | `DELETE` | `/worlds/{id}`           | Irreversible |
//! | `POST`   | `/worlds/{id}/reindex`   | Rebuild search chunks |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use worlds_core::store::{WorldMetadata, WorldRecord};

use crate::{AppState, auth::Principal, error::Result};

/// `GET /worlds`
pub async fn list(
  State(state): State<AppState>,
  who: Principal,
) -> Result<Json<Vec<WorldRecord>>> {
  Ok(Json(state.service.list_worlds(&who).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub world_id:    String,
  #[serde(default)]
  pub description: Option<String>,
}

/// `POST /worlds`
pub async fn create(
  State(state): State<AppState>,
  who: Principal,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse> {
  let record = state.service.create_world(&who, body.world_id, body.description).await?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /worlds/{id}`
pub async fn get_one(
  State(state): State<AppState>,
  who: Principal,
  Path(id): Path<String>,
) -> Result<Json<WorldMetadata>> {
  Ok(Json(state.service.metadata(&who, &id).await?))
}

/// `DELETE /worlds/{id}`
pub async fn delete_one(
  State(state): State<AppState>,
  who: Principal,
  Path(id): Path<String>,
) -> Result<StatusCode> {
  state.service.remove(&who, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /worlds/{id}/reindex`
pub async fn reindex(
  State(state): State<AppState>,
  who: Principal,
  Path(id): Path<String>,
) -> Result<impl IntoResponse> {
  let quads = state.service.reindex(&who, &id).await?;
  Ok(Json(json!({ "quads": quads })))
}
