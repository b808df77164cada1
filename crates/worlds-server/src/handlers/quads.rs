//! Handlers for `/worlds/{id}/quads`: whole-graph export and import.
//!
//! The response format comes from `?format=` when given, otherwise from
//! `Accept`. The request format comes from `?format=` or `Content-Type`;
//! a body without either is read as N-Quads.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, header},
  response::Response,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use worlds_rdf::{Format, negotiate};

use super::limited;
use crate::{
  AppState,
  auth::Principal,
  error::{ApiError, Result},
  service::ImportMode,
};

#[derive(Debug, Deserialize, Default)]
pub struct FormatParams {
  /// Short name or extension, e.g. `turtle` or `ttl`.
  pub format: Option<String>,
}

fn named(name: &str) -> Result<Format> {
  Format::from_name(name).ok_or_else(|| ApiError::BadRequest(format!("unknown format {name:?}")))
}

fn response_format(params: &FormatParams, headers: &HeaderMap) -> Result<Format> {
  if let Some(name) = &params.format {
    return named(name);
  }
  let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
  negotiate(accept).ok_or(ApiError::NotAcceptable)
}

fn request_format(params: &FormatParams, headers: &HeaderMap) -> Result<Format> {
  if let Some(name) = &params.format {
    return named(name);
  }
  match headers.get(header::CONTENT_TYPE) {
    None => Ok(Format::NQuads),
    Some(value) => {
      let value = value.to_str().unwrap_or_default();
      Format::from_media_type(value)
        .ok_or_else(|| ApiError::UnsupportedMediaType(value.to_owned()))
    }
  }
}

/// `GET /worlds/{id}/quads`
pub async fn export(
  State(state): State<AppState>,
  who: Principal,
  Path(id): Path<String>,
  Query(params): Query<FormatParams>,
  headers: HeaderMap,
) -> Result<Response> {
  let format = response_format(&params, &headers)?;
  let out = state.service.export(&who, &id, format).await?;
  Ok(limited(&out.decision, ([(header::CONTENT_TYPE, format.media_type())], out.value)))
}

async fn import(
  state: AppState,
  who: Principal,
  id: String,
  params: FormatParams,
  headers: HeaderMap,
  body: Bytes,
  mode: ImportMode,
) -> Result<Response> {
  let format = request_format(&params, &headers)?;
  let out = state.service.import(&who, &id, &body, format, mode).await?;
  let key = match mode {
    ImportMode::Set => "quads",
    ImportMode::Add => "added",
  };
  Ok(limited(&out.decision, Json(json!({ key: out.value }))))
}

/// `PUT /worlds/{id}/quads`: replace the world's quads with the body.
pub async fn set(
  State(state): State<AppState>,
  who: Principal,
  Path(id): Path<String>,
  Query(params): Query<FormatParams>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Response> {
  import(state, who, id, params, headers, body, ImportMode::Set).await
}

/// `POST /worlds/{id}/quads`: add the body's quads.
pub async fn add(
  State(state): State<AppState>,
  who: Principal,
  Path(id): Path<String>,
  Query(params): Query<FormatParams>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Response> {
  import(state, who, id, params, headers, body, ImportMode::Add).await
}
