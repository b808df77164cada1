//! Handlers for the SPARQL endpoint, `/worlds/{id}/sparql`.
//!
//! | Request | Form |
//! |---------|------|
//! | `GET ?query=…` / `POST ?query=…` | detected |
//! | `GET ?update=…` / `POST ?update=…` | update |
//! | `POST` `application/sparql-query` body | query |
//! | `POST` `application/sparql-update` body | update |
//! | `POST` `application/x-www-form-urlencoded` `query=` / `update=` | as above |
//!
//! Query results are `application/sparql-results+json`; updates answer
//! `204 No Content`.

use axum::{
  Form, Json,
  extract::{FromRequest, Path, Query, Request, State},
  http::{StatusCode, header},
  response::Response,
};
use serde::Deserialize;
use worlds_core::result::SPARQL_RESULTS_JSON;
use worlds_sparql::QueryForm;

use super::limited;
use crate::{
  AppState,
  auth::Principal,
  error::{ApiError, Result},
};

const SPARQL_QUERY: &str = "application/sparql-query";
const SPARQL_UPDATE: &str = "application/sparql-update";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Deserialize, Default)]
pub struct SparqlParams {
  pub query:  Option<String>,
  pub update: Option<String>,
}

impl SparqlParams {
  fn into_request(self) -> Option<(String, Option<QueryForm>)> {
    match (self.query, self.update) {
      (Some(query), None) => Some((query, None)),
      (None, Some(update)) => Some((update, Some(QueryForm::Update))),
      _ => None,
    }
  }
}

fn missing() -> ApiError {
  ApiError::BadRequest("expected exactly one of `query` or `update`".to_owned())
}

async fn run(
  state: &AppState,
  who: &Principal,
  id: &str,
  text: &str,
  form: Option<QueryForm>,
) -> Result<Response> {
  let out = state.service.sparql(who, id, text, form).await?;
  Ok(match out.value.to_wire() {
    Some(wire) => {
      limited(&out.decision, ([(header::CONTENT_TYPE, SPARQL_RESULTS_JSON)], Json(wire)))
    }
    None => limited(&out.decision, StatusCode::NO_CONTENT),
  })
}

/// `GET /worlds/{id}/sparql?query=…`
pub async fn get(
  State(state): State<AppState>,
  who: Principal,
  Path(id): Path<String>,
  Query(params): Query<SparqlParams>,
) -> Result<Response> {
  let (text, form) = params.into_request().ok_or_else(missing)?;
  run(&state, &who, &id, &text, form).await
}

/// `POST /worlds/{id}/sparql`
pub async fn post(
  State(state): State<AppState>,
  who: Principal,
  Path(id): Path<String>,
  Query(params): Query<SparqlParams>,
  req: Request,
) -> Result<Response> {
  let content_type = req
    .headers()
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(';').next())
    .map(|v| v.trim().to_ascii_lowercase());

  let (text, form) = match content_type.as_deref() {
    Some(SPARQL_QUERY) => (body_text(req).await?, Some(QueryForm::Query)),
    Some(SPARQL_UPDATE) => (body_text(req).await?, Some(QueryForm::Update)),
    Some(FORM_URLENCODED) => {
      let Form(fields) = Form::<SparqlParams>::from_request(req, &())
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
      fields.into_request().ok_or_else(missing)?
    }
    other => match params.into_request() {
      Some(request) => request,
      None => {
        return Err(ApiError::UnsupportedMediaType(other.unwrap_or("none").to_owned()));
      }
    },
  };
  run(&state, &who, &id, &text, form).await
}

async fn body_text(req: Request) -> Result<String> {
  String::from_request(req, &())
    .await
    .map_err(|e| ApiError::BadRequest(e.body_text()))
}
