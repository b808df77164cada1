//! Bearer API-key extractor and standalone verifier.
//!
//! Keys are never stored: configuration holds the hex SHA-256 of each key,
//! and a presented key is hashed before lookup.

use std::collections::HashMap;

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use serde::Deserialize;
use sha2::{Digest as _, Sha256};

use crate::{AppState, error::ApiError};

/// One configured key.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
  pub principal:  String,
  /// Lowercase hex SHA-256 of the bearer token.
  pub key_sha256: String,
  #[serde(default)]
  pub plan:       Option<String>,
}

/// The authenticated caller. Present in a handler means the request carried
/// a valid key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
  pub name: String,
  pub plan: Option<String>,
}

/// Key hash → principal.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
  keys: HashMap<String, Principal>,
}

impl AuthConfig {
  pub fn new(keys: &[ApiKeyConfig]) -> Self {
    let keys = keys
      .iter()
      .map(|k| {
        (k.key_sha256.trim().to_ascii_lowercase(), Principal {
          name: k.principal.clone(),
          plan: k.plan.clone(),
        })
      })
      .collect();
    Self { keys }
  }

  pub fn is_empty(&self) -> bool { self.keys.is_empty() }
}

/// Hex SHA-256 of a key, as expected in `api_keys[].key_sha256`.
pub fn hash_key(key: &str) -> String { hex::encode(Sha256::digest(key.as_bytes())) }

/// Verify credentials directly from headers.
pub fn verify_bearer(headers: &HeaderMap, config: &AuthConfig) -> Result<Principal, ApiError> {
  let token = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .ok_or(ApiError::Unauthorized)?;

  config.keys.get(&hash_key(token)).cloned().ok_or(ApiError::Unauthorized)
}

impl FromRequestParts<AppState> for Principal {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState,
  ) -> Result<Self, Self::Rejection> {
    verify_bearer(&parts.headers, &state.auth)
  }
}
