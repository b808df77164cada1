//! HTTP layer for the Worlds graph service.
//!
//! Exposes an axum [`Router`] with the SPARQL endpoint, world management,
//! quad import/export and search, backed by the SQLite storage crate.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod index;
pub mod service;

pub use error::ApiError;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use worlds_core::{
  limits::{PolicyTable, RateLimiter},
  search::{DEFAULT_CHUNK_SIZE, DEFAULT_DIMENSIONS, HashingEmbedder, NoopIndex},
};
use worlds_store_sqlite::{
  DatabaseManager, SqliteBucketStore, SqliteChunkIndex, SqliteUsageMeter, SqliteWorldStore,
};

use auth::{ApiKeyConfig, AuthConfig};
use handlers::{quads, search, sparql, usage, worlds};
use index::SearchBackend;
use service::WorldService;

/// `data_dir` value that keeps every database in memory.
pub const IN_MEMORY: &str = ":memory:";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `WORLDS_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:             String,
  #[serde(default = "default_port")]
  pub port:             u16,
  /// Storage root, or `:memory:`.
  #[serde(default = "default_data_dir")]
  pub data_dir:         PathBuf,
  #[serde(default = "default_query_timeout_ms")]
  pub query_timeout_ms: u64,
  #[serde(default = "default_max_body_bytes")]
  pub max_body_bytes:   usize,
  #[serde(default)]
  pub search:           SearchConfig,
  #[serde(default)]
  pub api_keys:         Vec<ApiKeyConfig>,
  /// Rate-limit policies; the built-in table when absent.
  #[serde(default)]
  pub plans:            Option<PolicyTable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
  #[serde(default = "default_true")]
  pub enabled:    bool,
  #[serde(default = "default_dimensions")]
  pub dimensions: usize,
  #[serde(default = "default_chunk_size")]
  pub chunk_size: usize,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 7878 }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_query_timeout_ms() -> u64 { 30_000 }
fn default_max_body_bytes() -> usize { 16 * 1024 * 1024 }
fn default_true() -> bool { true }
fn default_dimensions() -> usize { DEFAULT_DIMENSIONS }
fn default_chunk_size() -> usize { DEFAULT_CHUNK_SIZE }

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      enabled:    true,
      dimensions: DEFAULT_DIMENSIONS,
      chunk_size: DEFAULT_CHUNK_SIZE,
    }
  }
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:             default_host(),
      port:             default_port(),
      data_dir:         default_data_dir(),
      query_timeout_ms: default_query_timeout_ms(),
      max_body_bytes:   default_max_body_bytes(),
      search:           SearchConfig::default(),
      api_keys:         Vec::new(),
      plans:            None,
    }
  }
}

impl ServerConfig {
  pub fn in_memory(&self) -> bool { self.data_dir == Path::new(IN_MEMORY) }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState {
  pub service: Arc<WorldService>,
  pub auth:    Arc<AuthConfig>,
  pub config:  Arc<ServerConfig>,
}

impl AppState {
  /// Open storage as configured and wire up the service.
  pub async fn open(config: ServerConfig) -> worlds_store_sqlite::Result<Self> {
    let manager = Arc::new(if config.in_memory() {
      DatabaseManager::open_in_memory().await?
    } else {
      DatabaseManager::open(&config.data_dir).await?
    });

    let index = if config.search.enabled {
      SearchBackend::Chunks(
        SqliteChunkIndex::new(Arc::clone(&manager), HashingEmbedder::new(config.search.dimensions))
          .with_chunk_size(config.search.chunk_size),
      )
    } else {
      SearchBackend::Disabled(NoopIndex)
    };
    tracing::info!(search = index.is_enabled(), in_memory = config.in_memory(), "opening world service");

    let service = WorldService::new(
      SqliteWorldStore::new(Arc::clone(&manager)),
      index,
      RateLimiter::new(SqliteBucketStore::new(&manager)),
      SqliteUsageMeter::new(&manager),
      config.plans.clone().unwrap_or_default(),
      Duration::from_millis(config.query_timeout_ms),
    );

    Ok(Self {
      service: Arc::new(service),
      auth:    Arc::new(AuthConfig::new(&config.api_keys)),
      config:  Arc::new(config),
    })
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the service.
pub fn router(state: AppState) -> Router {
  let v1 = Router::new()
    .route("/worlds",                get(worlds::list).post(worlds::create))
    .route("/worlds/{id}",           get(worlds::get_one).delete(worlds::delete_one))
    .route("/worlds/{id}/quads",     get(quads::export).put(quads::set).post(quads::add))
    .route("/worlds/{id}/sparql",    get(sparql::get).post(sparql::post))
    .route("/worlds/{id}/search",    get(search::handler))
    .route("/worlds/{id}/reindex",   post(worlds::reindex))
    .route("/usage",                 get(usage::handler));

  Router::new()
    .nest("/v1", v1)
    .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
