//! The `WorldStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `worlds-store-sqlite`).
//! Higher layers depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  graph::Graph,
  term::Quad,
};

// ─── World identity ──────────────────────────────────────────────────────────

/// Longest accepted world id; ids double as file names.
pub const MAX_WORLD_ID_LEN: usize = 64;

/// Check that `id` is usable as a world id: 1–64 ASCII letters, digits,
/// `-` or `_`.
pub fn validate_world_id(id: &str) -> Result<()> {
  let ok = !id.is_empty()
    && id.len() <= MAX_WORLD_ID_LEN
    && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
  if ok { Ok(()) } else { Err(Error::InvalidWorldId(id.to_owned())) }
}

/// Registry entry for a world, as stored in the system database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldRecord {
  pub world_id:    String,
  pub description: Option<String>,
  pub created_by:  String,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// A registry entry plus its live statement count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMetadata {
  pub world_id:     String,
  pub triple_count: u64,
  pub created_at:   DateTime<Utc>,
  pub created_by:   String,
  pub updated_at:   DateTime<Utc>,
  pub description:  Option<String>,
}

impl WorldMetadata {
  pub fn from_record(record: WorldRecord, triple_count: u64) -> Self {
    Self {
      world_id: record.world_id,
      triple_count,
      created_at: record.created_at,
      created_by: record.created_by,
      updated_at: record.updated_at,
      description: record.description,
    }
  }
}

/// Input to [`WorldStore::create_world`].
#[derive(Debug, Clone)]
pub struct NewWorld {
  pub world_id:    String,
  pub description: Option<String>,
  pub created_by:  String,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the persisted quads of every world.
///
/// Each world is stored in its own storage unit; implementations must never
/// let one world's rows leak into another's reads.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait WorldStore: Send + Sync {
  /// Register a world. Fails with [`Error::WorldExists`] if the id is taken.
  fn create_world(
    &self,
    input: NewWorld,
  ) -> impl Future<Output = Result<WorldRecord>> + Send + '_;

  /// The registry entry, or `None` if the world was never registered or has
  /// been removed.
  fn get_world<'a>(
    &'a self,
    world_id: &'a str,
  ) -> impl Future<Output = Result<Option<WorldRecord>>> + Send + 'a;

  /// Worlds created by `owner`, oldest first.
  fn list_worlds<'a>(
    &'a self,
    owner: &'a str,
  ) -> impl Future<Output = Result<Vec<WorldRecord>>> + Send + 'a;

  /// Read every persisted quad. A world with no storage unit yet is empty,
  /// not an error.
  fn load<'a>(
    &'a self,
    world_id: &'a str,
  ) -> impl Future<Output = Result<Graph>> + Send + 'a;

  /// Atomically swap the world's quads for `graph`.
  fn replace<'a>(
    &'a self,
    world_id: &'a str,
    graph: &'a Graph,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  /// Insert quads, ignoring duplicates. Provisions the world's storage unit
  /// and registry entry if absent. Returns the number of new rows.
  fn append_quads<'a>(
    &'a self,
    world_id: &'a str,
    created_by: &'a str,
    quads: &'a [Quad],
  ) -> impl Future<Output = Result<u64>> + Send + 'a;

  fn count_quads<'a>(
    &'a self,
    world_id: &'a str,
  ) -> impl Future<Output = Result<u64>> + Send + 'a;

  /// Registry entry plus statement count; `WorldNotFound` if unregistered.
  fn metadata<'a>(
    &'a self,
    world_id: &'a str,
  ) -> impl Future<Output = Result<WorldMetadata>> + Send + 'a;

  /// Delete all rows and the registry entry. Irreversible.
  fn remove<'a>(
    &'a self,
    world_id: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a;
}
