//! The search index the server runs with, chosen by configuration.

use worlds_core::{
  Graph, Patch, Result,
  search::{HashingEmbedder, NoopIndex, SearchHit, SearchIndex, SearchQuery},
};
use worlds_store_sqlite::SqliteChunkIndex;

pub enum SearchBackend {
  /// `search.enabled = false`: patches are discarded, searches find nothing.
  Disabled(NoopIndex),
  Chunks(SqliteChunkIndex<HashingEmbedder>),
}

impl SearchBackend {
  pub fn is_enabled(&self) -> bool { matches!(self, Self::Chunks(_)) }
}

impl SearchIndex for SearchBackend {
  async fn on_patch(&self, world_id: &str, patch: &Patch) -> Result<()> {
    match self {
      Self::Disabled(noop) => noop.on_patch(world_id, patch).await,
      Self::Chunks(index) => index.on_patch(world_id, patch).await,
    }
  }

  async fn rebuild(&self, world_id: &str, graph: &Graph) -> Result<()> {
    match self {
      Self::Disabled(noop) => noop.rebuild(world_id, graph).await,
      Self::Chunks(index) => index.rebuild(world_id, graph).await,
    }
  }

  async fn search(&self, world_id: &str, query: &SearchQuery) -> Result<Vec<SearchHit>> {
    match self {
      Self::Disabled(noop) => noop.search(world_id, query).await,
      Self::Chunks(index) => index.search(world_id, query).await,
    }
  }
}
