//! [`SqliteChunkIndex`]: search chunks stored beside each world's quads.

use std::{collections::HashSet, sync::Arc};

use worlds_core::{
  Graph, Patch, Quad, Result as CoreResult,
  search::{
    DEFAULT_CHUNK_SIZE, Embedder, SearchHit, SearchIndex, SearchQuery, cosine_similarity,
    derive_chunks, quad_id, tokenize,
  },
};

use crate::{
  DatabaseManager, Result,
  encode::{ChunkRow, RawChunk, decode_embedding, decode_node},
};

const INSERT_CHUNK: &str = "INSERT OR REPLACE INTO chunks (
    chunk_id, quad_id, subject, predicate, text, embedding
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

fn insert_chunk(stmt: &mut rusqlite::Statement<'_>, row: &ChunkRow) -> rusqlite::Result<usize> {
  stmt.execute(rusqlite::params![
    row.chunk_id,
    row.quad_id,
    row.subject,
    row.predicate,
    row.text,
    row.embedding,
  ])
}

/// Embedding search over literal text, one `chunks` table per world.
pub struct SqliteChunkIndex<E> {
  manager:    Arc<DatabaseManager>,
  embedder:   E,
  chunk_size: usize,
}

impl<E: Embedder> SqliteChunkIndex<E> {
  pub fn new(manager: Arc<DatabaseManager>, embedder: E) -> Self {
    Self { manager, embedder, chunk_size: DEFAULT_CHUNK_SIZE }
  }

  pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
    self.chunk_size = chunk_size.max(1);
    self
  }

  fn chunk_rows<'q>(&self, quads: impl IntoIterator<Item = &'q Quad>) -> Result<Vec<ChunkRow>> {
    let embedder: &dyn Embedder = &self.embedder;
    quads
      .into_iter()
      .flat_map(|q| derive_chunks(q, self.chunk_size, Some(embedder)))
      .map(ChunkRow::from_chunk)
      .collect()
  }

  async fn apply(&self, world_id: &str, patch: &Patch) -> Result<()> {
    let removed: Vec<String> = patch.removed.iter().map(quad_id).collect();
    let added = self.chunk_rows(&patch.added)?;
    let handle = self.manager.get(world_id).await?;

    handle
      .conn()
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut delete = tx.prepare("DELETE FROM chunks WHERE quad_id = ?1")?;
          for id in &removed {
            delete.execute(rusqlite::params![id])?;
          }
          let mut insert = tx.prepare(INSERT_CHUNK)?;
          for row in &added {
            insert_chunk(&mut insert, row)?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn reindex(&self, world_id: &str, graph: &Graph) -> Result<()> {
    let rows = self.chunk_rows(graph)?;
    let handle = self.manager.get(world_id).await?;
    let count = rows.len();

    handle
      .conn()
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks", [])?;
        {
          let mut insert = tx.prepare(INSERT_CHUNK)?;
          for row in &rows {
            insert_chunk(&mut insert, row)?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::info!(world = %world_id, chunks = count, "rebuilt search index");
    Ok(())
  }

  async fn rank(&self, world_id: &str, query: &SearchQuery) -> Result<Vec<SearchHit>> {
    if query.limit == 0 || query.text.trim().is_empty() {
      return Ok(Vec::new());
    }
    let Some(handle) = self.manager.lookup(world_id).await? else {
      return Ok(Vec::new());
    };

    let raws: Vec<RawChunk> = handle
      .conn()
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT subject, predicate, text, embedding FROM chunks ORDER BY chunk_id")?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawChunk {
              subject:   row.get(0)?,
              predicate: row.get(1)?,
              text:      row.get(2)?,
              embedding: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let terms: HashSet<String> = tokenize(&query.text).collect();
    let overlaps = |text: &str| tokenize(text).any(|t| terms.contains(&t));
    let lexical = raws.iter().any(|c| overlaps(&c.text));
    let needle = self.embedder.embed(&query.text);

    let mut hits = Vec::new();
    for raw in raws {
      if lexical && !overlaps(&raw.text) {
        continue;
      }
      let embedding = match &raw.embedding {
        Some(bytes) => decode_embedding(bytes)?,
        None => self.embedder.embed(&raw.text),
      };
      let score = cosine_similarity(&needle, &embedding);
      if score <= 0.0 {
        continue;
      }
      hits.push(SearchHit {
        subject: decode_node(&raw.subject),
        predicate: raw.predicate,
        text: raw.text,
        score,
      });
    }

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(query.limit);
    Ok(hits)
  }
}

impl<E: Embedder> SearchIndex for SqliteChunkIndex<E> {
  async fn on_patch(&self, world_id: &str, patch: &Patch) -> CoreResult<()> {
    Ok(self.apply(world_id, patch).await?)
  }

  async fn rebuild(&self, world_id: &str, graph: &Graph) -> CoreResult<()> {
    Ok(self.reindex(world_id, graph).await?)
  }

  async fn search(&self, world_id: &str, query: &SearchQuery) -> CoreResult<Vec<SearchHit>> {
    Ok(self.rank(world_id, query).await?)
  }
}
