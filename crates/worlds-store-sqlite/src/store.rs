//! [`SqliteWorldStore`]: the SQLite implementation of [`WorldStore`].

use std::{path::Path, sync::Arc};

use rusqlite::OptionalExtension as _;
use worlds_core::{
  Error as CoreError, Graph, Quad, Result as CoreResult,
  store::{NewWorld, WorldMetadata, WorldRecord, WorldStore, validate_world_id},
};

use crate::{
  DatabaseManager, Result,
  encode::{
    INSERT_QUAD, QUAD_COLUMNS, QuadRow, RawQuad, RawWorld, WORLD_COLUMNS, encode_dt, insert_quad,
    now,
  },
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// World quads in per-world SQLite files, registry in the system database.
///
/// The manager is reference-counted, so clones share it.
#[derive(Clone)]
pub struct SqliteWorldStore {
  manager: Arc<DatabaseManager>,
}

impl SqliteWorldStore {
  pub fn new(manager: Arc<DatabaseManager>) -> Self { Self { manager } }

  /// Open (or create) a store rooted at `dir`.
  pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
    Ok(Self::new(Arc::new(DatabaseManager::open(dir).await?)))
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    Ok(Self::new(Arc::new(DatabaseManager::open_in_memory().await?)))
  }

  pub fn manager(&self) -> &Arc<DatabaseManager> { &self.manager }

  async fn fetch_world(&self, world_id: &str) -> Result<Option<WorldRecord>> {
    let id = world_id.to_owned();
    let raw: Option<RawWorld> = self
      .manager
      .system()
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {WORLD_COLUMNS} FROM worlds WHERE world_id = ?1"),
            rusqlite::params![id],
            RawWorld::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawWorld::into_record).transpose()
  }

  /// Insert a registry row unless one exists. Returns whether it inserted.
  async fn register(&self, record: &WorldRecord) -> Result<bool> {
    let id          = record.world_id.clone();
    let description = record.description.clone();
    let created_by  = record.created_by.clone();
    let created_at  = encode_dt(record.created_at);
    let updated_at  = encode_dt(record.updated_at);

    let inserted = self
      .manager
      .system()
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO worlds (world_id, description, created_by, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id, description, created_by, created_at, updated_at],
        )?)
      })
      .await?;
    Ok(inserted == 1)
  }

  /// Bump `updated_at` on the registry row, if there is one.
  async fn touch(&self, world_id: &str) -> Result<()> {
    let id  = world_id.to_owned();
    let now = encode_dt(now());
    self
      .manager
      .system()
      .call(move |conn| {
        conn.execute(
          "UPDATE worlds SET updated_at = ?2 WHERE world_id = ?1",
          rusqlite::params![id, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn read_graph(&self, world_id: &str) -> Result<Graph> {
    let Some(handle) = self.manager.lookup(world_id).await? else {
      return Ok(Graph::new());
    };

    let raws: Vec<RawQuad> = handle
      .conn()
      .call(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {QUAD_COLUMNS} FROM quads"))?;
        let rows = stmt
          .query_map([], RawQuad::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawQuad::into_quad).collect()
  }

  /// Refuses unregistered worlds: rows must never outlive the registry entry.
  async fn write_graph(&self, world_id: &str, graph: &Graph) -> Result<()> {
    let rows = graph.iter().map(QuadRow::from_quad).collect::<Result<Vec<_>>>()?;
    if self.fetch_world(world_id).await?.is_none() {
      return Err(CoreError::WorldNotFound(world_id.to_owned()).into());
    }
    let handle = self.manager.get(world_id).await?;

    handle
      .conn()
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM quads", [])?;
        {
          let mut stmt = tx.prepare(INSERT_QUAD)?;
          for row in &rows {
            insert_quad(&mut stmt, row)?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    self.touch(world_id).await?;
    tracing::debug!(world = %world_id, quads = graph.len(), "replaced world quads");
    Ok(())
  }

  async fn insert_quads(&self, world_id: &str, created_by: &str, quads: &[Quad]) -> Result<u64> {
    let rows = quads.iter().map(QuadRow::from_quad).collect::<Result<Vec<_>>>()?;
    let handle = self.manager.get(world_id).await?;

    let now = now();
    self
      .register(&WorldRecord {
        world_id:    world_id.to_owned(),
        description: None,
        created_by:  created_by.to_owned(),
        created_at:  now,
        updated_at:  now,
      })
      .await?;

    let inserted = handle
      .conn()
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
          let mut stmt = tx.prepare(INSERT_QUAD)?;
          for row in &rows {
            inserted += insert_quad(&mut stmt, row)? as u64;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    self.touch(world_id).await?;
    Ok(inserted)
  }

  async fn count(&self, world_id: &str) -> Result<u64> {
    let Some(handle) = self.manager.lookup(world_id).await? else {
      return Ok(0);
    };
    let count: i64 = handle
      .conn()
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM quads", [], |r| r.get(0))?))
      .await?;
    Ok(count.max(0) as u64)
  }

  /// Empty the world's tables. Returns whether a database existed.
  async fn clear(&self, world_id: &str) -> Result<bool> {
    let Some(handle) = self.manager.lookup(world_id).await? else {
      return Ok(false);
    };
    handle
      .conn()
      .call(|conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM quads", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(true)
  }

  /// Rows first, registry second: a failure part way leaves a registered
  /// world with fewer rows, never stale rows under a free id.
  async fn delete(&self, world_id: &str) -> Result<bool> {
    let cleared = self.clear(world_id).await?;

    let id = world_id.to_owned();
    let unregistered = self
      .manager
      .system()
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM worlds WHERE world_id = ?1", rusqlite::params![id])?)
      })
      .await?;
    self.manager.evict(world_id).await;

    Ok(unregistered > 0 || cleared)
  }
}

// ─── WorldStore impl ─────────────────────────────────────────────────────────

impl WorldStore for SqliteWorldStore {
  // ── Registry ──────────────────────────────────────────────────────────────

  async fn create_world(&self, input: NewWorld) -> CoreResult<WorldRecord> {
    validate_world_id(&input.world_id)?;
    let now = now();
    let record = WorldRecord {
      world_id:    input.world_id,
      description: input.description,
      created_by:  input.created_by,
      created_at:  now,
      updated_at:  now,
    };

    if !self.register(&record).await? {
      return Err(CoreError::WorldExists(record.world_id));
    }
    // Rows left in an unregistered world's file belong to nobody.
    if self.clear(&record.world_id).await? {
      tracing::debug!(world = %record.world_id, "reset leftover world database");
    }
    self.manager.create(&record.world_id).await?;
    tracing::info!(world = %record.world_id, owner = %record.created_by, "created world");
    Ok(record)
  }

  async fn get_world(&self, world_id: &str) -> CoreResult<Option<WorldRecord>> {
    Ok(self.fetch_world(world_id).await?)
  }

  async fn list_worlds(&self, owner: &str) -> CoreResult<Vec<WorldRecord>> {
    let owner = owner.to_owned();
    let raws: Vec<RawWorld> = self
      .manager
      .system()
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {WORLD_COLUMNS} FROM worlds WHERE created_by = ?1
           ORDER BY created_at, world_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![owner], RawWorld::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(crate::Error::from)?;

    Ok(raws.into_iter().map(RawWorld::into_record).collect::<Result<Vec<_>>>()?)
  }

  // ── Quads ─────────────────────────────────────────────────────────────────

  async fn load(&self, world_id: &str) -> CoreResult<Graph> {
    Ok(self.read_graph(world_id).await?)
  }

  async fn replace(&self, world_id: &str, graph: &Graph) -> CoreResult<()> {
    Ok(self.write_graph(world_id, graph).await?)
  }

  async fn append_quads(
    &self,
    world_id:   &str,
    created_by: &str,
    quads:      &[Quad],
  ) -> CoreResult<u64> {
    Ok(self.insert_quads(world_id, created_by, quads).await?)
  }

  async fn count_quads(&self, world_id: &str) -> CoreResult<u64> {
    Ok(self.count(world_id).await?)
  }

  async fn metadata(&self, world_id: &str) -> CoreResult<WorldMetadata> {
    let record = self
      .fetch_world(world_id)
      .await?
      .ok_or_else(|| CoreError::WorldNotFound(world_id.to_owned()))?;
    let count = self.count(world_id).await?;
    Ok(WorldMetadata::from_record(record, count))
  }

  async fn remove(&self, world_id: &str) -> CoreResult<()> {
    validate_world_id(world_id)?;
    if !self.delete(world_id).await? {
      return Err(CoreError::WorldNotFound(world_id.to_owned()));
    }
    tracing::info!(world = %world_id, "removed world");
    Ok(())
  }
}
