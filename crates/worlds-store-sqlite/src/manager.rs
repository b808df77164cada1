//! [`DatabaseManager`]: one SQLite database per world, provisioned lazily.
//!
//! The handle cache's lock guards the map alone: opening a database happens inside the world's own
//! [`OnceCell`], so a slow or failing open for one world never holds up
//! another, and concurrent first requests for the same world converge on a
//! single connection.
//!
//! Per-world write locks live in a second map that eviction never touches,
//! so a writer queued behind a delete still excludes later writers on the
//! same id.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard, RwLock};
use tokio_rusqlite::Connection;
use worlds_core::store::validate_world_id;

use crate::{
  Result,
  schema::{SYSTEM_SCHEMA, WORLD_SCHEMA},
};

const SYSTEM_DB: &str = "system.db";
const WORLD_DB_EXT: &str = "db";
const WORLDS_DIR: &str = "worlds";

/// Where databases live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageRoot {
  /// `system.db` plus `worlds/<id>.db` under this directory.
  Directory(PathBuf),
  /// Every database is a private in-memory connection. Data dies with the
  /// manager.
  InMemory,
}

/// A provisioned world database. Clones share one connection.
#[derive(Clone)]
pub struct WorldHandle {
  conn: Connection,
}

impl WorldHandle {
  pub fn conn(&self) -> &Connection { &self.conn }
}

type Slot = Arc<OnceCell<WorldHandle>>;

/// Owns the system database and a cache of per-world handles.
pub struct DatabaseManager {
  root:        StorageRoot,
  system:      Connection,
  accounting:  Connection,
  handles:     RwLock<HashMap<String, Slot>>,
  write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DatabaseManager {
  /// Open (or create) the storage tree rooted at `dir`.
  pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    tokio::fs::create_dir_all(dir.join(WORLDS_DIR)).await?;
    let system = Connection::open(dir.join(SYSTEM_DB)).await?;
    init(&system, SYSTEM_SCHEMA).await?;
    let accounting = Connection::open(dir.join(SYSTEM_DB)).await?;
    tracing::info!(root = %dir.display(), "opened storage root");
    Ok(Self::with(StorageRoot::Directory(dir), system, accounting))
  }

  /// A manager whose databases are all in memory, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let system = Connection::open_in_memory().await?;
    init(&system, SYSTEM_SCHEMA).await?;
    let accounting = system.clone();
    Ok(Self::with(StorageRoot::InMemory, system, accounting))
  }

  fn with(root: StorageRoot, system: Connection, accounting: Connection) -> Self {
    Self {
      root,
      system,
      accounting,
      handles: RwLock::new(HashMap::new()),
      write_locks: Mutex::new(HashMap::new()),
    }
  }

  /// The system database connection for the world registry.
  pub fn system(&self) -> &Connection { &self.system }

  /// The system database connection for rate-limit buckets and usage
  /// events. On disk it is a second connection to the same file; in memory
  /// it is the registry connection.
  pub fn accounting(&self) -> &Connection { &self.accounting }

  /// The handle for `world_id`, provisioning its database on first use.
  pub async fn get(&self, world_id: &str) -> Result<WorldHandle> {
    validate_world_id(world_id)?;
    let slot = self.slot(world_id).await;
    let handle = slot.get_or_try_init(|| self.provision(world_id)).await?;
    Ok(handle.clone())
  }

  /// Explicit provisioning when a world is registered. Same as [`get`].
  ///
  /// [`get`]: Self::get
  pub async fn create(&self, world_id: &str) -> Result<WorldHandle> {
    self.get(world_id).await
  }

  /// The handle for `world_id` if its database already exists; never
  /// creates one.
  pub async fn lookup(&self, world_id: &str) -> Result<Option<WorldHandle>> {
    validate_world_id(world_id)?;
    if let Some(handle) = self.cached(world_id).await {
      return Ok(Some(handle));
    }
    match self.world_path(world_id) {
      Some(path) if tokio::fs::try_exists(&path).await? => self.get(world_id).await.map(Some),
      _ => Ok(None),
    }
  }

  /// Serialise load→mutate→persist cycles on `world_id`. Held across the
  /// whole cycle; readers never take it. Never provisions a database.
  pub async fn lock_writes(&self, world_id: &str) -> Result<OwnedMutexGuard<()>> {
    validate_world_id(world_id)?;
    let lock = {
      let mut locks = self.write_locks.lock().await;
      Arc::clone(locks.entry(world_id.to_owned()).or_default())
    };
    Ok(lock.lock_owned().await)
  }

  /// Drop the cached handle. Returns whether one was cached. The connection
  /// closes once the last clone is dropped.
  pub async fn evict(&self, world_id: &str) -> bool {
    self.handles.write().await.remove(world_id).is_some()
  }

  async fn cached(&self, world_id: &str) -> Option<WorldHandle> {
    let handles = self.handles.read().await;
    handles.get(world_id).and_then(|slot| slot.get().cloned())
  }

  async fn slot(&self, world_id: &str) -> Slot {
    if let Some(slot) = self.handles.read().await.get(world_id) {
      return Arc::clone(slot);
    }
    let mut handles = self.handles.write().await;
    Arc::clone(handles.entry(world_id.to_owned()).or_default())
  }

  fn world_path(&self, world_id: &str) -> Option<PathBuf> {
    match &self.root {
      StorageRoot::Directory(dir) => {
        Some(dir.join(WORLDS_DIR).join(world_id).with_extension(WORLD_DB_EXT))
      }
      StorageRoot::InMemory => None,
    }
  }

  async fn provision(&self, world_id: &str) -> Result<WorldHandle> {
    let conn = match self.world_path(world_id) {
      Some(path) => Connection::open(path).await?,
      None => Connection::open_in_memory().await?,
    };
    init(&conn, WORLD_SCHEMA).await?;
    tracing::info!(world = %world_id, "provisioned world database");
    Ok(WorldHandle { conn })
  }
}

async fn init(conn: &Connection, schema: &'static str) -> Result<()> {
  conn
    .call(move |conn| {
      conn.execute_batch(schema)?;
      Ok(())
    })
    .await?;
  Ok(())
}
