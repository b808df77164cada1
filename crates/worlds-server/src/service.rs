//! [`WorldService`]: request orchestration between auth, limits, storage,
//! the SPARQL engine, the search index and usage metering.
//!
//! Every write path holds the world's write lock from load to persist, so
//! two updates to the same world never interleave. Ownership is checked
//! again once the lock is held: a remove that ran while a writer waited
//! turns that writer into a 404. Reads take no lock.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;
use worlds_core::{
  Error as CoreError, Graph, Patch, Quad,
  limits::{BucketKey, Decision, PolicyTable, RateLimiter, ResourceKind},
  result::SparqlResult,
  search::{SearchHit, SearchIndex, SearchQuery},
  store::{NewWorld, WorldMetadata, WorldRecord, WorldStore, validate_world_id},
  usage::{UsageEvent, UsageMeter, UsageTotals},
};
use worlds_rdf::Format;
use worlds_sparql::{QueryForm, SparqlEngine, detect_form};
use worlds_store_sqlite::{SqliteBucketStore, SqliteUsageMeter, SqliteWorldStore};

use crate::{
  auth::Principal,
  error::{ApiError, Result},
  index::SearchBackend,
};

/// A successful rate-limited operation with the decision that admitted it.
#[derive(Debug)]
pub struct Limited<T> {
  pub value:    T,
  pub decision: Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
  /// Replace the world's quads with the payload.
  Set,
  /// Add the payload's quads to the world.
  Add,
}

pub struct WorldService {
  store:         SqliteWorldStore,
  engine:        SparqlEngine<Arc<SearchBackend>>,
  limiter:       RateLimiter<SqliteBucketStore>,
  usage:         SqliteUsageMeter,
  policies:      PolicyTable,
  query_timeout: Duration,
}

impl WorldService {
  pub fn new(
    store:         SqliteWorldStore,
    index:         SearchBackend,
    limiter:       RateLimiter<SqliteBucketStore>,
    usage:         SqliteUsageMeter,
    policies:      PolicyTable,
    query_timeout: Duration,
  ) -> Self {
    Self {
      store,
      engine: SparqlEngine::new(Arc::new(index)),
      limiter,
      usage,
      policies,
      query_timeout,
    }
  }

  pub fn store(&self) -> &SqliteWorldStore { &self.store }

  fn index(&self) -> &SearchBackend { self.engine.index() }

  // ── Registry ──────────────────────────────────────────────────────────────

  pub async fn create_world(
    &self,
    who: &Principal,
    world_id: String,
    description: Option<String>,
  ) -> Result<WorldRecord> {
    let input = NewWorld { world_id, description, created_by: who.name.clone() };
    Ok(self.store.create_world(input).await?)
  }

  pub async fn list_worlds(&self, who: &Principal) -> Result<Vec<WorldRecord>> {
    Ok(self.store.list_worlds(&who.name).await?)
  }

  pub async fn metadata(&self, who: &Principal, world_id: &str) -> Result<WorldMetadata> {
    self.authorize(who, world_id).await?;
    Ok(self.store.metadata(world_id).await?)
  }

  pub async fn remove(&self, who: &Principal, world_id: &str) -> Result<()> {
    self.authorize(who, world_id).await?;
    let _guard = self.lock(who, world_id).await?;
    Ok(self.store.remove(world_id).await?)
  }

  /// Worlds are visible to their creator only; anyone else is told the
  /// world does not exist.
  async fn authorize(&self, who: &Principal, world_id: &str) -> Result<WorldRecord> {
    validate_world_id(world_id)?;
    self
      .store
      .get_world(world_id)
      .await?
      .filter(|w| w.created_by == who.name)
      .ok_or_else(|| CoreError::WorldNotFound(world_id.to_owned()).into())
  }

  // ── Limits and metering ───────────────────────────────────────────────────

  async fn admit(&self, who: &Principal, world_id: &str, kind: ResourceKind) -> Result<Decision> {
    let policy = self.policies.policy(who.plan.as_deref(), kind);
    let key = BucketKey::new(world_id, kind);
    let decision = self.limiter.consume(&key, 1.0, &policy).await?;
    if !decision.allowed {
      tracing::debug!(bucket = %key, principal = %who.name, "rate limit exceeded");
      return Err(ApiError::RateLimited(decision));
    }
    Ok(decision)
  }

  /// Record usage in the background; failures are logged, never returned.
  fn meter(
    &self,
    who: &Principal,
    world_id: &str,
    kind: ResourceKind,
    quantity: u64,
    metadata: BTreeMap<String, String>,
  ) {
    let event = UsageEvent {
      event_id: Uuid::new_v4().to_string(),
      principal: who.name.clone(),
      world_id: Some(world_id.to_owned()),
      kind,
      quantity,
      recorded_at: Utc::now(),
      metadata,
    };
    let usage = self.usage.clone();
    tokio::spawn(async move {
      if let Err(e) = usage.record(event).await {
        tracing::warn!(error = %e, "failed to record usage");
      }
    });
  }

  pub async fn usage(&self, who: &Principal, since: DateTime<Utc>) -> Result<UsageTotals> {
    Ok(self.usage.totals(&who.name, since).await?)
  }

  /// The world's write lock, granted only if `who` still owns the world
  /// once it is held.
  async fn lock(&self, who: &Principal, world_id: &str) -> Result<OwnedMutexGuard<()>> {
    let guard = self
      .store
      .manager()
      .lock_writes(world_id)
      .await
      .map_err(CoreError::from)?;
    self.authorize(who, world_id).await?;
    Ok(guard)
  }

  // ── SPARQL ────────────────────────────────────────────────────────────────

  /// Run a query or update. `form` skips detection when the request already
  /// said which one it is.
  pub async fn sparql(
    &self,
    who: &Principal,
    world_id: &str,
    text: &str,
    form: Option<QueryForm>,
  ) -> Result<Limited<SparqlResult>> {
    self.authorize(who, world_id).await?;
    let form = match form {
      Some(form) => form,
      None => detect_form(text)?,
    };

    match form {
      QueryForm::Query => {
        let decision = self.admit(who, world_id, ResourceKind::Query).await?;
        let graph = self.store.load(world_id).await?;
        let value = tokio::time::timeout(self.query_timeout, self.engine.query(graph, text))
          .await
          .map_err(|_| ApiError::Timeout)??;
        self.meter(who, world_id, ResourceKind::Query, 1, BTreeMap::new());
        Ok(Limited { value, decision })
      }
      QueryForm::Update => {
        let decision = self.admit(who, world_id, ResourceKind::Update).await?;
        let patch = self.update(who, world_id, text).await?;
        let metadata = BTreeMap::from([
          ("added".to_owned(), patch.added.len().to_string()),
          ("removed".to_owned(), patch.removed.len().to_string()),
        ]);
        self.meter(who, world_id, ResourceKind::Update, 1, metadata);
        Ok(Limited { value: SparqlResult::Void, decision })
      }
    }
  }

  /// Load, evaluate and persist under the world's write lock. Returns the
  /// committed patch (empty when nothing changed).
  async fn update(&self, who: &Principal, world_id: &str, text: &str) -> Result<Patch> {
    let _guard = self.lock(who, world_id).await?;
    let graph = self.store.load(world_id).await?;
    let execution = self.engine.update(world_id, graph, text).await?;

    let Some(pending) = execution.pending else {
      return Ok(Patch::default());
    };
    if let Err(e) = self.store.replace(world_id, &pending.graph).await {
      // The engine already patched the index; roll it back to match the store.
      if let Err(undo) = self.index().on_patch(world_id, &pending.patch.inverse()).await {
        tracing::warn!(world = %world_id, error = %undo, "failed to revert search index patch");
      }
      return Err(e.into());
    }
    tracing::debug!(
      world = %world_id,
      added = pending.patch.added.len(),
      removed = pending.patch.removed.len(),
      "committed SPARQL update",
    );
    Ok(pending.patch)
  }

  // ── Import / export ───────────────────────────────────────────────────────

  pub async fn export(
    &self,
    who: &Principal,
    world_id: &str,
    format: Format,
  ) -> Result<Limited<Vec<u8>>> {
    self.authorize(who, world_id).await?;
    let decision = self.admit(who, world_id, ResourceKind::Query).await?;
    let graph = self.store.load(world_id).await?;
    let value = worlds_rdf::encode(&graph, format)?;
    self.meter(who, world_id, ResourceKind::Query, 1, BTreeMap::new());
    Ok(Limited { value, decision })
  }

  /// Decode `body` and set or add its quads. Returns the number of quads
  /// the world gained (for [`ImportMode::Add`]) or now holds
  /// (for [`ImportMode::Set`]).
  pub async fn import(
    &self,
    who: &Principal,
    world_id: &str,
    body: &[u8],
    format: Format,
    mode: ImportMode,
  ) -> Result<Limited<u64>> {
    self.authorize(who, world_id).await?;
    let decision = self.admit(who, world_id, ResourceKind::Import).await?;
    let graph = worlds_rdf::decode(body, format)?;
    let received = graph.len() as u64;

    let _guard = self.lock(who, world_id).await?;
    let value = match mode {
      ImportMode::Set => {
        self.store.replace(world_id, &graph).await?;
        if let Err(e) = self.index().rebuild(world_id, &graph).await {
          tracing::warn!(world = %world_id, error = %e, "search index rebuild failed; index is stale");
        }
        received
      }
      ImportMode::Add => {
        let base = self.store.load(world_id).await?;
        let patch = Patch::additions(&base, graph.iter().cloned());
        let quads: Vec<Quad> = graph.into_iter().collect();
        let added = self.store.append_quads(world_id, &who.name, &quads).await?;
        if let Err(e) = self.index().on_patch(world_id, &patch).await {
          tracing::warn!(world = %world_id, error = %e, "search index sync failed; index is stale");
        }
        added
      }
    };

    self.meter(who, world_id, ResourceKind::Import, received, BTreeMap::from([(
      "mode".to_owned(),
      format!("{mode:?}").to_lowercase(),
    )]));
    Ok(Limited { value, decision })
  }

  /// Rebuild the world's search chunks from its current quads.
  pub async fn reindex(&self, who: &Principal, world_id: &str) -> Result<u64> {
    self.authorize(who, world_id).await?;
    let _guard = self.lock(who, world_id).await?;
    let graph: Graph = self.store.load(world_id).await?;
    self.index().rebuild(world_id, &graph).await?;
    Ok(graph.len() as u64)
  }

  // ── Search ────────────────────────────────────────────────────────────────

  pub async fn search(
    &self,
    who: &Principal,
    world_id: &str,
    query: &SearchQuery,
  ) -> Result<Limited<Vec<SearchHit>>> {
    self.authorize(who, world_id).await?;
    let decision = self.admit(who, world_id, ResourceKind::Search).await?;
    let value = self.index().search(world_id, query).await?;
    self.meter(who, world_id, ResourceKind::Search, 1, BTreeMap::new());
    Ok(Limited { value, decision })
  }
}
