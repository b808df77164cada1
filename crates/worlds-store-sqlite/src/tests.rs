//! Integration tests for the SQLite backend against in-memory databases.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use worlds_core::{
  Error as CoreError, Graph, GraphName, Patch, Quad, Term,
  limits::{BucketKey, BucketStore, Policy, RateLimiter, ResourceKind},
  search::{HashingEmbedder, SearchIndex, SearchQuery},
  store::{NewWorld, WorldStore},
  usage::{UsageEvent, UsageMeter},
};

use crate::{
  DatabaseManager, SqliteBucketStore, SqliteChunkIndex, SqliteUsageMeter, SqliteWorldStore,
};

async fn store() -> SqliteWorldStore {
  SqliteWorldStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn quad(s: &str, p: &str, o: Term) -> Quad {
  Quad::triple(Term::iri(s), Term::iri(p), o).unwrap()
}

fn new_world(id: &str, owner: &str) -> NewWorld {
  NewWorld { world_id: id.into(), description: None, created_by: owner.into() }
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_world() {
  let s = store().await;
  let created = s
    .create_world(NewWorld {
      world_id:    "atlas".into(),
      description: Some("maps".into()),
      created_by:  "alice".into(),
    })
    .await
    .unwrap();

  let fetched = s.get_world("atlas").await.unwrap().unwrap();
  assert_eq!(fetched, created);
  assert_eq!(fetched.description.as_deref(), Some("maps"));
}

#[tokio::test]
async fn duplicate_world_ids_are_rejected() {
  let s = store().await;
  s.create_world(new_world("atlas", "alice")).await.unwrap();
  let err = s.create_world(new_world("atlas", "bob")).await.unwrap_err();
  assert!(matches!(err, CoreError::WorldExists(_)));
}

#[tokio::test]
async fn invalid_world_ids_are_rejected() {
  let s = store().await;
  let err = s.create_world(new_world("../escape", "alice")).await.unwrap_err();
  assert!(matches!(err, CoreError::InvalidWorldId(_)));
}

#[tokio::test]
async fn list_worlds_is_per_owner() {
  let s = store().await;
  s.create_world(new_world("a1", "alice")).await.unwrap();
  s.create_world(new_world("b1", "bob")).await.unwrap();
  s.create_world(new_world("a2", "alice")).await.unwrap();

  let ids: Vec<_> =
    s.list_worlds("alice").await.unwrap().into_iter().map(|w| w.world_id).collect();
  assert_eq!(ids, vec!["a1", "a2"]);
}

// ─── Quads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_world_loads_as_empty() {
  let s = store().await;
  assert!(s.load("nowhere").await.unwrap().is_empty());
  assert_eq!(s.count_quads("nowhere").await.unwrap(), 0);
}

#[tokio::test]
async fn append_is_idempotent() {
  let s = store().await;
  let q = quad("http://a", "http://b", Term::literal("c"));

  assert_eq!(s.append_quads("w", "alice", &[q.clone()]).await.unwrap(), 1);
  assert_eq!(s.append_quads("w", "alice", &[q.clone()]).await.unwrap(), 0);
  assert_eq!(s.count_quads("w").await.unwrap(), 1);
}

#[tokio::test]
async fn append_registers_the_world() {
  let s = store().await;
  s.append_quads("fresh", "alice", &[quad("http://a", "http://b", Term::literal("c"))])
    .await
    .unwrap();

  let meta = s.metadata("fresh").await.unwrap();
  assert_eq!(meta.created_by, "alice");
  assert_eq!(meta.triple_count, 1);
}

#[tokio::test]
async fn load_reconstitutes_literal_columns() {
  let s = store().await;
  let quads = vec![
    quad("http://s", "http://label", Term::Literal(worlds_core::Literal::lang_tagged("Hallo", "de").unwrap())),
    quad(
      "http://s",
      "http://age",
      Term::Literal(
        worlds_core::Literal::typed("7", "http://www.w3.org/2001/XMLSchema#integer").unwrap(),
      ),
    ),
    Quad::new(
      Term::blank("n1"),
      Term::iri("http://p"),
      Term::iri("http://o"),
      GraphName::Iri("http://g".into()),
    )
    .unwrap(),
  ];
  s.append_quads("w", "alice", &quads).await.unwrap();

  let loaded = s.load("w").await.unwrap();
  let expected: Graph = quads.into_iter().collect();
  assert_eq!(loaded, expected);
}

#[tokio::test]
async fn replace_swaps_the_whole_set() {
  let s = store().await;
  s.append_quads("w", "alice", &[quad("http://old", "http://p", Term::literal("x"))])
    .await
    .unwrap();

  let next: Graph = [
    quad("http://new", "http://p", Term::literal("y")),
    quad("http://new", "http://q", Term::iri("http://z")),
  ]
  .into_iter()
  .collect();
  s.replace("w", &next).await.unwrap();

  assert_eq!(s.load("w").await.unwrap(), next);
}

#[tokio::test]
async fn replace_bumps_updated_at() {
  let s = store().await;
  let created = s.create_world(new_world("w", "alice")).await.unwrap();
  tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  s.replace("w", &Graph::new()).await.unwrap();

  let after = s.get_world("w").await.unwrap().unwrap();
  assert!(after.updated_at > created.updated_at);
  assert_eq!(after.created_at, created.created_at);
}

#[tokio::test]
async fn worlds_are_isolated() {
  let s = store().await;
  s.append_quads("a", "alice", &[quad("http://a", "http://p", Term::literal("only in a"))])
    .await
    .unwrap();
  s.append_quads("b", "bob", &[quad("http://b", "http://p", Term::literal("only in b"))])
    .await
    .unwrap();

  let a = s.load("a").await.unwrap();
  let b = s.load("b").await.unwrap();
  assert_eq!(a.len(), 1);
  assert_eq!(b.len(), 1);
  assert!(a.iter().all(|q| q.subject == Term::iri("http://a")));
  assert!(b.iter().all(|q| q.subject == Term::iri("http://b")));
}

#[tokio::test]
async fn metadata_of_unknown_world_is_not_found() {
  let s = store().await;
  let err = s.metadata("ghost").await.unwrap_err();
  assert!(matches!(err, CoreError::WorldNotFound(_)));
}

#[tokio::test]
async fn remove_deletes_rows_and_registry() {
  let s = store().await;
  s.create_world(new_world("w", "alice")).await.unwrap();
  s.append_quads("w", "alice", &[quad("http://a", "http://b", Term::literal("c"))])
    .await
    .unwrap();

  s.remove("w").await.unwrap();
  assert!(s.get_world("w").await.unwrap().is_none());
  assert!(s.load("w").await.unwrap().is_empty());
  assert!(matches!(s.remove("w").await.unwrap_err(), CoreError::WorldNotFound(_)));
}

#[tokio::test]
async fn replace_refuses_unregistered_world() {
  let s = store().await;
  let graph: Graph = [quad("http://a", "http://b", Term::literal("c"))].into_iter().collect();

  let err = s.replace("ghost", &graph).await.unwrap_err();
  assert!(matches!(err, CoreError::WorldNotFound(_)));
  assert!(s.manager().lookup("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn replace_after_remove_is_refused() {
  let s = store().await;
  s.create_world(new_world("w", "alice")).await.unwrap();
  s.remove("w").await.unwrap();

  let graph: Graph = [quad("http://a", "http://b", Term::literal("late"))].into_iter().collect();
  assert!(matches!(s.replace("w", &graph).await.unwrap_err(), CoreError::WorldNotFound(_)));

  s.create_world(new_world("w", "bob")).await.unwrap();
  assert!(s.load("w").await.unwrap().is_empty());
}

#[tokio::test]
async fn recreated_world_starts_empty_on_disk() {
  let dir = tempfile::tempdir().unwrap();
  let s = SqliteWorldStore::open(dir.path()).await.unwrap();
  s.create_world(new_world("w", "alice")).await.unwrap();
  s.append_quads("w", "alice", &[quad("http://a", "http://b", Term::literal("alice's"))])
    .await
    .unwrap();

  // Leave rows in the file with no registry entry, as an interrupted
  // delete would.
  s.manager()
    .system()
    .call(|conn| {
      conn.execute("DELETE FROM worlds WHERE world_id = 'w'", [])?;
      Ok(())
    })
    .await
    .unwrap();
  assert_eq!(s.count_quads("w").await.unwrap(), 1);

  s.create_world(new_world("w", "bob")).await.unwrap();
  assert_eq!(s.count_quads("w").await.unwrap(), 0);
}

// ─── DatabaseManager ─────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_provisioning_converges() {
  let manager = Arc::new(DatabaseManager::open_in_memory().await.unwrap());

  let (a, b) = tokio::join!(manager.get("w"), manager.get("w"));
  let (a, b) = (a.unwrap(), b.unwrap());

  a.conn()
    .call(|conn| {
      conn.execute(
        "INSERT INTO quads (subject, predicate, object, term_type) VALUES ('s', 'p', 'o', 'uri')",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();
  let seen: i64 = b
    .conn()
    .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM quads", [], |r| r.get(0))?))
    .await
    .unwrap();
  assert_eq!(seen, 1);
}

#[tokio::test]
async fn lookup_never_provisions() {
  let manager = DatabaseManager::open_in_memory().await.unwrap();
  assert!(manager.lookup("w").await.unwrap().is_none());
  manager.create("w").await.unwrap();
  assert!(manager.lookup("w").await.unwrap().is_some());
  assert!(manager.evict("w").await);
  assert!(manager.lookup("w").await.unwrap().is_none());
}

#[tokio::test]
async fn directory_root_persists_across_managers() {
  let dir = tempfile::tempdir().unwrap();
  let q = quad("http://a", "http://b", Term::literal("c"));
  {
    let s = SqliteWorldStore::open(dir.path()).await.unwrap();
    s.create_world(new_world("w", "alice")).await.unwrap();
    s.append_quads("w", "alice", &[q.clone()]).await.unwrap();
  }

  let s = SqliteWorldStore::open(dir.path()).await.unwrap();
  assert!(s.get_world("w").await.unwrap().is_some());
  assert!(s.load("w").await.unwrap().contains(&q));
  assert!(s.manager().lookup("other").await.unwrap().is_none());
}

#[tokio::test]
async fn write_lock_is_per_world() {
  let manager = DatabaseManager::open_in_memory().await.unwrap();

  let _held = manager.lock_writes("a").await.unwrap();
  let other =
    tokio::time::timeout(std::time::Duration::from_millis(100), manager.lock_writes("b")).await;
  assert!(other.is_ok(), "world b must not wait on world a");

  let same =
    tokio::time::timeout(std::time::Duration::from_millis(20), manager.lock_writes("a")).await;
  assert!(same.is_err(), "second writer on world a must wait");
}

#[tokio::test]
async fn write_lock_survives_eviction() {
  let manager = DatabaseManager::open_in_memory().await.unwrap();
  manager.create("w").await.unwrap();

  let _held = manager.lock_writes("w").await.unwrap();
  assert!(manager.evict("w").await);
  manager.create("w").await.unwrap();

  let next =
    tokio::time::timeout(std::time::Duration::from_millis(20), manager.lock_writes("w")).await;
  assert!(next.is_err(), "eviction must not hand out a fresh lock while one is held");
}

#[tokio::test]
async fn write_lock_does_not_provision() {
  let manager = DatabaseManager::open_in_memory().await.unwrap();
  let _held = manager.lock_writes("w").await.unwrap();
  assert!(manager.lookup("w").await.unwrap().is_none());
}

// ─── Search index ────────────────────────────────────────────────────────────

async fn index() -> (SqliteWorldStore, SqliteChunkIndex<HashingEmbedder>) {
  let s = store().await;
  let idx = SqliteChunkIndex::new(Arc::clone(s.manager()), HashingEmbedder::default());
  (s, idx)
}

fn search(text: &str) -> SearchQuery { SearchQuery { text: text.into(), limit: 10 } }

#[tokio::test]
async fn patches_add_and_remove_chunks() {
  let (_s, idx) = index().await;
  let red = quad("http://apple", "http://colour", Term::literal("a bright red fruit"));
  let iri = quad("http://apple", "http://seeAlso", Term::iri("http://fruit"));

  let mut g = Graph::new();
  let before = g.clone();
  g.insert(red.clone());
  g.insert(iri);
  idx.on_patch("w", &Patch::between(&before, &g)).await.unwrap();

  let hits = idx.search("w", &search("red fruit")).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].subject, Term::iri("http://apple"));
  assert_eq!(hits[0].predicate, "http://colour");

  let before = g.clone();
  g.remove(&red);
  idx.on_patch("w", &Patch::between(&before, &g)).await.unwrap();
  assert!(idx.search("w", &search("red fruit")).await.unwrap().is_empty());
}

#[tokio::test]
async fn rebuild_matches_the_quad_set() {
  let (_s, idx) = index().await;
  let stale = quad("http://old", "http://p", Term::literal("obsolete words"));
  idx.on_patch("w", &Patch { added: vec![stale], removed: vec![] }).await.unwrap();

  let live: Graph =
    [quad("http://new", "http://p", Term::literal("current words"))].into_iter().collect();
  idx.rebuild("w", &live).await.unwrap();

  let hits = idx.search("w", &search("words")).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].text, "current words");
}

#[tokio::test]
async fn search_ranks_lexical_matches_first() {
  let (_s, idx) = index().await;
  let patch = Patch {
    added:   vec![
      quad("http://a", "http://p", Term::literal("graph databases store quads")),
      quad("http://b", "http://p", Term::literal("token buckets limit requests")),
    ],
    removed: vec![],
  };
  idx.on_patch("w", &patch).await.unwrap();

  let hits = idx.search("w", &search("token bucket requests")).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].subject, Term::iri("http://b"));
  assert!(idx.search("unindexed", &search("token")).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_is_per_world() {
  let (_s, idx) = index().await;
  let patch = Patch {
    added:   vec![quad("http://a", "http://p", Term::literal("secret plans"))],
    removed: vec![],
  };
  idx.on_patch("a", &patch).await.unwrap();
  idx.on_patch("b", &Patch::default()).await.unwrap();

  assert!(idx.search("b", &search("secret")).await.unwrap().is_empty());
}

// ─── Rate-limit buckets ──────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> { DateTime::from_timestamp(1_700_000_000, 0).unwrap() }

async fn limiter() -> RateLimiter<SqliteBucketStore> {
  let manager = DatabaseManager::open_in_memory().await.unwrap();
  RateLimiter::new(SqliteBucketStore::new(&manager))
}

#[tokio::test]
async fn bucket_writes_do_not_queue_behind_registry() {
  let dir = tempfile::tempdir().unwrap();
  let manager = DatabaseManager::open(dir.path()).await.unwrap();
  let limiter = RateLimiter::new(SqliteBucketStore::new(&manager));
  let key = BucketKey::new("w", ResourceKind::Query);
  let policy = Policy::new(60_000, 3.0, 3.0);

  let busy = manager.system().call(|_| {
    std::thread::sleep(std::time::Duration::from_millis(500));
    Ok(())
  });
  let consume = tokio::time::timeout(
    std::time::Duration::from_millis(250),
    limiter.consume_at(t0(), &key, 1.0, &policy),
  );
  let (busy, consume) = tokio::join!(busy, consume);
  busy.unwrap();
  assert!(consume.expect("bucket write waited on the registry connection").unwrap().allowed);
}

#[tokio::test]
async fn bucket_counts_down_from_capacity() {
  let limiter = limiter().await;
  let key = BucketKey::new("w", ResourceKind::Query);
  let policy = Policy::new(60_000, 10.0, 10.0);

  let first = limiter.consume_at(t0(), &key, 1.0, &policy).await.unwrap();
  let second = limiter.consume_at(t0(), &key, 1.0, &policy).await.unwrap();
  assert!(first.allowed && second.allowed);
  assert_eq!(first.remaining, 9.0);
  assert_eq!(second.remaining, 8.0);
}

#[tokio::test]
async fn bucket_exhausts_then_denies() {
  let limiter = limiter().await;
  let key = BucketKey::new("w", ResourceKind::Query);
  let policy = Policy::new(60_000, 3.0, 3.0);

  for _ in 0..3 {
    assert!(limiter.consume_at(t0(), &key, 1.0, &policy).await.unwrap().allowed);
  }
  let denied = limiter.consume_at(t0(), &key, 1.0, &policy).await.unwrap();
  assert!(!denied.allowed);
  assert_eq!(denied.remaining, 0.0);
  assert_eq!(denied.reset_at, Some(t0() + Duration::milliseconds(60_000)));
}

#[tokio::test]
async fn bucket_refill_is_capped() {
  let limiter = limiter().await;
  let key = BucketKey::new("w", ResourceKind::Query);
  let policy = Policy::new(1_000, 5.0, 1.0);

  limiter.consume_at(t0(), &key, 2.0, &policy).await.unwrap();
  let later = t0() + Duration::milliseconds(10_500);
  let refilled = limiter.consume_at(later, &key, 0.0, &policy).await.unwrap();
  assert_eq!(refilled.remaining, 5.0);
  let stored = limiter.store().read(&key).await.unwrap().unwrap().state;
  assert_eq!(stored.last_refill_at, t0() + Duration::seconds(10));
}

#[tokio::test]
async fn bucket_kinds_are_independent() {
  let limiter = limiter().await;
  let query = BucketKey::new("w", ResourceKind::Query);
  let update = BucketKey::new("w", ResourceKind::Update);
  let policy = Policy::new(60_000, 1.0, 1.0);

  assert!(limiter.consume_at(t0(), &query, 1.0, &policy).await.unwrap().allowed);
  assert!(!limiter.consume_at(t0(), &query, 1.0, &policy).await.unwrap().allowed);
  assert!(limiter.consume_at(t0(), &update, 1.0, &policy).await.unwrap().allowed);
}

#[tokio::test]
async fn stale_versions_lose_the_swap() {
  use worlds_core::limits::{BucketState, BucketStore};

  let manager = DatabaseManager::open_in_memory().await.unwrap();
  let buckets = SqliteBucketStore::new(&manager);
  let key = BucketKey::new("w", ResourceKind::Search);
  let state = BucketState { tokens: 4.0, last_refill_at: t0() };

  assert!(buckets.compare_and_swap(&key, None, state).await.unwrap());
  assert!(!buckets.compare_and_swap(&key, None, state).await.unwrap());

  let read = buckets.read(&key).await.unwrap().unwrap();
  assert_eq!(read.state, state);
  assert!(buckets.compare_and_swap(&key, Some(read.version), state).await.unwrap());
  assert!(!buckets.compare_and_swap(&key, Some(read.version), state).await.unwrap());
}

// ─── Usage ───────────────────────────────────────────────────────────────────

fn event(id: &str, kind: ResourceKind, quantity: u64, at: DateTime<Utc>) -> UsageEvent {
  UsageEvent {
    event_id: id.into(),
    principal: "alice".into(),
    world_id: Some("w".into()),
    kind,
    quantity,
    recorded_at: at,
    metadata: BTreeMap::new(),
  }
}

#[tokio::test]
async fn usage_events_count_once() {
  let manager = DatabaseManager::open_in_memory().await.unwrap();
  let meter = SqliteUsageMeter::new(&manager);

  meter.record(event("e1", ResourceKind::Query, 1, t0())).await.unwrap();
  meter.record(event("e1", ResourceKind::Query, 1, t0())).await.unwrap();
  meter.record(event("e2", ResourceKind::Query, 2, t0())).await.unwrap();
  meter.record(event("e3", ResourceKind::Update, 1, t0())).await.unwrap();

  let totals = meter.totals("alice", t0()).await.unwrap();
  assert_eq!(totals.get(&ResourceKind::Query), Some(&3));
  assert_eq!(totals.get(&ResourceKind::Update), Some(&1));
  assert!(meter.totals("bob", t0()).await.unwrap().is_empty());
}

#[tokio::test]
async fn usage_totals_respect_since() {
  let manager = DatabaseManager::open_in_memory().await.unwrap();
  let meter = SqliteUsageMeter::new(&manager);

  meter.record(event("old", ResourceKind::Search, 5, t0())).await.unwrap();
  meter
    .record(event("new", ResourceKind::Search, 1, t0() + Duration::hours(1)))
    .await
    .unwrap();

  let totals = meter.totals("alice", t0() + Duration::minutes(1)).await.unwrap();
  assert_eq!(totals.get(&ResourceKind::Search), Some(&1));
}
