//! Token-bucket admission control.
//!
//! Buckets are keyed by `(world, resource kind)` and live in a
//! [`BucketStore`] that only offers versioned reads and compare-and-swap
//! writes. [`RateLimiter`] runs the refill/consume step against a snapshot
//! and commits it optimistically, retrying a bounded number of times when
//! another request won the race.

use std::{collections::HashMap, fmt, future::Future};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// CAS attempts before a consume is reported as an infrastructure failure.
pub const MAX_CAS_ATTEMPTS: usize = 16;

/// Plan used when a principal has none or an unknown one.
pub const FALLBACK_PLAN: &str = "free";

// ─── Resource kinds and policies ─────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  Query,
  Update,
  Search,
  Import,
}

impl ResourceKind {
  pub const ALL: [Self; 4] = [Self::Query, Self::Update, Self::Search, Self::Import];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Query => "query",
      Self::Update => "update",
      Self::Search => "search",
      Self::Import => "import",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.as_str() == s)
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Refill schedule for one bucket: every `interval_ms`, `refill_rate`
/// tokens are added, up to `capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Policy {
  pub interval_ms: u64,
  pub capacity:    f64,
  pub refill_rate: f64,
}

impl Policy {
  pub const fn new(interval_ms: u64, capacity: f64, refill_rate: f64) -> Self {
    Self { interval_ms, capacity, refill_rate }
  }

  fn step_ms(&self) -> i64 { i64::try_from(self.interval_ms.max(1)).unwrap_or(i64::MAX) }
}

/// Policies per plan and resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
  pub plans:        HashMap<String, HashMap<ResourceKind, Policy>>,
  #[serde(default = "default_plan_name")]
  pub default_plan: String,
}

fn default_plan_name() -> String { FALLBACK_PLAN.to_owned() }

const MINUTE_MS: u64 = 60_000;

impl PolicyTable {
  /// The policy table used when configuration supplies none.
  pub fn builtin() -> Self {
    let tier = |query: f64, update: f64, search: f64, import: f64| {
      HashMap::from([
        (ResourceKind::Query, Policy::new(MINUTE_MS, query, query)),
        (ResourceKind::Update, Policy::new(MINUTE_MS, update, update)),
        (ResourceKind::Search, Policy::new(MINUTE_MS, search, search)),
        (ResourceKind::Import, Policy::new(MINUTE_MS, import, import)),
      ])
    };
    Self {
      plans:        HashMap::from([
        ("free".to_owned(), tier(60.0, 30.0, 30.0, 10.0)),
        ("pro".to_owned(), tier(600.0, 300.0, 300.0, 100.0)),
        ("enterprise".to_owned(), tier(6000.0, 3000.0, 3000.0, 1000.0)),
      ]),
      default_plan: FALLBACK_PLAN.to_owned(),
    }
  }

  /// The policy for `kind` under `plan`. Absent or unknown plans, and plans
  /// that omit `kind`, fall back to the default plan; if that also lacks
  /// `kind`, the built-in free tier applies.
  pub fn policy(&self, plan: Option<&str>, kind: ResourceKind) -> Policy {
    plan
      .and_then(|p| self.plans.get(p))
      .and_then(|kinds| kinds.get(&kind))
      .or_else(|| self.plans.get(&self.default_plan).and_then(|k| k.get(&kind)))
      .copied()
      .unwrap_or_else(|| builtin_free(kind))
  }
}

fn builtin_free(kind: ResourceKind) -> Policy {
  match kind {
    ResourceKind::Query => Policy::new(MINUTE_MS, 60.0, 60.0),
    ResourceKind::Update | ResourceKind::Search => Policy::new(MINUTE_MS, 30.0, 30.0),
    ResourceKind::Import => Policy::new(MINUTE_MS, 10.0, 10.0),
  }
}

impl Default for PolicyTable {
  fn default() -> Self { Self::builtin() }
}

// ─── Buckets ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
  pub world_id: String,
  pub kind:     ResourceKind,
}

impl BucketKey {
  pub fn new(world_id: impl Into<String>, kind: ResourceKind) -> Self {
    Self { world_id: world_id.into(), kind }
  }
}

impl fmt::Display for BucketKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.world_id, self.kind)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
  pub tokens:         f64,
  pub last_refill_at: DateTime<Utc>,
}

/// A bucket as read from the store, with the version a CAS must match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VersionedBucket {
  pub state:   BucketState,
  pub version: u64,
}

/// Storage for bucket state. Writes go only through compare-and-swap.
pub trait BucketStore: Send + Sync {
  fn read<'a>(
    &'a self,
    key: &'a BucketKey,
  ) -> impl Future<Output = Result<Option<VersionedBucket>>> + Send + 'a;

  /// Store `state` if the bucket's version is still `expected`
  /// (`None` = the bucket must not exist yet). Returns `false` when another
  /// writer got there first.
  fn compare_and_swap<'a>(
    &'a self,
    key: &'a BucketKey,
    expected: Option<u64>,
    state: BucketState,
  ) -> impl Future<Output = Result<bool>> + Send + 'a;
}

// ─── Limiter ─────────────────────────────────────────────────────────────────

/// Outcome of a consume. A denial is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
  pub allowed:   bool,
  pub remaining: f64,
  /// Allowed: when the bucket will be full again. Denied: when enough tokens
  /// will have refilled to cover the cost. `None` if that never happens.
  pub reset_at:  Option<DateTime<Utc>>,
}

impl Decision {
  /// Whole tokens left, for headers.
  pub fn remaining_whole(&self) -> u64 { self.remaining.max(0.0).floor() as u64 }
}

pub struct RateLimiter<B> {
  store:        B,
  max_attempts: usize,
}

impl<B: BucketStore> RateLimiter<B> {
  pub fn new(store: B) -> Self { Self { store, max_attempts: MAX_CAS_ATTEMPTS } }

  pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
    self.max_attempts = max_attempts.max(1);
    self
  }

  pub fn store(&self) -> &B { &self.store }

  pub async fn consume(&self, key: &BucketKey, cost: f64, policy: &Policy) -> Result<Decision> {
    self.consume_at(Utc::now(), key, cost, policy).await
  }

  pub async fn consume_at(
    &self,
    now: DateTime<Utc>,
    key: &BucketKey,
    cost: f64,
    policy: &Policy,
  ) -> Result<Decision> {
    for attempt in 1..=self.max_attempts {
      let read = self.store.read(key).await?;
      let state = refill(read.map(|v| v.state), now, policy);

      if state.tokens < cost {
        return Ok(Decision {
          allowed:   false,
          remaining: state.tokens,
          reset_at:  time_until(&state, cost, policy),
        });
      }

      let next = BucketState { tokens: state.tokens - cost, ..state };
      if self.store.compare_and_swap(key, read.map(|v| v.version), next).await? {
        return Ok(Decision {
          allowed:   true,
          remaining: next.tokens,
          reset_at:  time_until(&next, policy.capacity, policy),
        });
      }
      tracing::debug!(bucket = %key, attempt, "rate-limit CAS lost, retrying");
    }
    Err(Error::RateLimiterExhaustedRetries(key.to_string(), self.max_attempts))
  }
}

/// Apply whole elapsed intervals of refill. `last_refill_at` only ever moves
/// forward, and by whole intervals, so it never passes `now`.
fn refill(state: Option<BucketState>, now: DateTime<Utc>, policy: &Policy) -> BucketState {
  let Some(state) = state else {
    return BucketState { tokens: policy.capacity, last_refill_at: now };
  };
  let step = policy.step_ms();
  let elapsed = (now - state.last_refill_at).num_milliseconds();
  let mut tokens = state.tokens;
  let mut last = state.last_refill_at;

  if elapsed >= step {
    let intervals = elapsed / step;
    tokens += intervals as f64 * policy.refill_rate;
    last = advance(last, intervals, step).unwrap_or(now);
  }
  BucketState { tokens: tokens.clamp(0.0, policy.capacity.max(0.0)), last_refill_at: last }
}

/// When `state` will hold at least `target` tokens.
fn time_until(state: &BucketState, target: f64, policy: &Policy) -> Option<DateTime<Utc>> {
  let missing = target - state.tokens;
  if missing <= 0.0 {
    return Some(state.last_refill_at);
  }
  if target > policy.capacity || policy.refill_rate <= 0.0 {
    return None;
  }
  let intervals = (missing / policy.refill_rate).ceil() as i64;
  advance(state.last_refill_at, intervals, policy.step_ms())
}

/// `at` plus `intervals` steps of `step_ms`, or `None` past the end of time.
fn advance(at: DateTime<Utc>, intervals: i64, step_ms: i64) -> Option<DateTime<Utc>> {
  intervals
    .checked_mul(step_ms)
    .and_then(Duration::try_milliseconds)
    .and_then(|d| at.checked_add_signed(d))
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  };

  use super::*;

  /// Versioned in-memory map; `contention` forces that many CAS failures.
  #[derive(Default)]
  struct MemoryBuckets {
    map:        Mutex<HashMap<BucketKey, VersionedBucket>>,
    contention: AtomicUsize,
  }

  impl BucketStore for MemoryBuckets {
    async fn read(&self, key: &BucketKey) -> Result<Option<VersionedBucket>> {
      Ok(self.map.lock().unwrap().get(key).copied())
    }

    async fn compare_and_swap(
      &self,
      key: &BucketKey,
      expected: Option<u64>,
      state: BucketState,
    ) -> Result<bool> {
      if self
        .contention
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
      {
        return Ok(false);
      }
      let mut map = self.map.lock().unwrap();
      let current = map.get(key).map(|v| v.version);
      if current != expected {
        return Ok(false);
      }
      let version = current.map_or(1, |v| v + 1);
      map.insert(key.clone(), VersionedBucket { state, version });
      Ok(true)
    }
  }

  fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
  }

  fn key(kind: ResourceKind) -> BucketKey { BucketKey::new("world-1", kind) }

  #[tokio::test]
  async fn fresh_bucket_starts_full() {
    let limiter = RateLimiter::new(MemoryBuckets::default());
    let policy = Policy::new(60_000, 10.0, 10.0);
    let k = key(ResourceKind::Query);

    let first = limiter.consume_at(t0(), &k, 1.0, &policy).await.unwrap();
    assert!(first.allowed);
    assert_eq!(first.remaining, 9.0);
    let second = limiter.consume_at(t0(), &k, 1.0, &policy).await.unwrap();
    assert!(second.allowed);
    assert_eq!(second.remaining, 8.0);
  }

  #[tokio::test]
  async fn exhausted_bucket_denies_without_mutating() {
    let limiter = RateLimiter::new(MemoryBuckets::default());
    let policy = Policy::new(60_000, 3.0, 1.0);
    let k = key(ResourceKind::Query);

    for _ in 0..3 {
      assert!(limiter.consume_at(t0(), &k, 1.0, &policy).await.unwrap().allowed);
    }
    let denied = limiter.consume_at(t0(), &k, 1.0, &policy).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0.0);
    assert_eq!(denied.reset_at, Some(t0() + Duration::minutes(1)));

    let version = limiter.store().read(&k).await.unwrap().unwrap().version;
    limiter.consume_at(t0(), &k, 1.0, &policy).await.unwrap();
    assert_eq!(limiter.store().read(&k).await.unwrap().unwrap().version, version);
  }

  #[tokio::test]
  async fn refill_is_capped_at_capacity() {
    let limiter = RateLimiter::new(MemoryBuckets::default());
    let policy = Policy::new(1_000, 5.0, 1.0);
    let k = key(ResourceKind::Update);

    limiter.consume_at(t0(), &k, 2.0, &policy).await.unwrap();
    let later = t0() + Duration::milliseconds(2_500);
    let d = limiter.consume_at(later, &k, 0.0, &policy).await.unwrap();
    assert_eq!(d.remaining, 5.0);

    let much_later = t0() + Duration::hours(3);
    assert_eq!(limiter.consume_at(much_later, &k, 0.0, &policy).await.unwrap().remaining, 5.0);
  }

  #[tokio::test]
  async fn refill_advances_by_whole_intervals_only() {
    let limiter = RateLimiter::new(MemoryBuckets::default());
    let policy = Policy::new(1_000, 10.0, 2.0);
    let k = key(ResourceKind::Search);

    limiter.consume_at(t0(), &k, 10.0, &policy).await.unwrap();
    let at = t0() + Duration::milliseconds(2_700);
    let d = limiter.consume_at(at, &k, 1.0, &policy).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 3.0);

    let stored = limiter.store().read(&k).await.unwrap().unwrap().state;
    assert_eq!(stored.last_refill_at, t0() + Duration::seconds(2));
  }

  #[tokio::test]
  async fn clock_skew_never_moves_refill_backwards() {
    let limiter = RateLimiter::new(MemoryBuckets::default());
    let policy = Policy::new(1_000, 4.0, 1.0);
    let k = key(ResourceKind::Query);

    limiter.consume_at(t0(), &k, 1.0, &policy).await.unwrap();
    let earlier = t0() - Duration::seconds(30);
    let d = limiter.consume_at(earlier, &k, 0.0, &policy).await.unwrap();
    assert_eq!(d.remaining, 3.0);
    let stored = limiter.store().read(&k).await.unwrap().unwrap().state;
    assert_eq!(stored.last_refill_at, t0());
  }

  #[tokio::test]
  async fn resource_kinds_are_independent() {
    let limiter = RateLimiter::new(MemoryBuckets::default());
    let policy = Policy::new(60_000, 2.0, 2.0);

    for _ in 0..2 {
      limiter.consume_at(t0(), &key(ResourceKind::Query), 1.0, &policy).await.unwrap();
    }
    let q = limiter.consume_at(t0(), &key(ResourceKind::Query), 1.0, &policy).await.unwrap();
    assert!(!q.allowed);

    let u = limiter.consume_at(t0(), &key(ResourceKind::Update), 1.0, &policy).await.unwrap();
    assert!(u.allowed);
    assert_eq!(u.remaining, 1.0);
  }

  #[tokio::test]
  async fn lost_races_are_retried() {
    let store = MemoryBuckets::default();
    store.contention.store(3, Ordering::SeqCst);
    let limiter = RateLimiter::new(store);
    let policy = Policy::new(60_000, 5.0, 5.0);

    let d = limiter.consume_at(t0(), &key(ResourceKind::Query), 1.0, &policy).await.unwrap();
    assert!(d.allowed);
    assert_eq!(d.remaining, 4.0);
  }

  #[tokio::test]
  async fn endless_contention_is_a_fatal_error() {
    let store = MemoryBuckets::default();
    store.contention.store(usize::MAX, Ordering::SeqCst);
    let limiter = RateLimiter::new(store).with_max_attempts(4);
    let policy = Policy::new(60_000, 5.0, 5.0);

    let err = limiter
      .consume_at(t0(), &key(ResourceKind::Query), 1.0, &policy)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::RateLimiterExhaustedRetries(_, 4)));
  }

  #[tokio::test]
  async fn cost_above_capacity_never_resets() {
    let limiter = RateLimiter::new(MemoryBuckets::default());
    let policy = Policy::new(60_000, 3.0, 3.0);
    let d = limiter.consume_at(t0(), &key(ResourceKind::Import), 5.0, &policy).await.unwrap();
    assert!(!d.allowed);
    assert_eq!(d.reset_at, None);
  }

  #[tokio::test]
  async fn huge_intervals_saturate_instead_of_overflowing() {
    let limiter = RateLimiter::new(MemoryBuckets::default());
    let policy = Policy::new(u64::MAX, 2.0, 1.0);
    let k = key(ResourceKind::Import);

    let drained = limiter.consume_at(t0(), &k, 2.0, &policy).await.unwrap();
    assert!(drained.allowed);
    assert_eq!(drained.reset_at, None);

    let later = t0() + Duration::days(365 * 100);
    let denied = limiter.consume_at(later, &k, 1.0, &policy).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0.0);
    assert_eq!(denied.reset_at, None);
  }

  #[test]
  fn advance_reports_overflow_as_none() {
    assert_eq!(advance(t0(), 2, 1_000), Some(t0() + Duration::seconds(2)));
    assert_eq!(advance(t0(), i64::MAX, 2), None);
    assert_eq!(advance(t0(), 1, i64::MAX), None);
  }

  #[test]
  fn unknown_plans_fall_back() {
    let table = PolicyTable::builtin();
    let free = table.policy(Some("free"), ResourceKind::Query);
    assert_eq!(table.policy(None, ResourceKind::Query), free);
    assert_eq!(table.policy(Some("platinum"), ResourceKind::Query), free);
    assert!(table.policy(Some("pro"), ResourceKind::Query).capacity > free.capacity);
  }

  #[test]
  fn partial_plans_fall_back_per_kind() {
    let mut table = PolicyTable::builtin();
    table.plans.insert(
      "custom".into(),
      HashMap::from([(ResourceKind::Search, Policy::new(1_000, 1.0, 1.0))]),
    );
    assert_eq!(table.policy(Some("custom"), ResourceKind::Search).capacity, 1.0);
    assert_eq!(
      table.policy(Some("custom"), ResourceKind::Update),
      table.policy(None, ResourceKind::Update)
    );
  }
}
