//! Usage metering: an append-only record of consumed resources.
//!
//! Metering never gates a request. Callers record after the metered work
//! succeeds and ignore (but log) failures.

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, limits::ResourceKind};

/// One metered unit of work. `event_id` makes retried writes idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
  pub event_id:    String,
  pub principal:   String,
  pub world_id:    Option<String>,
  pub kind:        ResourceKind,
  pub quantity:    u64,
  pub recorded_at: DateTime<Utc>,
  #[serde(default)]
  pub metadata:    BTreeMap<String, String>,
}

/// Per-kind totals returned by [`UsageMeter::totals`].
pub type UsageTotals = BTreeMap<ResourceKind, u64>;

pub trait UsageMeter: Send + Sync {
  /// Append an event. Recording the same `event_id` twice counts it once.
  fn record(&self, event: UsageEvent) -> impl Future<Output = Result<()>> + Send + '_;

  /// Sum of quantities per kind for `principal` since `since`.
  fn totals<'a>(
    &'a self,
    principal: &'a str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<UsageTotals>> + Send + 'a;
}
