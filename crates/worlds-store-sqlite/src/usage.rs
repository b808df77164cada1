//! [`SqliteUsageMeter`]: usage events in the system database.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use worlds_core::{
  Result as CoreResult,
  limits::ResourceKind,
  usage::{UsageEvent, UsageMeter, UsageTotals},
};

use crate::{DatabaseManager, Result, encode::encode_dt};

#[derive(Clone)]
pub struct SqliteUsageMeter {
  conn: Connection,
}

impl SqliteUsageMeter {
  pub fn new(manager: &DatabaseManager) -> Self { Self { conn: manager.accounting().clone() } }

  async fn insert(&self, event: UsageEvent) -> Result<bool> {
    let metadata    = serde_json::to_string(&event.metadata)?;
    let recorded_at = encode_dt(event.recorded_at);
    let kind        = event.kind.as_str();
    let quantity    = i64::try_from(event.quantity).unwrap_or(i64::MAX);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO usage_events (
             event_id, principal, world_id, kind, quantity, recorded_at, metadata
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            event.event_id,
            event.principal,
            event.world_id,
            kind,
            quantity,
            recorded_at,
            metadata,
          ],
        )?)
      })
      .await?;
    Ok(inserted == 1)
  }

  async fn sum(&self, principal: &str, since: DateTime<Utc>) -> Result<UsageTotals> {
    let principal = principal.to_owned();
    let since     = encode_dt(since);

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT kind, SUM(quantity) FROM usage_events
           WHERE principal = ?1 AND recorded_at >= ?2
           GROUP BY kind",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![principal, since], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut totals = BTreeMap::new();
    for (kind, total) in rows {
      match ResourceKind::parse(&kind) {
        Some(kind) => {
          totals.insert(kind, total.max(0) as u64);
        }
        None => tracing::warn!(kind = %kind, "ignoring usage rows of unknown kind"),
      }
    }
    Ok(totals)
  }
}

impl UsageMeter for SqliteUsageMeter {
  async fn record(&self, event: UsageEvent) -> CoreResult<()> {
    let event_id = event.event_id.clone();
    if !self.insert(event).await? {
      tracing::debug!(event = %event_id, "duplicate usage event ignored");
    }
    Ok(())
  }

  async fn totals(&self, principal: &str, since: DateTime<Utc>) -> CoreResult<UsageTotals> {
    Ok(self.sum(principal, since).await?)
  }
}
