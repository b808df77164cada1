//! [`SqliteBucketStore`]: rate-limit buckets in the system database.
//!
//! Every write is conditional on the `version` read beforehand, so two
//! processes sharing the file cannot both spend the same token.

use rusqlite::OptionalExtension as _;
use tokio_rusqlite::Connection;
use worlds_core::{
  Result as CoreResult,
  limits::{BucketKey, BucketState, BucketStore, VersionedBucket},
};

use crate::{
  DatabaseManager, Result,
  encode::{decode_millis, encode_millis},
};

#[derive(Clone)]
pub struct SqliteBucketStore {
  conn: Connection,
}

impl SqliteBucketStore {
  pub fn new(manager: &DatabaseManager) -> Self { Self { conn: manager.accounting().clone() } }

  async fn fetch(&self, key: &BucketKey) -> Result<Option<VersionedBucket>> {
    let world = key.world_id.clone();
    let kind = key.kind.as_str();

    let raw: Option<(f64, i64, i64)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT tokens, last_refill_at, version FROM rate_limit_buckets
             WHERE world_id = ?1 AND kind = ?2",
            rusqlite::params![world, kind],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?)
      })
      .await?;

    raw
      .map(|(tokens, last, version)| {
        Ok(VersionedBucket {
          state:   BucketState { tokens, last_refill_at: decode_millis(last)? },
          version: version.max(0) as u64,
        })
      })
      .transpose()
  }

  async fn swap(&self, key: &BucketKey, expected: Option<u64>, state: BucketState) -> Result<bool> {
    let world  = key.world_id.clone();
    let kind   = key.kind.as_str();
    let tokens = state.tokens;
    let last   = encode_millis(state.last_refill_at);

    let changed = self
      .conn
      .call(move |conn| {
        let changed = match expected {
          None => conn.execute(
            "INSERT INTO rate_limit_buckets (world_id, kind, tokens, last_refill_at, version)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT (world_id, kind) DO NOTHING",
            rusqlite::params![world, kind, tokens, last],
          )?,
          Some(version) => conn.execute(
            "UPDATE rate_limit_buckets
             SET tokens = ?3, last_refill_at = ?4, version = version + 1
             WHERE world_id = ?1 AND kind = ?2 AND version = ?5",
            rusqlite::params![world, kind, tokens, last, version as i64],
          )?,
        };
        Ok(changed)
      })
      .await?;
    Ok(changed == 1)
  }
}

impl BucketStore for SqliteBucketStore {
  async fn read(&self, key: &BucketKey) -> CoreResult<Option<VersionedBucket>> {
    Ok(self.fetch(key).await?)
  }

  async fn compare_and_swap(
    &self,
    key:      &BucketKey,
    expected: Option<u64>,
    state:    BucketState,
  ) -> CoreResult<bool> {
    Ok(self.swap(key, expected, state).await?)
  }
}
