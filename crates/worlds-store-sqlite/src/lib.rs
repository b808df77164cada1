//! SQLite backend for the Worlds graph service.
//!
//! Every world lives in its own database file, provisioned lazily by the
//! [`DatabaseManager`]; a separate system database holds the world registry,
//! rate-limit buckets and usage events. All access goes through
//! [`tokio_rusqlite`] so queries run off the async runtime.

mod encode;
mod schema;

pub mod buckets;
pub mod error;
pub mod index;
pub mod manager;
pub mod store;
pub mod usage;

pub use buckets::SqliteBucketStore;
pub use error::{Error, Result};
pub use index::SqliteChunkIndex;
pub use manager::{DatabaseManager, StorageRoot, WorldHandle};
pub use store::SqliteWorldStore;
pub use usage::SqliteUsageMeter;

#[cfg(test)]
mod tests;
