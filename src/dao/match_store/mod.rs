//! Persistence boundary for match records.

/// Process-local store.
pub mod memory;
/// MongoDB-backed store.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::{models::MatchEntity, storage::StorageResult};

/// Abstraction over the durable store of match history.
pub trait MatchStore: Send + Sync {
    /// Insert or replace the record keyed by the match code.
    fn save_match(&self, game: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a record by code.
    fn find_match(&self, code: String) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Cheap liveness check used by the supervisor and the health route.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the underlying connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
