use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{match_store::MatchStore, models::MatchEntity, storage::StorageResult};

/// Process-local [`MatchStore`] used when no database is configured.
#[derive(Clone, Default)]
pub struct InMemoryMatchStore {
    matches: Arc<DashMap<String, MatchEntity>>,
}

impl InMemoryMatchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Whether nothing was stored yet.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl MatchStore for InMemoryMatchStore {
    fn save_match(&self, game: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            matches.insert(game.code.clone(), game);
            Ok(())
        })
    }

    fn find_match(&self, code: String) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let matches = self.matches.clone();
        Box::pin(async move { Ok(matches.get(&code).map(|entry| entry.value().clone())) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
