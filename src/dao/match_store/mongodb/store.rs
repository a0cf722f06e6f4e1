use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Collection, Database, IndexModel, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoMatchDocument, doc_code},
};
use crate::dao::{match_store::MatchStore, models::MatchEntity, storage::StorageResult};

const MATCH_COLLECTION_NAME: &str = "matches";

/// MongoDB-backed [`MatchStore`].
#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = IndexModel::builder()
            .keys(doc! {"status": 1, "updated_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("match_status_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MATCH_COLLECTION_NAME,
                index: "status,updated_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoMatchDocument> {
        self.inner
            .database
            .read()
            .await
            .collection::<MongoMatchDocument>(MATCH_COLLECTION_NAME)
    }

    async fn save(&self, game: MatchEntity) -> MongoResult<()> {
        let code = game.code.clone();
        let document: MongoMatchDocument = game.into();
        self.collection()
            .await
            .replace_one(doc_code(&code), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { code, source })?;

        Ok(())
    }

    async fn find(&self, code: String) -> MongoResult<Option<MatchEntity>> {
        let document = self
            .collection()
            .await
            .find_one(doc_code(&code))
            .await
            .map_err(|source| MongoDaoError::LoadMatch { code, source })?;

        Ok(document.map(Into::into))
    }
}

impl MatchStore for MongoMatchStore {
    fn save_match(&self, game: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save(game).await.map_err(Into::into) })
    }

    fn find_match(&self, code: String) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find(code).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
