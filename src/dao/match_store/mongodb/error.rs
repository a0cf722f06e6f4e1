use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB store operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB match store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string was rejected.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The client could not be built from parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The database never answered while connecting.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings sent before giving up.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// A liveness ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An index could not be created.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Target collection.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Upserting a record failed.
    #[error("failed to save match `{code}`")]
    SaveMatch {
        /// Match code.
        code: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading a record failed.
    #[error("failed to load match `{code}`")]
    LoadMatch {
        /// Match code.
        code: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}
