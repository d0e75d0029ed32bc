use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures raised by the MongoDB room store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// No ping succeeded while connecting.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings attempted before giving up.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// Periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// Creating an index failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// Writing a room document failed.
    #[error("failed to save room `{id}`")]
    SaveRoom {
        /// Room id.
        id: Uuid,
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// Reading a room document failed.
    #[error("failed to load room `{id}`")]
    LoadRoom {
        /// Room id.
        id: Uuid,
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// Listing rooms failed.
    #[error("failed to list rooms")]
    ListRooms {
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// Writing rounds, strokes or guesses failed.
    #[error("failed to write `{collection}` entries of room `{id}`")]
    SaveChildren {
        /// Child collection name.
        collection: &'static str,
        /// Room id.
        id: Uuid,
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// Reading rounds, strokes or guesses failed.
    #[error("failed to load `{collection}` entries of room `{id}`")]
    LoadChildren {
        /// Child collection name.
        collection: &'static str,
        /// Room id.
        id: Uuid,
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// Deleting a room or its children failed.
    #[error("failed to delete room `{id}`")]
    DeleteRoom {
        /// Room id.
        id: Uuid,
        /// Underlying driver error.
        #[source]
        source: MongoError,
    },
    /// A stored `_id` is not a UUID.
    #[error("stored room id `{value}` is not a valid UUID")]
    InvalidId {
        /// Raw stored value.
        value: String,
    },
}
