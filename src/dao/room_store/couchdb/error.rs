//! Error types of the CouchDB room store.

use reqwest::StatusCode;
use thiserror::Error;

/// Result alias returning [`CouchDaoError`] failures.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while talking to CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// Building the HTTP client failed.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a GET against the target database.
    #[error("failed to query CouchDB database `{database}`")]
    DatabaseQuery {
        /// Database name.
        database: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a database creation request.
    #[error("failed to create CouchDB database `{database}`")]
    DatabaseCreate {
        /// Database name.
        database: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected status code for a database operation.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        /// Database name.
        database: String,
        /// Status returned by CouchDB.
        status: StatusCode,
    },
    /// A request to a document endpoint could not be sent.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        /// Request path relative to the server.
        path: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected status code for a document endpoint.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus {
        /// Request path relative to the server.
        path: String,
        /// Status returned by CouchDB.
        status: StatusCode,
    },
    /// The document revision sent with a write is no longer the latest one.
    #[error("revision conflict on `{path}`")]
    RevisionConflict {
        /// Request path relative to the server.
        path: String,
    },
    /// Response payload could not be read as JSON.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        /// Request path relative to the server.
        path: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// A JSON value did not match the expected model.
    #[error("failed to deserialize CouchDB value for `{path}`")]
    DeserializeValue {
        /// Request path relative to the server.
        path: String,
        /// Underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
}

impl CouchDaoError {
    /// Whether CouchDB answered 409 to a write.
    pub fn is_revision_conflict(&self) -> bool {
        matches!(self, CouchDaoError::RevisionConflict { .. })
    }
}
