//! Repository error types.
//!
//! Every administrative operation, the connection builder and the bulk
//! pipeline report failures through this single type.

use thiserror::Error;

/// Errors that can occur while operating the cluster repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Invalid or missing configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A configured host could not be resolved to a network address.
    #[error("Failed to resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to build the client transport.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// An operation was called before `build_client`.
    #[error("Client is not connected")]
    NotConnected,

    /// A handle was built twice without being closed in between.
    #[error("{0} is already initialized")]
    AlreadyInitialized(&'static str),

    /// The cluster answered with a non-success status.
    #[error("{operation} failed with status {status}: {body}")]
    Request {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The request never produced a response.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// A caller supplied document is not valid JSON or has the wrong shape.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The cluster rejected a bulk request because it is overloaded.
    #[error("Bulk request rejected: {0}")]
    Rejected(String),

    /// The bulk pipeline no longer accepts actions.
    #[error("Bulk processor is closed")]
    BulkClosed,

    /// The connected cluster is not the configured one.
    #[error("Connected to cluster {actual}, expected {expected}")]
    ClusterMismatch { expected: String, actual: String },

    /// Failed to parse a response from the cluster.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl RepositoryError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    /// Create an invalid document error.
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a request error from a failed response.
    pub fn request(operation: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::Request {
            operation,
            status,
            body: body.into(),
        }
    }

    /// Whether a bulk request failing with this error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl From<opensearch::Error> for RepositoryError {
    fn from(e: opensearch::Error) -> Self {
        Self::TransportError(e.to_string())
    }
}
