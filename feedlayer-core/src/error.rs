//! Error types and result types for feed operations.
//!
//! Every fallible call in the workspace returns [`FeedResult<T>`]. Remote failures are
//! surfaced as errors; expected "nothing written" outcomes are reported through return
//! values instead (see [`Outcome`](crate::page::Outcome)).

use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// Represents all possible errors that can occur when talking to a document service.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The endpoint is unreachable, or rejected the configured access key.
    #[error("Connection error: {0}")]
    Connection(String),
    /// The named container does not exist in the configured database.
    /// The first argument is the container name, the second is the database name.
    #[error("Container {0} not found in database {1}")]
    ContainerNotFound(String, String),
    /// The requested item was not found under the given partition key.
    /// The first argument is the item ID, the second is the container name.
    #[error("Item {0} not found in container {1}")]
    ItemNotFound(String, String),
    /// The client or query handle was used after it was released.
    #[error("{0} has been disposed")]
    Disposed(&'static str),
    /// The service answered with a status this layer does not treat as success.
    #[error("Remote error ({status}): {message}")]
    Remote {
        /// HTTP-style status code reported by the service.
        status: u16,
        /// Message body or reason reported by the service.
        message: String,
    },
    /// Serialization/deserialization error when converting items to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A query or filter expression could not be rendered or parsed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// The connection configuration is incomplete or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FeedError {
    /// Builds a [`FeedError::Remote`] from a status code and message.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        FeedError::Remote { status, message: message.into() }
    }

    /// Returns `true` for both container and item not-found errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FeedError::ContainerNotFound(..) | FeedError::ItemNotFound(..))
    }

    /// Returns the service status code, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FeedError::Remote { status, .. } => Some(*status),
            FeedError::ContainerNotFound(..) | FeedError::ItemNotFound(..) => Some(404),
            _ => None,
        }
    }
}

/// A specialized `Result` type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

impl From<SerdeJsonError> for FeedError {
    fn from(err: SerdeJsonError) -> Self {
        FeedError::Serialization(err.to_string())
    }
}

impl From<UrlParseError> for FeedError {
    fn from(err: UrlParseError) -> Self {
        FeedError::Configuration(err.to_string())
    }
}
