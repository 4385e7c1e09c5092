//! Error types of the HTTP client used by remote timer engines.

use reqwest::StatusCode;
use thiserror::Error;

use crate::{clock::ClockError, dao::storage::StorageError, timer::PushError};

/// Convenient result alias returning [`HttpClientError`] failures.
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// Failures that can occur while talking to the backend over HTTP.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered with a non-success status.
    #[error("unexpected response status {status} for `{path}` ({code}: {message})")]
    RequestStatus {
        path: String,
        status: StatusCode,
        code: String,
        message: String,
    },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// Reading the event stream failed mid-way.
    #[error("event stream `{path}` broke")]
    StreamRead {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<HttpClientError> for StorageError {
    fn from(err: HttpClientError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}

impl From<HttpClientError> for ClockError {
    fn from(err: HttpClientError) -> Self {
        ClockError::new(err.to_string())
    }
}

impl From<HttpClientError> for PushError {
    fn from(err: HttpClientError) -> Self {
        PushError::new(err.to_string())
    }
}
