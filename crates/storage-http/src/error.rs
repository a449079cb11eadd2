//! Error types for HTTP sync operations.

use asset_sync_storage::SyncError;
use thiserror::Error;

/// Errors specific to the HTTP client.
#[derive(Error, Debug)]
pub enum HttpError {
    /// The request could not be sent or its response not read.
    #[error("HTTP request failed: {message}")]
    Request { message: String, retryable: bool },

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("Could not decode response: {message}")]
    Decode { message: String },

    /// No bearer token is available.
    #[error("Authentication failed: {message}")]
    Auth { message: String },
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return HttpError::Decode {
                message: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return HttpError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        HttpError::Request {
            retryable: err.is_timeout() || err.is_connect() || err.is_request(),
            message: err.to_string(),
        }
    }
}

impl From<HttpError> for SyncError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request { message, retryable } => SyncError::Network { message, retryable },
            HttpError::Status { status, body } => SyncError::Server {
                status,
                message: body,
            },
            HttpError::Decode { message } => SyncError::InvalidResponse { message },
            HttpError::Auth { message } => SyncError::Server {
                status: 401,
                message,
            },
        }
    }
}
