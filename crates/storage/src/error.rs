//! Error types for save and upload operations.

use thiserror::Error;

/// Errors that can occur while saving a project and uploading its assets.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Another save is running on this orchestrator.
    #[error("A save is already in progress")]
    SaveInProgress,

    /// Projected storage usage would exceed the user's quota.
    #[error("{message}")]
    QuotaExceeded {
        message: String,
        used_bytes: u64,
        quota_bytes: u64,
        required_bytes: u64,
    },

    /// Transport-level failure talking to the server.
    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    /// Server answered with a non-success status.
    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    /// All chunks were sent but the server never confirmed assembly.
    #[error("Upload of {asset_id} not confirmed after {attempts} finalize attempts")]
    FinalizeExhausted { asset_id: String, attempts: u32 },

    /// Project metadata could not be updated.
    #[error("Metadata sync failed: {message}")]
    MetadataSync { message: String },

    /// The document could not be serialized.
    #[error("Document serialization failed: {message}")]
    Document { message: String },

    /// The asset registry failed to list, read or mark an asset.
    #[error("Asset registry error: {message}")]
    Registry { message: String },

    /// The server response could not be decoded.
    #[error("Invalid server response: {message}")]
    InvalidResponse { message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl SyncError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { retryable, .. } => *retryable,
            SyncError::Server { status, .. } => *status >= 500 || *status == 429,
            SyncError::SaveInProgress => true,
            SyncError::FinalizeExhausted { .. } => true,
            SyncError::QuotaExceeded { .. } => false,
            SyncError::MetadataSync { .. } => false,
            SyncError::Document { .. } => false,
            SyncError::Registry { .. } => false,
            SyncError::InvalidResponse { .. } => false,
            SyncError::InvalidConfig { .. } => false,
        }
    }
}

/// Non-fatal error for one asset during a save.
///
/// The asset stays pending and is sent again by the next save.
#[derive(Debug, Clone)]
pub struct TransferError {
    /// The asset that failed.
    pub asset_id: String,
    /// The error that occurred.
    pub error: SyncError,
}

impl TransferError {
    /// Create a new transfer error.
    pub fn new(asset_id: impl Into<String>, error: SyncError) -> Self {
        Self {
            asset_id: asset_id.into(),
            error,
        }
    }
}
