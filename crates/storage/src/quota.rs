//! Pre-flight storage quota check.

use asset_sync_common::format_bytes;

use crate::error::SyncError;
use crate::traits::SyncClient;
use crate::types::{Asset, StorageUsage};

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The upload fits, or the quota is unknown.
    Allowed,
    /// The upload would exceed the quota.
    Blocked {
        /// User-facing explanation.
        message: String,
        used_bytes: u64,
        quota_bytes: u64,
        required_bytes: u64,
    },
}

impl QuotaDecision {
    /// True if the save may continue.
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }

    /// Convert a blocking decision into `SyncError::QuotaExceeded`.
    pub fn into_result(self) -> Result<(), SyncError> {
        match self {
            QuotaDecision::Allowed => Ok(()),
            QuotaDecision::Blocked {
                message,
                used_bytes,
                quota_bytes,
                required_bytes,
            } => Err(SyncError::QuotaExceeded {
                message,
                used_bytes,
                quota_bytes,
                required_bytes,
            }),
        }
    }
}

/// Checks projected usage against the user's quota. Never mutates state.
pub struct QuotaGuard<'a, C: SyncClient> {
    client: &'a C,
}

impl<'a, C: SyncClient> QuotaGuard<'a, C> {
    /// Create a guard using `client` to fetch usage.
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Bytes a set of assets will add.
    pub fn estimate(assets: &[Asset]) -> u64 {
        assets.iter().map(|a| a.size).sum()
    }

    /// Fetch usage and decide whether `estimated_bytes` more will fit.
    ///
    /// Fails open: an unknown quota, or a failure to fetch usage, allows
    /// the save.
    pub async fn check(&self, estimated_bytes: u64) -> QuotaDecision {
        match self.client.storage_usage().await {
            Ok(usage) => evaluate(&usage, estimated_bytes),
            Err(e) => {
                log::warn!("Could not fetch storage usage, skipping quota check: {}", e);
                QuotaDecision::Allowed
            }
        }
    }
}

/// Decide whether `estimated_bytes` more fit within `usage`.
pub fn evaluate(usage: &StorageUsage, estimated_bytes: u64) -> QuotaDecision {
    let Some(quota_bytes) = usage.quota_bytes() else {
        return QuotaDecision::Allowed;
    };

    let projected: u64 = usage.used_bytes.saturating_add(estimated_bytes);
    if projected <= quota_bytes {
        return QuotaDecision::Allowed;
    }

    QuotaDecision::Blocked {
        message: format!(
            "Not enough storage space: this save needs {} but only {} of {} is free",
            format_bytes(estimated_bytes),
            format_bytes(quota_bytes.saturating_sub(usage.used_bytes)),
            format_bytes(quota_bytes)
        ),
        used_bytes: usage.used_bytes,
        quota_bytes,
        required_bytes: estimated_bytes,
    }
}
