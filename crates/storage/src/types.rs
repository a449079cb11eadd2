//! Shared data structures for save and upload operations.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use asset_sync_common::{MIB, PRIORITY_IDLE};

use crate::error::TransferError;

/// A binary payload attached to a project.
///
/// Owned by the asset registry. The engine only reads it, apart from
/// asking the registry to flag it as uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Client-side identifier.
    pub id: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Original file name.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
    /// Content hash, computed on upload when absent.
    pub content_hash: Option<String>,
    /// Urgency score (see `PriorityTier`).
    pub priority: i32,
}

impl Asset {
    /// Create an asset with no known hash and idle priority.
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            size,
            filename: filename.into(),
            mime_type: mime_type.into(),
            content_hash: None,
            priority: PRIORITY_IDLE,
        }
    }

    /// Set the content hash.
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Set the priority score.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A group of small assets sent together in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Assets in manifest order.
    pub assets: Vec<Asset>,
    /// Sum of the assets' sizes.
    pub total_bytes: u64,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batch holding exactly one asset.
    pub fn single(asset: Asset) -> Self {
        let mut batch = Self::new();
        batch.push(asset);
        batch
    }

    /// Append an asset.
    pub fn push(&mut self, asset: Asset) {
        self.total_bytes += asset.size;
        self.assets.push(asset);
    }

    /// Number of assets in the batch.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// True if the batch holds no assets.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Identifies the project being saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTarget {
    /// Project identifier used in every endpoint path.
    pub project_id: String,
    /// Title pushed to the project metadata after upload, if any.
    pub title: Option<String>,
}

impl ProjectTarget {
    /// Create a target with no title.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            title: None,
        }
    }

    /// Set the title to sync after upload.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// One entry of the `metadata` part of a combined upload.
///
/// Entries are positionally aligned with the `files` parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifestEntry {
    pub client_id: String,
    pub filename: String,
    pub mime_type: String,
    pub content_hash: String,
}

/// An asset ready to be encoded into a combined upload request.
#[derive(Debug, Clone)]
pub struct AssetPayload {
    /// Manifest entry describing `data`.
    pub entry: AssetManifestEntry,
    /// File contents.
    pub data: Bytes,
}

/// One chunk of a large asset.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    /// Session identifier shared by every chunk of one attempt.
    pub identifier: String,
    /// 1-indexed chunk number.
    pub chunk_number: u32,
    /// Total chunks in the session.
    pub total_chunks: u32,
    /// Asset file name.
    pub filename: String,
    /// Asset MIME type.
    pub mime_type: String,
    /// Asset identifier.
    pub client_id: String,
    /// Chunk bytes.
    pub data: Bytes,
}

/// Assembly progress reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProgress {
    pub received: u32,
    pub total: u32,
}

/// Server acknowledgement for a chunk or finalize request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAck {
    /// True once the server holds and has assembled every chunk.
    #[serde(default)]
    pub complete: bool,
    /// Chunks received so far, when reported.
    #[serde(default)]
    pub progress: Option<ChunkProgress>,
}

impl ChunkAck {
    /// An acknowledgement carrying the completion signal.
    pub fn completed() -> Self {
        Self {
            complete: true,
            progress: None,
        }
    }
}

/// Body of a finalize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub resumable_identifier: String,
    pub resumable_total_chunks: u32,
    pub resumable_filename: String,
    pub resumable_type: String,
    pub client_id: String,
}

/// Storage usage reported by `GET /user/storage`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    /// Quota in megabytes; `None` when the user has no known quota.
    pub quota_mb: Option<f64>,
    /// Bytes already stored.
    #[serde(default)]
    pub used_bytes: u64,
}

impl StorageUsage {
    /// Quota in bytes, if known.
    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_mb
            .filter(|mb| mb.is_finite() && *mb >= 0.0)
            .map(|mb| (mb * MIB as f64) as u64)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Aggregated result of one upload cohort.
#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    /// Assets confirmed uploaded.
    pub uploaded_assets: usize,
    /// Bytes of the confirmed assets.
    pub uploaded_bytes: u64,
    /// Assets that failed and remain pending.
    pub failed_assets: usize,
    /// One entry per failed asset.
    pub errors: Vec<TransferError>,
}

impl UploadOutcome {
    /// Record a confirmed asset.
    pub fn record_uploaded(&mut self, size: u64) {
        self.uploaded_assets += 1;
        self.uploaded_bytes += size;
    }

    /// Record a failed asset.
    pub fn record_failed(&mut self, error: TransferError) {
        self.failed_assets += 1;
        self.errors.push(error);
    }

    /// Merge another outcome into this one.
    pub fn merge(&mut self, other: Self) {
        self.uploaded_assets += other.uploaded_assets;
        self.uploaded_bytes += other.uploaded_bytes;
        self.failed_assets += other.failed_assets;
        self.errors.extend(other.errors);
    }
}
