//! Save-time document and asset upload engine.
//!
//! This crate saves a project's serialized document and uploads the
//! project's pending binary assets to the server. It is transport-agnostic:
//! the server is reached through the [`SyncClient`] trait, implemented by
//! the HTTP backend in `asset-sync-storage-http` and by in-memory doubles in
//! tests.
//!
//! # Pipeline
//!
//! - **Priority** - assets are ranked by an optional [`PrioritySource`]
//! - **Quota** - the projected usage is checked before any asset is sent
//! - **Large assets** - sent in chunks through sliding windows, then
//!   confirmed with a bounded finalize loop
//! - **Small assets** - grouped into size-limited batches and sent as
//!   combined requests with bounded concurrency
//!
//! Per-asset failures never abort a save; failed assets stay pending and
//! are resent by the next one.

mod batch_upload;
mod chunked;
mod chunks;
mod error;
mod planner;
mod priority;
mod quota;
mod save;
mod settings;
#[cfg(test)]
mod testutil;
mod traits;
mod types;

pub use batch_upload::BatchUploadCoordinator;
pub use chunked::{session_identifier, ChunkUploadSession, ChunkedUploadCoordinator};
pub use chunks::{expected_chunk_count, generate_chunks, needs_chunking, ChunkInfo};
pub use error::{SyncError, TransferError};
pub use planner::{size_limited_batches, BatchPlanner};
pub use priority::{PriorityClassifier, PriorityTier};
pub use quota::{evaluate as evaluate_quota, QuotaDecision, QuotaGuard};
pub use save::{
    SaveOrchestrator, SavePhase, SaveProgress, SaveReport, SaveSession, ASSETS_SETTLED_PERCENT,
    COMPLETE_PERCENT, DOCUMENT_SAVED_PERCENT,
};
pub use settings::{BatchLimits, SyncSettings};
pub use traits::{AssetRegistry, DocumentStore, PrioritySource, SyncClient};
pub use types::{
    Asset, AssetManifestEntry, AssetPayload, Batch, ChunkAck, ChunkProgress, ChunkUpload,
    FinalizeRequest, ProjectTarget, StorageUsage, UploadOutcome,
};
