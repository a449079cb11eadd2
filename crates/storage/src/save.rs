//! Save orchestration.
//!
//! A save runs strictly sequential phases:
//!
//! ```text
//! Idle -> DocumentSaving -> QuotaChecking -> LargeAssetUploading
//!      -> SmallAssetUploading -> MetadataUpdating -> Completed | Failed
//! ```
//!
//! Concurrency exists only inside the two uploading phases. Progress is
//! reported on one 0-100 scale: the document save ends at 30, asset upload
//! spans 30-90 (split between the large and small cohorts by bytes), and the
//! metadata update spans 90-100.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use asset_sync_common::ProgressCallback;

use crate::batch_upload::BatchUploadCoordinator;
use crate::chunked::ChunkedUploadCoordinator;
use crate::chunks::needs_chunking;
use crate::error::{SyncError, TransferError};
use crate::planner::BatchPlanner;
use crate::priority::PriorityClassifier;
use crate::quota::QuotaGuard;
use crate::settings::SyncSettings;
use crate::traits::{AssetRegistry, DocumentStore, PrioritySource, SyncClient};
use crate::types::{Asset, ProjectTarget, UploadOutcome};

/// Progress when the document has been saved.
pub const DOCUMENT_SAVED_PERCENT: f64 = 30.0;
/// Progress when every asset has settled.
pub const ASSETS_SETTLED_PERCENT: f64 = 90.0;
/// Progress when the save is complete.
pub const COMPLETE_PERCENT: f64 = 100.0;

/// Phase of a save session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SavePhase {
    Idle,
    DocumentSaving,
    QuotaChecking,
    LargeAssetUploading,
    SmallAssetUploading,
    MetadataUpdating,
    Completed,
    Failed,
}

impl SavePhase {
    /// True for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SavePhase::Completed | SavePhase::Failed)
    }
}

/// State of the running save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSession {
    pub phase: SavePhase,
    /// 0 to 100, never decreasing.
    pub overall_progress: f64,
    pub uploaded_count: usize,
    pub failed_count: usize,
}

impl SaveSession {
    fn new() -> Self {
        Self {
            phase: SavePhase::Idle,
            overall_progress: 0.0,
            uploaded_count: 0,
            failed_count: 0,
        }
    }
}

/// Progress update delivered to a save's callback.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveProgress {
    pub phase: SavePhase,
    /// 0 to 100, never decreasing within a save.
    pub percent: f64,
    /// Assets uploaded so far.
    pub uploaded: usize,
    /// Assets failed so far.
    pub failed: usize,
    /// Human-readable description of the current step.
    pub message: String,
}

/// Summary of a finished save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    /// Assets confirmed uploaded.
    pub uploaded_count: usize,
    /// Assets that failed and remain pending.
    pub failed_count: usize,
    /// Bytes of the uploaded assets.
    pub uploaded_bytes: u64,
    /// One entry per failed asset.
    pub errors: Vec<TransferError>,
    /// True if the project title was sent and accepted.
    pub metadata_synced: bool,
    /// Final session state.
    pub session: SaveSession,
}

impl SaveReport {
    /// True if every pending asset was uploaded.
    pub fn is_complete(&self) -> bool {
        self.failed_count == 0
    }
}

/// Owns the session state while a save runs and clears it when dropped.
struct SessionTracker<'a> {
    session: &'a Mutex<Option<SaveSession>>,
    callback: Option<&'a dyn ProgressCallback<SaveProgress>>,
}

impl<'a> SessionTracker<'a> {
    fn start(
        session: &'a Mutex<Option<SaveSession>>,
        callback: Option<&'a dyn ProgressCallback<SaveProgress>>,
    ) -> Self {
        *lock_session(session) = Some(SaveSession::new());
        Self { session, callback }
    }

    /// Apply `update` to the session and emit the resulting progress.
    ///
    /// The callback runs after the lock is released, so it may inspect the
    /// orchestrator.
    fn update(&self, message: &str, update: impl FnOnce(&mut SaveSession)) -> SaveSession {
        let snapshot: SaveSession = {
            let mut guard = lock_session(self.session);
            let session: &mut SaveSession = guard.get_or_insert_with(SaveSession::new);
            let before: f64 = session.overall_progress;
            update(session);
            session.overall_progress = session
                .overall_progress
                .clamp(before, COMPLETE_PERCENT);
            session.clone()
        };
        if let Some(callback) = self.callback {
            callback.on_progress(&SaveProgress {
                phase: snapshot.phase,
                percent: snapshot.overall_progress,
                uploaded: snapshot.uploaded_count,
                failed: snapshot.failed_count,
                message: message.to_string(),
            });
        }
        snapshot
    }

    fn enter(&self, phase: SavePhase, message: &str) {
        log::debug!("Save phase {:?}: {}", phase, message);
        self.update(message, |s| s.phase = phase);
    }

    fn advance(&self, percent: f64, message: &str) {
        self.update(message, |s| s.overall_progress = percent);
    }

    fn record(&self, outcome: &UploadOutcome, message: &str) {
        self.update(message, |s| {
            s.uploaded_count = outcome.uploaded_assets;
            s.failed_count = outcome.failed_assets;
        });
    }

    fn complete(&self) -> SaveSession {
        self.update("Save complete", |s| {
            s.phase = SavePhase::Completed;
            s.overall_progress = COMPLETE_PERCENT;
        })
    }

    fn fail(&self, error: &SyncError) {
        self.update(&error.to_string(), |s| s.phase = SavePhase::Failed);
    }
}

impl Drop for SessionTracker<'_> {
    fn drop(&mut self) {
        *lock_session(self.session) = None;
    }
}

fn lock_session(session: &Mutex<Option<SaveSession>>) -> MutexGuard<'_, Option<SaveSession>> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// Split the 30-90 upload span between the large and small cohorts.
///
/// Shares are proportional to bytes, or to asset counts when every asset is
/// empty. Returns `(large_span, small_span)`.
fn split_upload_span(large: &[Asset], small: &[Asset]) -> (f64, f64) {
    let span: f64 = ASSETS_SETTLED_PERCENT - DOCUMENT_SAVED_PERCENT;
    let large_bytes: u64 = large.iter().map(|a| a.size).sum();
    let small_bytes: u64 = small.iter().map(|a| a.size).sum();

    let (large_weight, total_weight): (f64, f64) = if large_bytes + small_bytes > 0 {
        (large_bytes as f64, (large_bytes + small_bytes) as f64)
    } else {
        (large.len() as f64, (large.len() + small.len()) as f64)
    };
    if total_weight == 0.0 {
        return (0.0, 0.0);
    }

    let large_span: f64 = span * large_weight / total_weight;
    (large_span, span - large_span)
}

/// Saves a project's document and uploads its pending assets.
///
/// One orchestrator serves one project. Only one save may run at a time;
/// a concurrent call is rejected with `SyncError::SaveInProgress` rather
/// than queued.
///
/// # Example
///
/// ```ignore
/// let orchestrator = SaveOrchestrator::new(client, registry, document, ProjectTarget::new("p1"))
///     .with_priority_source(viewport);
/// let report = orchestrator.save(Some(&progress_fn(|p: &SaveProgress| {
///     println!("{:?} {:.0}%", p.phase, p.percent);
/// }))).await?;
/// ```
pub struct SaveOrchestrator<C: SyncClient> {
    client: C,
    registry: Arc<dyn AssetRegistry>,
    document: Arc<dyn DocumentStore>,
    classifier: PriorityClassifier,
    settings: SyncSettings,
    target: ProjectTarget,
    /// Held for the whole of a save.
    guard: tokio::sync::Mutex<()>,
    /// `Some` only while a save runs.
    session: Mutex<Option<SaveSession>>,
}

impl<C: SyncClient> SaveOrchestrator<C> {
    /// Create an orchestrator with default settings and no priority source.
    ///
    /// # Arguments
    /// * `client` - Server transport
    /// * `registry` - Source of pending assets
    /// * `document` - The document to save
    /// * `target` - Project identifier and optional title
    pub fn new(
        client: C,
        registry: Arc<dyn AssetRegistry>,
        document: Arc<dyn DocumentStore>,
        target: ProjectTarget,
    ) -> Self {
        Self {
            client,
            registry,
            document,
            classifier: PriorityClassifier::default(),
            settings: SyncSettings::default(),
            target,
            guard: tokio::sync::Mutex::new(()),
            session: Mutex::new(None),
        }
    }

    /// Rank assets with an external priority source.
    pub fn with_priority_source(mut self, source: Arc<dyn PrioritySource>) -> Self {
        self.classifier = PriorityClassifier::new(Some(source));
        self
    }

    /// Replace the pipeline settings.
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn target(&self) -> &ProjectTarget {
        &self.target
    }

    /// Snapshot of the running session, or `None` when idle.
    pub fn session(&self) -> Option<SaveSession> {
        lock_session(&self.session).clone()
    }

    /// True while a save holds the guard.
    pub fn is_saving(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// Save the document, upload pending assets and sync the title.
    ///
    /// Guard, quota and document failures abort the save. Per-asset upload
    /// failures do not: they are counted in the report and the assets stay
    /// pending, so the next save resends only them.
    ///
    /// # Arguments
    /// * `progress` - Optional callback for progress updates
    ///
    /// # Errors
    /// * `SyncError::SaveInProgress` if another save is running
    /// * `SyncError::QuotaExceeded` if the pending assets do not fit
    /// * Any error from validating settings, serializing or saving the
    ///   document, or listing pending assets
    pub async fn save(
        &self,
        progress: Option<&dyn ProgressCallback<SaveProgress>>,
    ) -> Result<SaveReport, SyncError> {
        let _permit = self
            .guard
            .try_lock()
            .map_err(|_| SyncError::SaveInProgress)?;
        let tracker = SessionTracker::start(&self.session, progress);

        match self.run(&tracker).await {
            Ok((outcome, metadata_synced)) => {
                let session: SaveSession = tracker.complete();
                log::info!(
                    "Saved project {}: {} assets uploaded ({} bytes), {} failed",
                    self.target.project_id,
                    outcome.uploaded_assets,
                    outcome.uploaded_bytes,
                    outcome.failed_assets
                );
                Ok(SaveReport {
                    uploaded_count: outcome.uploaded_assets,
                    failed_count: outcome.failed_assets,
                    uploaded_bytes: outcome.uploaded_bytes,
                    errors: outcome.errors,
                    metadata_synced,
                    session,
                })
            }
            Err(e) => {
                log::warn!("Save of project {} failed: {}", self.target.project_id, e);
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(&self, tracker: &SessionTracker<'_>) -> Result<(UploadOutcome, bool), SyncError> {
        self.settings.validate()?;
        let project_id: &str = &self.target.project_id;

        tracker.enter(SavePhase::DocumentSaving, "Saving document");
        let document: Vec<u8> = self.document.serialize().await?;
        let document_len: usize = document.len();
        self.client.save_document(project_id, document).await?;
        log::info!("Saved document for {} ({} bytes)", project_id, document_len);
        tracker.advance(DOCUMENT_SAVED_PERCENT, "Document saved");

        let pending: Vec<Asset> = self.registry.pending_assets().await?;
        let outcome: UploadOutcome = if pending.is_empty() {
            log::debug!("No pending assets for {}", project_id);
            tracker.advance(ASSETS_SETTLED_PERCENT, "No assets to upload");
            UploadOutcome::default()
        } else {
            self.upload_assets(pending, tracker).await?
        };

        tracker.enter(SavePhase::MetadataUpdating, "Updating project metadata");
        let metadata_synced: bool = match &self.target.title {
            Some(title) => match self.client.update_metadata(project_id, title).await {
                Ok(()) => true,
                Err(e) => {
                    let e = SyncError::MetadataSync {
                        message: e.to_string(),
                    };
                    log::warn!("{}", e);
                    false
                }
            },
            None => false,
        };

        Ok((outcome, metadata_synced))
    }

    /// Quota check, then the large cohort, then the small cohort.
    async fn upload_assets(
        &self,
        pending: Vec<Asset>,
        tracker: &SessionTracker<'_>,
    ) -> Result<UploadOutcome, SyncError> {
        let project_id: &str = &self.target.project_id;

        tracker.enter(SavePhase::QuotaChecking, "Checking storage quota");
        let estimated: u64 = QuotaGuard::<C>::estimate(&pending);
        QuotaGuard::new(&self.client)
            .check(estimated)
            .await
            .into_result()?;

        let ordered: Vec<Asset> = self
            .classifier
            .sort_descending(&self.classifier.classify(pending));
        let threshold: u64 = self.settings.large_file_threshold;
        let (large, small): (Vec<Asset>, Vec<Asset>) = ordered
            .into_iter()
            .partition(|a| needs_chunking(a.size, threshold));
        let (large_span, small_span) = split_upload_span(&large, &small);
        log::info!(
            "Uploading {} assets for {} ({} bytes): {} large, {} small",
            large.len() + small.len(),
            project_id,
            estimated,
            large.len(),
            small.len()
        );

        let mut outcome = UploadOutcome::default();

        tracker.enter(SavePhase::LargeAssetUploading, "Uploading large assets");
        if !large.is_empty() {
            let coordinator = ChunkedUploadCoordinator::new(
                &self.client,
                self.registry.as_ref(),
                project_id,
                &self.settings,
            );
            let report = |fraction: f64| {
                tracker.advance(
                    DOCUMENT_SAVED_PERCENT + large_span * fraction,
                    "Uploading large assets",
                )
            };
            outcome.merge(coordinator.upload_all(large, &report).await);
            tracker.record(&outcome, "Large assets settled");
        }

        tracker.enter(SavePhase::SmallAssetUploading, "Uploading assets");
        if !small.is_empty() {
            let planner = BatchPlanner::new(
                self.settings.batch_limits,
                self.settings.high_priority_limits,
            );
            let batches = planner.priority_batches(small);
            log::debug!("Planned {} batches", batches.len());

            let coordinator = BatchUploadCoordinator::new(
                &self.client,
                self.registry.as_ref(),
                project_id,
                self.settings.max_concurrent_batches,
            );
            let small_start: f64 = DOCUMENT_SAVED_PERCENT + large_span;
            let report = |fraction: f64| {
                tracker.advance(small_start + small_span * fraction, "Uploading assets")
            };
            outcome.merge(coordinator.dispatch(batches, &report).await);
            tracker.record(&outcome, "Assets settled");
        }

        tracker.advance(ASSETS_SETTLED_PERCENT, "Assets settled");
        Ok(outcome)
    }
}
