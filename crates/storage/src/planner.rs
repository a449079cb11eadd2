//! Grouping of small assets into combined upload requests.
//!
//! Pure logic, no I/O. Oversized assets are routed to the chunked path
//! before they get here, but the planner still accepts them and gives
//! each one a batch of its own.

use crate::priority::PriorityTier;
use crate::settings::BatchLimits;
use crate::types::{Asset, Batch};

/// Split assets into batches bounded by count and bytes.
///
/// Single greedy pass in input order. The current batch is closed when
/// adding the next asset would exceed `max_count` or push its byte total
/// over `max_bytes`. An asset is always added to some batch, so an asset
/// larger than `max_bytes` ends up alone.
///
/// # Arguments
/// * `assets` - Assets in the order they should be sent
/// * `max_count` - Maximum assets per batch
/// * `max_bytes` - Maximum bytes per batch
pub fn size_limited_batches(
    assets: impl IntoIterator<Item = Asset>,
    max_count: usize,
    max_bytes: u64,
) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    let mut current: Batch = Batch::new();

    for asset in assets {
        let over_count: bool = current.len() + 1 > max_count;
        let over_bytes: bool = current.total_bytes.saturating_add(asset.size) > max_bytes;
        if !current.is_empty() && (over_count || over_bytes) {
            batches.push(std::mem::take(&mut current));
        }
        current.push(asset);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Plans batches by priority tier.
#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
    /// Limits for medium, low and idle assets.
    normal: BatchLimits,
    /// Limits for high priority assets.
    high: BatchLimits,
}

impl BatchPlanner {
    /// Create a planner.
    ///
    /// # Arguments
    /// * `normal` - Limits for medium, low and idle assets
    /// * `high` - Tighter limits for high priority assets
    pub fn new(normal: BatchLimits, high: BatchLimits) -> Self {
        Self { normal, high }
    }

    /// Split assets by count and bytes using the normal limits.
    pub fn size_limited_batches(&self, assets: Vec<Asset>) -> Vec<Batch> {
        size_limited_batches(assets, self.normal.max_count, self.normal.max_bytes)
    }

    /// Build batches so urgent assets are never queued behind bulk ones.
    ///
    /// Critical assets get one batch each. High assets are batched with the
    /// tighter limits. Everything else is batched with the normal limits.
    /// Output order: critical singletons, high batches, normal batches.
    pub fn priority_batches(&self, assets: Vec<Asset>) -> Vec<Batch> {
        let mut critical: Vec<Asset> = Vec::new();
        let mut high: Vec<Asset> = Vec::new();
        let mut normal: Vec<Asset> = Vec::new();

        for asset in assets {
            match PriorityTier::from_score(asset.priority) {
                PriorityTier::Critical => critical.push(asset),
                PriorityTier::High => high.push(asset),
                _ => normal.push(asset),
            }
        }

        let mut batches: Vec<Batch> = critical.into_iter().map(Batch::single).collect();
        batches.extend(size_limited_batches(
            high,
            self.high.max_count,
            self.high.max_bytes,
        ));
        batches.extend(size_limited_batches(
            normal,
            self.normal.max_count,
            self.normal.max_bytes,
        ));
        batches
    }
}

impl Default for BatchPlanner {
    fn default() -> Self {
        let settings = crate::settings::SyncSettings::default();
        Self::new(settings.batch_limits, settings.high_priority_limits)
    }
}
