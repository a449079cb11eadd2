//! Asset urgency classification.
//!
//! Scores come from an optional external `PrioritySource`. Scores are
//! bucketed into tiers that decide how assets are batched and in which
//! order batches are dispatched.

use std::sync::Arc;

use asset_sync_common::{
    PRIORITY_CRITICAL, PRIORITY_HIGH, PRIORITY_IDLE, PRIORITY_LOW, PRIORITY_MEDIUM,
};

use crate::traits::PrioritySource;
use crate::types::Asset;

/// Coarse urgency classification of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityTier {
    Idle,
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityTier {
    /// Bucket a raw score into a tier.
    pub fn from_score(score: i32) -> Self {
        if score >= PRIORITY_CRITICAL {
            PriorityTier::Critical
        } else if score >= PRIORITY_HIGH {
            PriorityTier::High
        } else if score >= PRIORITY_MEDIUM {
            PriorityTier::Medium
        } else if score >= PRIORITY_LOW {
            PriorityTier::Low
        } else {
            PriorityTier::Idle
        }
    }

    /// Canonical score of this tier.
    pub fn score(self) -> i32 {
        match self {
            PriorityTier::Critical => PRIORITY_CRITICAL,
            PriorityTier::High => PRIORITY_HIGH,
            PriorityTier::Medium => PRIORITY_MEDIUM,
            PriorityTier::Low => PRIORITY_LOW,
            PriorityTier::Idle => PRIORITY_IDLE,
        }
    }
}

/// Maps asset identifiers to priority scores.
#[derive(Clone, Default)]
pub struct PriorityClassifier {
    source: Option<Arc<dyn PrioritySource>>,
}

impl PriorityClassifier {
    /// Create a classifier backed by an optional priority source.
    pub fn new(source: Option<Arc<dyn PrioritySource>>) -> Self {
        Self { source }
    }

    /// Priority score for an asset; idle when the source does not know it.
    pub fn get_priority(&self, asset_id: &str) -> i32 {
        self.source
            .as_ref()
            .and_then(|s| s.priority(asset_id))
            .unwrap_or(PRIORITY_IDLE)
    }

    /// Tier for an asset.
    pub fn tier(&self, asset_id: &str) -> PriorityTier {
        PriorityTier::from_score(self.get_priority(asset_id))
    }

    /// Stamp each asset with its score from the source.
    ///
    /// Without a source the registry-provided scores are left as they are.
    pub fn classify(&self, mut assets: Vec<Asset>) -> Vec<Asset> {
        if self.source.is_some() {
            for asset in &mut assets {
                asset.priority = self.get_priority(&asset.id);
            }
        }
        assets
    }

    /// Return the assets ordered by descending score.
    ///
    /// The sort is stable: equal scores keep their input order.
    pub fn sort_descending(&self, assets: &[Asset]) -> Vec<Asset> {
        let mut sorted: Vec<Asset> = assets.to_vec();
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        sorted
    }
}

impl std::fmt::Debug for PriorityClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityClassifier")
            .field("has_source", &self.source.is_some())
            .finish()
    }
}
