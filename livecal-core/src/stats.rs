//! Counters for applied remote changes.

use crate::bridge::ApplyOutcome;

/// Statistics from applying remote change batches
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl ApplyStats {
    /// Accumulate stats from another ApplyStats
    pub fn add(&mut self, other: &ApplyStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
    }

    pub fn record(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Inserted => self.created += 1,
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Deleted { .. } => self.deleted += 1,
            ApplyOutcome::Aborted { .. } | ApplyOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.created > 0 || self.updated > 0 || self.deleted > 0
    }
}
