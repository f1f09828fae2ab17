//! Point-in-time distribution of pipeline items across report buckets.

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};
use crate::source::PipelineSource;
use crate::status::Bucket;

/// Item counts per bucket plus the latest hook outcome counts.
///
/// Immutable once returned by [`snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub waiting: u64,
    pub queued: u64,
    pub extracting: u64,
    pub failed: u64,
    pub extracted: u64,
    pub imported: u64,
    pub deleted: u64,
    pub hook_ok: u64,
    pub hook_fail: u64,
    pub cmd_ok: u64,
    pub cmd_fail: u64,
}

impl StatsSnapshot {
    /// Number of items counted under `bucket`.
    pub fn count(&self, bucket: Bucket) -> u64 {
        match bucket {
            Bucket::Waiting => self.waiting,
            Bucket::Queued => self.queued,
            Bucket::Extracting => self.extracting,
            Bucket::Failed => self.failed,
            Bucket::Extracted => self.extracted,
            Bucket::Imported => self.imported,
            Bucket::Deleted => self.deleted,
        }
    }

    /// Bucket counts in report order.
    pub fn buckets(&self) -> impl Iterator<Item = (Bucket, u64)> + '_ {
        Bucket::ALL
            .into_iter()
            .map(move |bucket| (bucket, self.count(bucket)))
    }

    /// Number of items observed while the snapshot was taken.
    pub fn total_items(&self) -> u64 {
        self.buckets().map(|(_, count)| count).sum()
    }

    fn tally(&mut self, bucket: Bucket) {
        let slot = match bucket {
            Bucket::Waiting => &mut self.waiting,
            Bucket::Queued => &mut self.queued,
            Bucket::Extracting => &mut self.extracting,
            Bucket::Failed => &mut self.failed,
            Bucket::Extracted => &mut self.extracted,
            Bucket::Imported => &mut self.imported,
            Bucket::Deleted => &mut self.deleted,
        };
        *slot += 1;
    }
}

/// Build a [`StatsSnapshot`] from the pipeline's current state.
///
/// Walks the item view once. Items may change while the walk is in progress;
/// the counts are plausible (they add up to the items seen) but not a
/// linearizable cut of the table.
pub fn snapshot(source: &dyn PipelineSource) -> Result<StatsSnapshot> {
    let mut stats = StatsSnapshot::default();

    let webhooks = source
        .webhook_counts()
        .map_err(|e| MetricsError::read("webhook counts", e))?;
    let cmdhooks = source
        .cmdhook_counts()
        .map_err(|e| MetricsError::read("command hook counts", e))?;

    stats.hook_ok = webhooks.ok;
    stats.hook_fail = webhooks.fail;
    stats.cmd_ok = cmdhooks.ok;
    stats.cmd_fail = cmdhooks.fail;

    source
        .for_each_status(&mut |status| stats.tally(status.bucket()))
        .map_err(|e| MetricsError::read("pipeline items", e))?;

    Ok(stats)
}
