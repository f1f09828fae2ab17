//! Read-side contract between the pipeline and the metrics layer.
//!
//! The pipeline owns its item table, hook tallies, counters and channels.
//! [`PipelineSource`] is the only way the metrics layer looks at them, and
//! every read may fail so a scrape can fail as a whole.
//!
//! [`PipelineState`] is a ready-made implementation for hosts that do not
//! already keep this state somewhere else.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SourceError;
use crate::status::ItemStatus;

/// Read-only view of pipeline state, implemented by the pipeline.
///
/// Implementations must be cheap: every method runs inline on the scrape
/// thread and must not perform blocking I/O.
pub trait PipelineSource: Send + Sync {
    /// Visit the status of every tracked item exactly once.
    ///
    /// This is the iteration primitive the aggregator relies on. The
    /// implementation decides how iteration is made safe against concurrent
    /// mutation (per-shard locking, copy-on-read, ...). It must not hold an
    /// exclusive lock on the whole collection for longer than one pass.
    fn for_each_status(&self, visit: &mut dyn FnMut(ItemStatus)) -> Result<(), SourceError>;

    /// Webhook dispatch outcomes so far.
    fn webhook_counts(&self) -> Result<HookCounts, SourceError>;

    /// Command-hook dispatch outcomes so far.
    fn cmdhook_counts(&self) -> Result<HookCounts, SourceError>;

    /// Number of extraction retries since startup.
    fn retries(&self) -> Result<u64, SourceError>;

    /// Number of items that reached a terminal state since startup.
    fn finished(&self) -> Result<u64, SourceError>;

    /// Current occupancy of the pipeline's internal channels. Approximate.
    fn buffer_depths(&self) -> Result<BufferDepths, SourceError>;
}

/// Success and failure counts for one kind of hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookCounts {
    pub ok: u64,
    pub fail: u64,
}

impl HookCounts {
    pub fn new(ok: u64, fail: u64) -> Self {
        Self { ok, fail }
    }
}

/// Producer/consumer channels whose depth is exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferChannel {
    /// Raw filesystem events from the folder watcher.
    FolderEvents,
    /// Progress updates coming back from the extractor.
    XtractrUpdates,
    /// Debounced folder updates.
    FolderUpdates,
    /// Pending deletions.
    Deletes,
    /// Pending hook dispatches.
    Hooks,
}

impl BufferChannel {
    /// Every channel, in the order they are reported.
    pub const ALL: [BufferChannel; 5] = [
        Self::FolderEvents,
        Self::XtractrUpdates,
        Self::FolderUpdates,
        Self::Deletes,
        Self::Hooks,
    ];

    /// Value of the `name` label this channel is exported under.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FolderEvents => "folder_events",
            Self::XtractrUpdates => "xtractr_updates",
            Self::FolderUpdates => "folder_updates",
            Self::Deletes => "deletes",
            Self::Hooks => "hooks",
        }
    }
}

impl fmt::Display for BufferChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One sample of every channel's occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDepths {
    pub folder_events: u64,
    pub xtractr_updates: u64,
    pub folder_updates: u64,
    pub deletes: u64,
    pub hooks: u64,
}

impl BufferDepths {
    pub fn get(&self, channel: BufferChannel) -> u64 {
        match channel {
            BufferChannel::FolderEvents => self.folder_events,
            BufferChannel::XtractrUpdates => self.xtractr_updates,
            BufferChannel::FolderUpdates => self.folder_updates,
            BufferChannel::Deletes => self.deletes,
            BufferChannel::Hooks => self.hooks,
        }
    }

    pub fn set(&mut self, channel: BufferChannel, depth: u64) {
        match channel {
            BufferChannel::FolderEvents => self.folder_events = depth,
            BufferChannel::XtractrUpdates => self.xtractr_updates = depth,
            BufferChannel::FolderUpdates => self.folder_updates = depth,
            BufferChannel::Deletes => self.deletes = depth,
            BufferChannel::Hooks => self.hooks = depth,
        }
    }
}

/// Number of messages currently queued in a bounded tokio channel.
///
/// Racy by nature: the value may be stale by the time it is returned.
pub fn channel_depth<T>(sender: &mpsc::Sender<T>) -> u64 {
    sender.max_capacity().saturating_sub(sender.capacity()) as u64
}

/// Concurrent table of tracked items keyed by name.
///
/// Iteration locks one shard at a time, so writers on other shards are
/// never blocked by a scrape.
#[derive(Debug, Default)]
pub struct ItemTable {
    items: DashMap<String, ItemStatus>,
}

impl ItemTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item or overwrite its status. Returns the previous status.
    pub fn set_status(&self, name: impl Into<String>, status: ItemStatus) -> Option<ItemStatus> {
        self.items.insert(name.into(), status)
    }

    /// Stop tracking an item.
    pub fn remove(&self, name: &str) -> Option<ItemStatus> {
        self.items.remove(name).map(|(_, status)| status)
    }

    pub fn status(&self, name: &str) -> Option<ItemStatus> {
        self.items.get(name).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Visit every item's status once.
    pub fn for_each_status(&self, mut visit: impl FnMut(ItemStatus)) {
        for entry in self.items.iter() {
            visit(*entry.value());
        }
    }
}

/// Success/failure tally for one kind of hook.
#[derive(Debug, Default)]
pub struct HookTally {
    ok: AtomicU64,
    fail: AtomicU64,
}

impl HookTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatch outcome.
    pub fn record(&self, success: bool) {
        if success {
            self.ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fail.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn counts(&self) -> HookCounts {
        HookCounts {
            ok: self.ok.load(Ordering::Relaxed),
            fail: self.fail.load(Ordering::Relaxed),
        }
    }
}

type DepthProbe = Box<dyn Fn() -> u64 + Send + Sync>;

/// In-process pipeline state that implements [`PipelineSource`].
pub struct PipelineState {
    items: ItemTable,
    webhooks: HookTally,
    cmdhooks: HookTally,
    retries: AtomicU64,
    finished: AtomicU64,
    probes: RwLock<HashMap<BufferChannel, DepthProbe>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            items: ItemTable::new(),
            webhooks: HookTally::new(),
            cmdhooks: HookTally::new(),
            retries: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            probes: RwLock::new(HashMap::new()),
        }
    }

    pub fn items(&self) -> &ItemTable {
        &self.items
    }

    pub fn webhooks(&self) -> &HookTally {
        &self.webhooks
    }

    pub fn cmdhooks(&self) -> &HookTally {
        &self.cmdhooks
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finished(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Report the depth of `channel` through a custom probe.
    pub fn set_buffer_probe(
        &self,
        channel: BufferChannel,
        probe: impl Fn() -> u64 + Send + Sync + 'static,
    ) {
        self.probes.write().insert(channel, Box::new(probe));
    }

    /// Report the depth of a bounded tokio channel.
    ///
    /// Only a weak handle is kept, so watching a channel never keeps it open.
    /// Once every real sender is gone the depth reads as zero.
    pub fn watch_channel<T: Send + 'static>(
        &self,
        channel: BufferChannel,
        sender: &mpsc::Sender<T>,
    ) {
        let weak = sender.downgrade();
        self.set_buffer_probe(channel, move || {
            weak.upgrade()
                .map(|sender| channel_depth(&sender))
                .unwrap_or(0)
        });
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineState")
            .field("items", &self.items.len())
            .field("webhooks", &self.webhooks.counts())
            .field("cmdhooks", &self.cmdhooks.counts())
            .field("retries", &self.retries.load(Ordering::Relaxed))
            .field("finished", &self.finished.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PipelineSource for PipelineState {
    fn for_each_status(&self, visit: &mut dyn FnMut(ItemStatus)) -> Result<(), SourceError> {
        self.items.for_each_status(visit);
        Ok(())
    }

    fn webhook_counts(&self) -> Result<HookCounts, SourceError> {
        Ok(self.webhooks.counts())
    }

    fn cmdhook_counts(&self) -> Result<HookCounts, SourceError> {
        Ok(self.cmdhooks.counts())
    }

    fn retries(&self) -> Result<u64, SourceError> {
        Ok(self.retries.load(Ordering::Relaxed))
    }

    fn finished(&self) -> Result<u64, SourceError> {
        Ok(self.finished.load(Ordering::Relaxed))
    }

    fn buffer_depths(&self) -> Result<BufferDepths, SourceError> {
        let probes = self.probes.read();
        let mut depths = BufferDepths::default();
        for (channel, probe) in probes.iter() {
            depths.set(*channel, probe());
        }
        Ok(depths)
    }
}
