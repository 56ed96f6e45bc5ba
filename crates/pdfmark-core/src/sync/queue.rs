//! Durable outbox of remote operations that have not gone through yet.

use super::remote::{DeletePayload, RemoteStore, SavePayload};
use crate::repository::{HighlightRepository, RepositoryResult};
use crate::storage::{HighlightStore, QueueStore, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Auto-assigned queue item id.
pub type QueueItemId = u64;

/// Default interval between periodic drains.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Save,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    /// The remote call succeeded; the record only awaits removal.
    Done,
}

/// A remote operation waiting to be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: QueueItemId,
    pub action: SyncAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<SavePayload>,
    /// Local highlight a save belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// Remote annotation a delete targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub status: QueueStatus,
    pub timestamp: DateTime<Utc>,
}

impl SyncQueueItem {
    /// A save that failed with `error`.
    pub fn save(payload: SavePayload, local_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: 0,
            action: SyncAction::Save,
            payload: Some(payload),
            local_id: Some(local_id.into()),
            target_id: None,
            retry_count: 0,
            last_error: Some(error.into()),
            status: QueueStatus::Pending,
            timestamp: Utc::now(),
        }
    }

    /// A delete of remote annotation `target_id` that failed with `error`.
    pub fn delete(target_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: 0,
            action: SyncAction::Delete,
            payload: None,
            local_id: None,
            target_id: Some(target_id.into()),
            retry_count: 0,
            last_error: Some(error.into()),
            status: QueueStatus::Pending,
            timestamp: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueueStatus::Pending
    }
}

/// Sync tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interval between periodic drains.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Pending items left after the pass.
    pub remaining: usize,
}

/// Ordered, at-least-once outbox drained one item at a time.
pub struct SyncQueue<Q: QueueStore> {
    store: Arc<Q>,
    config: SyncConfig,
    last_drain: Option<Instant>,
}

impl<Q: QueueStore> SyncQueue<Q> {
    pub fn new(store: Arc<Q>) -> Self {
        Self::with_config(store, SyncConfig::default())
    }

    pub fn with_config(store: Arc<Q>, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            last_drain: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Record a failed save.
    pub async fn enqueue_save(&self, payload: SavePayload, local_id: &str, error: &str) -> StorageResult<QueueItemId> {
        let id = self.store.push(SyncQueueItem::save(payload, local_id, error)).await?;
        log::info!("queued remote save of {} as item {}: {}", local_id, id, error);
        Ok(id)
    }

    /// Record a failed delete.
    pub async fn enqueue_delete(&self, target_id: &str, error: &str) -> StorageResult<QueueItemId> {
        let id = self.store.push(SyncQueueItem::delete(target_id, error)).await?;
        log::info!("queued remote delete of {} as item {}: {}", target_id, id, error);
        Ok(id)
    }

    /// Pending items, oldest first.
    pub async fn pending(&self) -> StorageResult<Vec<SyncQueueItem>> {
        let mut items = self.store.list().await?;
        items.retain(SyncQueueItem::is_pending);
        Ok(items)
    }

    pub async fn pending_count(&self) -> StorageResult<usize> {
        Ok(self.pending().await?.len())
    }

    /// Drop one item explicitly.
    pub async fn clear(&self, id: QueueItemId) -> StorageResult<()> {
        log::info!("clearing sync queue item {}", id);
        self.store.remove(id).await
    }

    /// Drop every item. Returns how many were removed.
    pub async fn clear_all(&self) -> StorageResult<usize> {
        let items = self.store.list().await?;
        for item in &items {
            self.store.remove(item.id).await?;
        }
        log::info!("cleared {} sync queue items", items.len());
        Ok(items.len())
    }

    /// Drop queued saves for a highlight that was deleted before it ever synced.
    pub async fn cancel_saves_for(&self, local_id: &str) -> StorageResult<usize> {
        let mut cancelled = 0;
        for item in self.store.list().await? {
            if item.action == SyncAction::Save && item.local_id.as_deref() == Some(local_id) {
                self.store.remove(item.id).await?;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            log::debug!("cancelled {} queued saves for {}", cancelled, local_id);
        }
        Ok(cancelled)
    }

    /// The oldest pending save queued for `local_id`, if any.
    pub async fn pending_save_for(&self, local_id: &str) -> StorageResult<Option<QueueItemId>> {
        Ok(self
            .pending()
            .await?
            .into_iter()
            .find(|item| item.action == SyncAction::Save && item.local_id.as_deref() == Some(local_id))
            .map(|item| item.id))
    }

    /// A queued save whose highlight already carries a remote id has nothing left to send.
    async fn already_synced<H: HighlightStore>(
        &self,
        item: &SyncQueueItem,
        repository: &HighlightRepository<H>,
    ) -> RepositoryResult<bool> {
        let Some(local_id) = item.local_id.as_deref() else {
            return Ok(false);
        };
        let synced = repository
            .get(local_id)
            .await?
            .is_some_and(|h| h.remote_id.is_some());
        if synced {
            log::debug!("sync item {} skipped: {} already has a remote id", item.id, local_id);
        }
        Ok(synced)
    }

    /// Whether the poll interval has elapsed since the last drain.
    pub fn should_poll(&self) -> bool {
        match self.last_drain {
            Some(last) => last.elapsed() >= self.config.poll_interval,
            None => true,
        }
    }

    /// Retry every pending item once, oldest first, one at a time.
    ///
    /// A successful save marks the local highlight synced. A failure bumps
    /// `retry_count`, records the message and leaves the item pending for the
    /// next pass. Local store failures abort the pass.
    pub async fn drain<H: HighlightStore, R: RemoteStore + ?Sized>(
        &mut self,
        remote: &R,
        repository: &HighlightRepository<H>,
    ) -> RepositoryResult<DrainReport> {
        self.last_drain = Some(Instant::now());
        let mut report = DrainReport::default();

        // Items snapshot up front: anything enqueued during the pass waits for the next one.
        let items = self.store.list().await?;
        for mut item in items {
            if !item.is_pending() {
                // Left behind by an interrupted pass after the remote call succeeded.
                self.store.remove(item.id).await?;
                continue;
            }
            report.attempted += 1;

            let skip = item.action == SyncAction::Save && self.already_synced(&item, repository).await?;
            let result = match item.action {
                SyncAction::Save if skip => Ok(()),
                SyncAction::Save => match item.payload.as_ref() {
                    Some(payload) => match remote.save(payload).await {
                        Ok(annotation) => {
                            // Record the remote id before the item can be purged.
                            if let Some(local_id) = item.local_id.as_deref() {
                                if !repository.mark_synced(local_id, &annotation.id).await? {
                                    log::warn!("highlight {} was removed before its save synced", local_id);
                                }
                            }
                            item.status = QueueStatus::Done;
                            self.store.update(&item).await?;
                            Ok(())
                        }
                        Err(e) => Err(e.to_string()),
                    },
                    None => Err("save item has no payload".to_string()),
                },
                SyncAction::Delete => match item.target_id.clone() {
                    Some(annotation_id) => remote
                        .delete(&DeletePayload { annotation_id })
                        .await
                        .map_err(|e| e.to_string()),
                    None => Err("delete item has no target".to_string()),
                },
            };

            match result {
                Ok(()) => {
                    self.store.remove(item.id).await?;
                    report.succeeded += 1;
                    log::debug!("sync item {} ({:?}) succeeded", item.id, item.action);
                }
                Err(message) => {
                    item.retry_count += 1;
                    item.last_error = Some(message);
                    self.store.update(&item).await?;
                    report.failed += 1;
                    log::warn!(
                        "sync item {} ({:?}) failed, attempt {}: {}",
                        item.id,
                        item.action,
                        item.retry_count,
                        item.last_error.as_deref().unwrap_or_default()
                    );
                }
            }
        }

        report.remaining = self.pending_count().await?;
        Ok(report)
    }
}
