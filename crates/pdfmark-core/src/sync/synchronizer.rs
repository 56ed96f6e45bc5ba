//! Pushes local highlight changes to the remote store, falling back to the queue.

use super::queue::{DrainReport, QueueItemId, SyncQueue};
use super::remote::{DeletePayload, RemoteStore, SavePayload};
use crate::highlight::{Highlight, OwnerKey};
use crate::repository::{HighlightRepository, RepositoryResult};
use crate::storage::{HighlightStore, QueueStore};
use std::sync::Arc;

/// What happened to a single push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote call went through; carries the remote annotation id.
    Synced(String),
    /// The remote call failed and was queued for retry.
    Queued(QueueItemId),
    /// Nothing to send (ephemeral owner, or a delete of a never-synced highlight).
    Skipped,
    /// Owner is a local cache without a remote reference yet.
    Deferred,
    /// Queued saves for a never-synced highlight were dropped.
    Cancelled(usize),
}

/// Coordinates the repository, the outbox and the remote store.
pub struct Synchronizer<Q: QueueStore, H: HighlightStore, R: RemoteStore> {
    queue: SyncQueue<Q>,
    repository: Arc<HighlightRepository<H>>,
    remote: Arc<R>,
}

impl<Q: QueueStore, H: HighlightStore, R: RemoteStore> Synchronizer<Q, H, R> {
    pub fn new(queue: SyncQueue<Q>, repository: Arc<HighlightRepository<H>>, remote: Arc<R>) -> Self {
        Self {
            queue,
            repository,
            remote,
        }
    }

    pub fn queue(&self) -> &SyncQueue<Q> {
        &self.queue
    }

    pub fn repository(&self) -> &Arc<HighlightRepository<H>> {
        &self.repository
    }

    /// Send a stored highlight to the remote store.
    ///
    /// Remote failures never surface as errors; they land in the queue.
    pub async fn push_save(&self, highlight: &Highlight) -> RepositoryResult<SyncOutcome> {
        match &highlight.owner {
            OwnerKey::Ephemeral => return Ok(SyncOutcome::Skipped),
            OwnerKey::Local(_) => {
                log::debug!("deferring save of {} until its document is uploaded", highlight.id);
                return Ok(SyncOutcome::Deferred);
            }
            OwnerKey::Remote(_) => {}
        }
        let Some(payload) = SavePayload::from_highlight(highlight) else {
            return Ok(SyncOutcome::Skipped);
        };
        // The queued save goes out on the next drain; sending another would create a second annotation.
        if let Some(queued) = self.queue.pending_save_for(&highlight.id).await? {
            log::debug!("save of {} already queued as item {}", highlight.id, queued);
            return Ok(SyncOutcome::Queued(queued));
        }

        match self.remote.save(&payload).await {
            Ok(annotation) => {
                self.repository.mark_synced(&highlight.id, &annotation.id).await?;
                log::debug!("highlight {} synced as {}", highlight.id, annotation.id);
                Ok(SyncOutcome::Synced(annotation.id))
            }
            Err(e) => {
                log::warn!("remote save of {} failed: {}", highlight.id, e);
                let id = self.queue.enqueue_save(payload, &highlight.id, &e.to_string()).await?;
                Ok(SyncOutcome::Queued(id))
            }
        }
    }

    /// Remove a highlight locally and propagate the delete.
    ///
    /// A highlight that never synced has nothing to delete remotely, so any
    /// saves still queued for it are cancelled instead.
    pub async fn push_delete(&self, highlight: &Highlight) -> RepositoryResult<SyncOutcome> {
        // Prefer the stored copy: a queued save may have synced since the caller read it.
        let stored = self.repository.get(&highlight.id).await?;
        let remote_id = stored
            .and_then(|h| h.remote_id)
            .or_else(|| highlight.remote_id.clone());
        self.repository.remove(&highlight.id).await?;

        let Some(annotation_id) = remote_id else {
            let cancelled = self.queue.cancel_saves_for(&highlight.id).await?;
            return Ok(if cancelled > 0 {
                SyncOutcome::Cancelled(cancelled)
            } else {
                SyncOutcome::Skipped
            });
        };

        let payload = DeletePayload { annotation_id };
        match self.remote.delete(&payload).await {
            Ok(()) => Ok(SyncOutcome::Synced(payload.annotation_id)),
            Err(e) => {
                log::warn!("remote delete of {} failed: {}", payload.annotation_id, e);
                let id = self.queue.enqueue_delete(&payload.annotation_id, &e.to_string()).await?;
                Ok(SyncOutcome::Queued(id))
            }
        }
    }

    /// Push every unsynced highlight of an owner, typically after
    /// [`HighlightRepository::reassign_owner`].
    pub async fn push_unsynced(&self, owner: &OwnerKey) -> RepositoryResult<Vec<SyncOutcome>> {
        let mut outcomes = Vec::new();
        for highlight in self.repository.list_by_owner(owner).await? {
            if !highlight.synced {
                outcomes.push(self.push_save(&highlight).await?);
            }
        }
        Ok(outcomes)
    }

    /// Drain the queue now.
    pub async fn retry(&mut self) -> RepositoryResult<DrainReport> {
        let report = self.queue.drain(self.remote.as_ref(), self.repository.as_ref()).await?;
        log::info!(
            "sync retry: {} attempted, {} succeeded, {} still pending",
            report.attempted,
            report.succeeded,
            report.remaining
        );
        Ok(report)
    }

    /// Drain the queue if the poll interval has elapsed.
    pub async fn poll(&mut self) -> RepositoryResult<Option<DrainReport>> {
        if !self.queue.should_poll() {
            return Ok(None);
        }
        self.retry().await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::HighlightColor;
    use crate::storage::{BoxFuture, MemoryStorage};
    use crate::sync::remote::{RemoteAnnotation, RemoteError};
    use kurbo::{Rect, Size};
    use pollster::block_on;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct SwitchRemote {
        offline: AtomicBool,
        saved: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
    }

    impl SwitchRemote {
        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    impl RemoteStore for SwitchRemote {
        fn save(&self, payload: &SavePayload) -> BoxFuture<'_, Result<RemoteAnnotation, RemoteError>> {
            let result = if self.offline.load(Ordering::SeqCst) {
                Err(RemoteError::Timeout)
            } else {
                let mut saved = self.saved.lock().unwrap();
                saved.push(payload.content.clone());
                Ok(RemoteAnnotation { id: format!("r{}", saved.len()) })
            };
            Box::pin(async move { result })
        }

        fn delete(&self, payload: &DeletePayload) -> BoxFuture<'_, Result<(), RemoteError>> {
            let result = if self.offline.load(Ordering::SeqCst) {
                Err(RemoteError::Network("offline".to_string()))
            } else {
                self.deleted.lock().unwrap().push(payload.annotation_id.clone());
                Ok(())
            };
            Box::pin(async move { result })
        }
    }

    type TestSync = Synchronizer<MemoryStorage, MemoryStorage, SwitchRemote>;

    fn setup() -> (TestSync, Arc<SwitchRemote>) {
        let storage = Arc::new(MemoryStorage::new());
        let remote = Arc::new(SwitchRemote::default());
        let sync = Synchronizer::new(
            SyncQueue::new(storage.clone()),
            Arc::new(HighlightRepository::new(storage)),
            remote.clone(),
        );
        (sync, remote)
    }

    fn add(sync: &TestSync, owner: OwnerKey, text: &str) -> Highlight {
        let h = Highlight::text(
            owner,
            1,
            vec![Rect::new(0.0, 0.0, 40.0, 10.0)],
            Size::new(612.0, 792.0),
            HighlightColor::Pink,
            text,
        );
        block_on(sync.repository().add(h)).unwrap().unwrap()
    }

    fn doc() -> OwnerKey {
        OwnerKey::Remote("doc".to_string())
    }

    #[test]
    fn test_push_save_online() {
        let (sync, _) = setup();
        let h = add(&sync, doc(), "hello");

        let outcome = block_on(sync.push_save(&h)).unwrap();
        assert_eq!(outcome, SyncOutcome::Synced("r1".to_string()));

        let stored = block_on(sync.repository().get(&h.id)).unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.remote_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_push_save_offline_then_retry() {
        let (mut sync, remote) = setup();
        let h = add(&sync, doc(), "later");

        remote.set_offline(true);
        let outcome = block_on(sync.push_save(&h)).unwrap();
        assert!(matches!(outcome, SyncOutcome::Queued(_)));
        let pending = block_on(sync.queue().pending()).unwrap();
        assert_eq!(pending[0].last_error.as_deref(), Some("Remote call timed out"));

        remote.set_offline(false);
        let report = block_on(sync.retry()).unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.remaining, 0);
        assert!(block_on(sync.repository().get(&h.id)).unwrap().unwrap().synced);
    }

    #[test]
    fn test_repeated_offline_push_queues_one_save() {
        let (mut sync, remote) = setup();
        add(&sync, doc(), "one");

        remote.set_offline(true);
        let first = block_on(sync.push_unsynced(&doc())).unwrap();
        let second = block_on(sync.push_unsynced(&doc())).unwrap();
        assert_eq!(first, second);
        assert_eq!(block_on(sync.queue().pending_count()).unwrap(), 1);

        remote.set_offline(false);
        block_on(sync.retry()).unwrap();
        assert_eq!(*remote.saved.lock().unwrap(), vec!["one".to_string()]);
        assert!(block_on(sync.push_unsynced(&doc())).unwrap().is_empty());
    }

    #[test]
    fn test_ephemeral_and_local_owners() {
        let (sync, remote) = setup();
        let scratch = add(&sync, OwnerKey::Ephemeral, "scratch");
        let cached = add(&sync, OwnerKey::Local("cache-1".to_string()), "cached");

        assert_eq!(block_on(sync.push_save(&scratch)).unwrap(), SyncOutcome::Skipped);
        assert_eq!(block_on(sync.push_save(&cached)).unwrap(), SyncOutcome::Deferred);
        assert!(remote.saved.lock().unwrap().is_empty());
        assert_eq!(block_on(sync.queue().pending_count()).unwrap(), 0);
    }

    #[test]
    fn test_reassign_then_push_unsynced() {
        let (sync, remote) = setup();
        let local = OwnerKey::Local("cache-1".to_string());
        add(&sync, local.clone(), "one");
        add(&sync, local.clone(), "two");

        let moved = block_on(sync.repository().reassign_owner(&local, &doc())).unwrap();
        assert_eq!(moved, 2);

        let outcomes = block_on(sync.push_unsynced(&doc())).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o, SyncOutcome::Synced(_))));
        assert_eq!(remote.saved.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_synced_highlight() {
        let (sync, remote) = setup();
        let h = add(&sync, doc(), "bye");
        block_on(sync.push_save(&h)).unwrap();
        let stored = block_on(sync.repository().get(&h.id)).unwrap().unwrap();

        let outcome = block_on(sync.push_delete(&stored)).unwrap();
        assert_eq!(outcome, SyncOutcome::Synced("r1".to_string()));
        assert_eq!(*remote.deleted.lock().unwrap(), vec!["r1".to_string()]);
        assert!(block_on(sync.repository().get(&h.id)).unwrap().is_none());
    }

    #[test]
    fn test_delete_offline_is_queued() {
        let (sync, remote) = setup();
        let h = add(&sync, doc(), "bye");
        block_on(sync.push_save(&h)).unwrap();
        let stored = block_on(sync.repository().get(&h.id)).unwrap().unwrap();

        remote.set_offline(true);
        let outcome = block_on(sync.push_delete(&stored)).unwrap();
        assert!(matches!(outcome, SyncOutcome::Queued(_)));
        let pending = block_on(sync.queue().pending()).unwrap();
        assert_eq!(pending[0].target_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_delete_unsynced_cancels_queued_save() {
        let (sync, remote) = setup();
        let h = add(&sync, doc(), "never");

        remote.set_offline(true);
        block_on(sync.push_save(&h)).unwrap();
        remote.set_offline(false);

        let outcome = block_on(sync.push_delete(&h)).unwrap();
        assert_eq!(outcome, SyncOutcome::Cancelled(1));
        assert_eq!(block_on(sync.queue().pending_count()).unwrap(), 0);
        assert!(remote.deleted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_poll_respects_interval() {
        let (mut sync, _) = setup();
        assert!(block_on(sync.poll()).unwrap().is_some());
        assert!(block_on(sync.poll()).unwrap().is_none());
    }
}
