//! Local persistence for highlights and the sync outbox.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::highlight::{Highlight, OwnerKey};
use crate::sync::{QueueItemId, SyncQueueItem};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async store operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Highlight records, keyed by id and indexed by owner and page.
///
/// Every method is a single atomic operation on the backing store.
pub trait HighlightStore: Send + Sync {
    /// Insert or replace a highlight.
    fn put(&self, highlight: &Highlight) -> BoxFuture<'_, StorageResult<()>>;

    /// Fetch a highlight by id.
    fn get(&self, id: &str) -> BoxFuture<'_, StorageResult<Option<Highlight>>>;

    /// Delete a highlight. Deleting a missing id is not an error.
    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// All highlights of one owner.
    fn list_by_owner(&self, owner: &OwnerKey) -> BoxFuture<'_, StorageResult<Vec<Highlight>>>;

    /// All highlights of one owner on one page.
    fn list_by_page(&self, owner: &OwnerKey, page: u32) -> BoxFuture<'_, StorageResult<Vec<Highlight>>>;

    /// Every stored highlight, in no particular order.
    fn list_all(&self) -> BoxFuture<'_, StorageResult<Vec<Highlight>>>;
}

/// Auto-keyed sync outbox records.
pub trait QueueStore: Send + Sync {
    /// Append an item, assigning it the next id. The incoming `id` is ignored.
    fn push(&self, item: SyncQueueItem) -> BoxFuture<'_, StorageResult<QueueItemId>>;

    /// Replace an existing item. Fails with [`StorageError::NotFound`] when absent.
    fn update(&self, item: &SyncQueueItem) -> BoxFuture<'_, StorageResult<()>>;

    /// Remove an item. Removing a missing id is not an error.
    fn remove(&self, id: QueueItemId) -> BoxFuture<'_, StorageResult<()>>;

    /// All items, oldest first (timestamp, then id).
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<SyncQueueItem>>>;
}

/// Order queue items oldest first.
pub(crate) fn sort_queue(items: &mut [SyncQueueItem]) {
    items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
}
