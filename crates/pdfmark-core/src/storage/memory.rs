//! In-memory storage implementation.

use super::{BoxFuture, HighlightStore, QueueStore, StorageError, StorageResult, sort_queue};
use crate::highlight::{Highlight, OwnerKey};
use crate::sync::{QueueItemId, SyncQueueItem};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

/// Highlight records plus a secondary (owner, page) index.
#[derive(Default)]
struct HighlightTable {
    records: HashMap<String, Highlight>,
    by_page: BTreeMap<(OwnerKey, u32), BTreeSet<String>>,
}

impl HighlightTable {
    fn insert(&mut self, highlight: Highlight) {
        self.unindex(&highlight.id);
        self.by_page
            .entry((highlight.owner.clone(), highlight.page))
            .or_default()
            .insert(highlight.id.clone());
        self.records.insert(highlight.id.clone(), highlight);
    }

    fn remove(&mut self, id: &str) {
        self.unindex(id);
        self.records.remove(id);
    }

    fn unindex(&mut self, id: &str) {
        if let Some(old) = self.records.get(id) {
            let key = (old.owner.clone(), old.page);
            if let Some(ids) = self.by_page.get_mut(&key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_page.remove(&key);
                }
            }
        }
    }

    fn page(&self, owner: &OwnerKey, page: u32) -> Vec<Highlight> {
        self.by_page
            .get(&(owner.clone(), page))
            .map(|ids| ids.iter().filter_map(|id| self.records.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    fn owner(&self, owner: &OwnerKey) -> Vec<Highlight> {
        self.by_page
            .iter()
            .filter(|((o, _), _)| o == owner)
            .flat_map(|(_, ids)| ids.iter().filter_map(|id| self.records.get(id).cloned()))
            .collect()
    }
}

#[derive(Default)]
struct QueueTable {
    next_id: QueueItemId,
    items: BTreeMap<QueueItemId, SyncQueueItem>,
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    highlights: RwLock<HighlightTable>,
    queue: RwLock<QueueTable>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl HighlightStore for MemoryStorage {
    fn put(&self, highlight: &Highlight) -> BoxFuture<'_, StorageResult<()>> {
        let highlight = highlight.clone();
        Box::pin(async move {
            let mut table = self.highlights.write().map_err(lock_error)?;
            table.insert(highlight);
            Ok(())
        })
    }

    fn get(&self, id: &str) -> BoxFuture<'_, StorageResult<Option<Highlight>>> {
        let id = id.to_string();
        Box::pin(async move {
            let table = self.highlights.read().map_err(lock_error)?;
            Ok(table.records.get(&id).cloned())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut table = self.highlights.write().map_err(lock_error)?;
            table.remove(&id);
            Ok(())
        })
    }

    fn list_by_owner(&self, owner: &OwnerKey) -> BoxFuture<'_, StorageResult<Vec<Highlight>>> {
        let owner = owner.clone();
        Box::pin(async move {
            let table = self.highlights.read().map_err(lock_error)?;
            Ok(table.owner(&owner))
        })
    }

    fn list_by_page(&self, owner: &OwnerKey, page: u32) -> BoxFuture<'_, StorageResult<Vec<Highlight>>> {
        let owner = owner.clone();
        Box::pin(async move {
            let table = self.highlights.read().map_err(lock_error)?;
            Ok(table.page(&owner, page))
        })
    }

    fn list_all(&self) -> BoxFuture<'_, StorageResult<Vec<Highlight>>> {
        Box::pin(async move {
            let table = self.highlights.read().map_err(lock_error)?;
            Ok(table.records.values().cloned().collect())
        })
    }
}

impl QueueStore for MemoryStorage {
    fn push(&self, mut item: SyncQueueItem) -> BoxFuture<'_, StorageResult<QueueItemId>> {
        Box::pin(async move {
            let mut queue = self.queue.write().map_err(lock_error)?;
            queue.next_id += 1;
            item.id = queue.next_id;
            queue.items.insert(item.id, item);
            Ok(queue.next_id)
        })
    }

    fn update(&self, item: &SyncQueueItem) -> BoxFuture<'_, StorageResult<()>> {
        let item = item.clone();
        Box::pin(async move {
            let mut queue = self.queue.write().map_err(lock_error)?;
            match queue.items.get_mut(&item.id) {
                Some(slot) => {
                    *slot = item;
                    Ok(())
                }
                None => Err(StorageError::NotFound(format!("sync queue item {}", item.id))),
            }
        })
    }

    fn remove(&self, id: QueueItemId) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let mut queue = self.queue.write().map_err(lock_error)?;
            queue.items.remove(&id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<SyncQueueItem>>> {
        Box::pin(async move {
            let queue = self.queue.read().map_err(lock_error)?;
            let mut items: Vec<SyncQueueItem> = queue.items.values().cloned().collect();
            sort_queue(&mut items);
            Ok(items)
        })
    }
}
