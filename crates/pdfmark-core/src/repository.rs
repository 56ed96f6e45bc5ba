//! Single source of truth for stored highlights.

use crate::highlight::{Highlight, OwnerKey};
use crate::storage::{HighlightStore, StorageError};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Repository errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Invalid highlight: {0}")]
    Invalid(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Callback fired after a highlight is stored.
pub type AddedListener = Box<dyn Fn(&Highlight) + Send + Sync>;

/// Highlight CRUD with duplicate suppression on top of a [`HighlightStore`].
pub struct HighlightRepository<S: HighlightStore> {
    store: Arc<S>,
    listeners: RwLock<Vec<AddedListener>>,
}

/// Newest first; ties broken by id so the order is total.
fn newer_first(a: &Highlight, b: &Highlight) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

/// Split highlights into survivors (most recent per signature) and the older
/// duplicates. Survivors come back ordered by `created_at`.
fn partition_duplicates(mut highlights: Vec<Highlight>) -> (Vec<Highlight>, Vec<Highlight>) {
    highlights.sort_by(newer_first);
    let mut seen = HashSet::new();
    let mut keep = Vec::new();
    let mut dropped = Vec::new();
    for highlight in highlights {
        if seen.insert(highlight.signature()) {
            keep.push(highlight);
        } else {
            dropped.push(highlight);
        }
    }
    keep.reverse();
    (keep, dropped)
}

impl<S: HighlightStore> HighlightRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Register a callback for newly stored highlights.
    pub fn on_added(&self, listener: impl Fn(&Highlight) + Send + Sync + 'static) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(Box::new(listener)),
            Err(e) => log::error!("Failed to register listener: {}", e),
        }
    }

    /// Highlights on one page, one per signature, oldest first.
    pub async fn list_by_page(&self, owner: &OwnerKey, page: u32) -> RepositoryResult<Vec<Highlight>> {
        let all = self.store.list_by_page(owner, page).await?;
        Ok(partition_duplicates(all).0)
    }

    /// Highlights on every page of an owner, one per signature, ordered by
    /// page then `created_at`.
    pub async fn list_by_owner(&self, owner: &OwnerKey) -> RepositoryResult<Vec<Highlight>> {
        let (mut all, _) = partition_duplicates(self.store.list_by_owner(owner).await?);
        all.sort_by(|a, b| {
            a.page
                .cmp(&b.page)
                .then(a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(all)
    }

    /// Store a new highlight.
    ///
    /// Returns `None` when an identical highlight already exists on the page.
    pub async fn add(&self, highlight: Highlight) -> RepositoryResult<Option<Highlight>> {
        highlight.validate().map_err(RepositoryError::Invalid)?;

        let signature = highlight.signature();
        let existing = self.store.list_by_page(&highlight.owner, highlight.page).await?;
        if existing.iter().any(|h| h.signature() == signature) {
            log::debug!("dropping duplicate highlight on page {}", highlight.page);
            return Ok(None);
        }

        self.store.put(&highlight).await?;
        log::debug!("stored {} highlight {} on page {}", highlight.kind(), highlight.id, highlight.page);

        match self.listeners.read() {
            Ok(listeners) => listeners.iter().for_each(|listener| listener(&highlight)),
            Err(e) => log::error!("Failed to notify listeners: {}", e),
        }
        Ok(Some(highlight))
    }

    pub async fn get(&self, id: &str) -> RepositoryResult<Option<Highlight>> {
        Ok(self.store.get(id).await?)
    }

    pub async fn remove(&self, id: &str) -> RepositoryResult<()> {
        self.store.delete(id).await?;
        log::debug!("removed highlight {}", id);
        Ok(())
    }

    /// Record the remote id of a highlight. Returns `false` when it no longer exists.
    pub async fn mark_synced(&self, id: &str, remote_id: &str) -> RepositoryResult<bool> {
        let Some(mut highlight) = self.store.get(id).await? else {
            return Ok(false);
        };
        highlight.remote_id = Some(remote_id.to_string());
        highlight.synced = true;
        self.store.put(&highlight).await?;
        Ok(true)
    }

    /// Delete older duplicates on one page. Returns the removed ids.
    pub async fn dedupe_page(&self, owner: &OwnerKey, page: u32) -> RepositoryResult<Vec<String>> {
        let all = self.store.list_by_page(owner, page).await?;
        self.remove_duplicates(all).await
    }

    /// Delete older duplicates across every page of an owner.
    pub async fn dedupe_owner(&self, owner: &OwnerKey) -> RepositoryResult<Vec<String>> {
        // Signatures embed the page number, so one pass covers all pages.
        let all = self.store.list_by_owner(owner).await?;
        self.remove_duplicates(all).await
    }

    async fn remove_duplicates(&self, highlights: Vec<Highlight>) -> RepositoryResult<Vec<String>> {
        let (_, dropped) = partition_duplicates(highlights);
        let mut removed = Vec::with_capacity(dropped.len());
        for highlight in dropped {
            self.store.delete(&highlight.id).await?;
            removed.push(highlight.id);
        }
        if !removed.is_empty() {
            log::info!("removed {} duplicate highlights", removed.len());
        }
        Ok(removed)
    }

    /// Move every highlight of `from` to `to`, e.g. once a locally cached
    /// document gets a remote reference. Moved highlights need a fresh sync.
    ///
    /// A highlight that duplicates one `to` already has on that page is deleted
    /// instead of moved. Returns the number moved.
    pub async fn reassign_owner(&self, from: &OwnerKey, to: &OwnerKey) -> RepositoryResult<usize> {
        let highlights = self.store.list_by_owner(from).await?;
        let mut moved = 0;
        let mut dropped = 0;
        for mut highlight in highlights {
            let signature = highlight.signature();
            let target = self.store.list_by_page(to, highlight.page).await?;
            if target.iter().any(|h| h.signature() == signature) {
                self.store.delete(&highlight.id).await?;
                dropped += 1;
                continue;
            }
            highlight.owner = to.clone();
            highlight.synced = false;
            highlight.remote_id = None;
            self.store.put(&highlight).await?;
            moved += 1;
        }
        log::info!(
            "reassigned {} highlights from {} to {} ({} duplicates dropped)",
            moved,
            from,
            to,
            dropped
        );
        Ok(moved)
    }
}
