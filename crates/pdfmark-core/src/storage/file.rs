//! File-based storage implementation.

use super::{BoxFuture, HighlightStore, QueueStore, StorageError, StorageResult, sort_queue};
use crate::highlight::{Highlight, OwnerKey};
use crate::sync::{QueueItemId, SyncQueueItem};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const HIGHLIGHTS_DIR: &str = "highlights";
const QUEUE_DIR: &str = "sync_queue";
const QUEUE_COUNTER: &str = "next_id";

/// File-based storage.
///
/// Each record is a JSON file: `highlights/<id>.json` and
/// `sync_queue/<n>.json`. Writes go through a temporary file and a rename so a
/// record is either fully present or absent.
pub struct FileStorage {
    /// Base directory for all records.
    base_path: PathBuf,
    /// Serializes queue id allocation.
    queue_lock: Mutex<()>,
}

impl FileStorage {
    /// Create a new file storage with the given base directory.
    ///
    /// Creates the directory layout if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        for dir in [HIGHLIGHTS_DIR, QUEUE_DIR] {
            let path = base_path.join(dir);
            if !path.exists() {
                fs::create_dir_all(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to create storage directory {}: {}", path.display(), e))
                })?;
            }
        }
        Ok(Self {
            base_path,
            queue_lock: Mutex::new(()),
        })
    }

    /// Create file storage in the default location.
    ///
    /// On Unix: `~/.local/share/pdfmark/`
    /// On Windows: `%LOCALAPPDATA%\pdfmark\`
    pub fn default_location() -> StorageResult<Self> {
        Self::new(Self::default_path()?)
    }

    /// Default base directory, without creating it.
    pub fn default_path() -> StorageResult<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;
        Ok(base.join("pdfmark"))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn highlight_path(&self, id: &str) -> PathBuf {
        self.base_path.join(HIGHLIGHTS_DIR).join(format!("{}.json", stem_for_id(id)))
    }

    fn queue_path(&self, id: QueueItemId) -> PathBuf {
        self.base_path.join(QUEUE_DIR).join(format!("{:020}.json", id))
    }

    fn load_all<T: DeserializeOwned>(&self, dir: &str) -> StorageResult<Vec<T>> {
        let dir = self.base_path.join(dir);
        if !dir.exists() {
            return Ok(vec![]);
        }
        let entries = fs::read_dir(&dir)
            .map_err(|e| StorageError::Io(format!("Failed to read directory {}: {}", dir.display(), e)))?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                records.push(read_json(&path)?);
            }
        }
        Ok(records)
    }

    /// Allocate the next queue id from the persisted counter.
    ///
    /// Ids are never reused, even after the newest item is removed.
    fn next_queue_id(&self) -> StorageResult<QueueItemId> {
        let counter = self.base_path.join(QUEUE_DIR).join(QUEUE_COUNTER);
        let last = if counter.exists() {
            let text = fs::read_to_string(&counter)
                .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", counter.display(), e)))?;
            text.trim()
                .parse::<QueueItemId>()
                .map_err(|e| StorageError::Serialization(format!("Bad queue counter {}: {}", counter.display(), e)))?
        } else {
            0
        };
        // Stores written before the counter existed only have their file names.
        let next = last.max(self.max_queue_file_id()?) + 1;

        let tmp = counter.with_extension("tmp");
        fs::write(&tmp, next.to_string())
            .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &counter)
            .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", counter.display(), e)))?;
        Ok(next)
    }

    fn max_queue_file_id(&self) -> StorageResult<QueueItemId> {
        let dir = self.base_path.join(QUEUE_DIR);
        let entries = fs::read_dir(&dir)
            .map_err(|e| StorageError::Io(format!("Failed to read directory {}: {}", dir.display(), e)))?;
        let max = entries
            .flatten()
            .filter_map(|entry| {
                entry
                    .path()
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.parse::<QueueItemId>().ok())
            })
            .max()
            .unwrap_or(0);
        Ok(max)
    }
}

/// File stem for a highlight id.
///
/// Ids made only of ASCII alphanumerics and `-` (every generated UUID) are used
/// as is. Anything else is hex-encoded behind a `~`, which never appears in a
/// plain stem, so distinct ids never share a file.
fn stem_for_id(id: &str) -> String {
    let plain = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if plain {
        id.to_string()
    } else {
        format!("~{}", hex::encode(id.as_bytes()))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let json = fs::read_to_string(path)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&json)
        .map_err(|e| StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| StorageError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))
}

fn remove_file(path: &Path) -> StorageResult<()> {
    if path.exists() {
        fs::remove_file(path)
            .map_err(|e| StorageError::Io(format!("Failed to delete {}: {}", path.display(), e)))?;
    }
    Ok(())
}

impl HighlightStore for FileStorage {
    fn put(&self, highlight: &Highlight) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.highlight_path(&highlight.id);
        let highlight = highlight.clone();
        Box::pin(async move { write_json(&path, &highlight) })
    }

    fn get(&self, id: &str) -> BoxFuture<'_, StorageResult<Option<Highlight>>> {
        let path = self.highlight_path(id);
        let id = id.to_string();
        Box::pin(async move {
            if !path.exists() {
                return Ok(None);
            }
            let highlight: Highlight = read_json(&path)?;
            if highlight.id != id {
                log::warn!("{} holds highlight {}, not {}", path.display(), highlight.id, id);
                return Ok(None);
            }
            Ok(Some(highlight))
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.highlight_path(id);
        Box::pin(async move { remove_file(&path) })
    }

    fn list_by_owner(&self, owner: &OwnerKey) -> BoxFuture<'_, StorageResult<Vec<Highlight>>> {
        let owner = owner.clone();
        Box::pin(async move {
            let mut all: Vec<Highlight> = self.load_all(HIGHLIGHTS_DIR)?;
            all.retain(|h| h.owner == owner);
            Ok(all)
        })
    }

    fn list_by_page(&self, owner: &OwnerKey, page: u32) -> BoxFuture<'_, StorageResult<Vec<Highlight>>> {
        let owner = owner.clone();
        Box::pin(async move {
            let mut all: Vec<Highlight> = self.load_all(HIGHLIGHTS_DIR)?;
            all.retain(|h| h.owner == owner && h.page == page);
            Ok(all)
        })
    }

    fn list_all(&self) -> BoxFuture<'_, StorageResult<Vec<Highlight>>> {
        Box::pin(async move { self.load_all(HIGHLIGHTS_DIR) })
    }
}

impl QueueStore for FileStorage {
    fn push(&self, mut item: SyncQueueItem) -> BoxFuture<'_, StorageResult<QueueItemId>> {
        Box::pin(async move {
            let _guard = self
                .queue_lock
                .lock()
                .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
            item.id = self.next_queue_id()?;
            write_json(&self.queue_path(item.id), &item)?;
            Ok(item.id)
        })
    }

    fn update(&self, item: &SyncQueueItem) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.queue_path(item.id);
        let item = item.clone();
        Box::pin(async move {
            if !path.exists() {
                return Err(StorageError::NotFound(format!("sync queue item {}", item.id)));
            }
            write_json(&path, &item)
        })
    }

    fn remove(&self, id: QueueItemId) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.queue_path(id);
        Box::pin(async move { remove_file(&path) })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<SyncQueueItem>>> {
        Box::pin(async move {
            let mut items: Vec<SyncQueueItem> = self.load_all(QUEUE_DIR)?;
            sort_queue(&mut items);
            Ok(items)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::HighlightColor;
    use kurbo::{Rect, Size};
    use pollster::block_on;
    use tempfile::tempdir;

    fn highlight(owner: &OwnerKey, page: u32) -> Highlight {
        Highlight::text(
            owner.clone(),
            page,
            vec![Rect::new(10.0, 10.0, 90.0, 22.0)],
            Size::new(612.0, 792.0),
            HighlightColor::Blue,
            "some text",
        )
    }

    #[test]
    fn test_file_storage_put_get() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let h = highlight(&OwnerKey::Ephemeral, 1);

        block_on(storage.put(&h)).unwrap();
        let loaded = block_on(storage.get(&h.id)).unwrap();

        assert_eq!(loaded, Some(h));
    }

    #[test]
    fn test_file_storage_not_found() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        assert_eq!(block_on(storage.get("nonexistent")).unwrap(), None);
    }

    #[test]
    fn test_file_storage_lists_by_page() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let doc = OwnerKey::Remote("doc".to_string());

        block_on(storage.put(&highlight(&doc, 1))).unwrap();
        block_on(storage.put(&highlight(&doc, 2))).unwrap();
        block_on(storage.put(&highlight(&OwnerKey::Ephemeral, 1))).unwrap();

        assert_eq!(block_on(storage.list_by_page(&doc, 1)).unwrap().len(), 1);
        assert_eq!(block_on(storage.list_by_owner(&doc)).unwrap().len(), 2);
    }

    #[test]
    fn test_file_storage_delete() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let h = highlight(&OwnerKey::Ephemeral, 1);

        block_on(storage.put(&h)).unwrap();
        block_on(storage.delete(&h.id)).unwrap();
        assert_eq!(block_on(storage.get(&h.id)).unwrap(), None);

        // Deleting twice is fine.
        block_on(storage.delete(&h.id)).unwrap();
    }

    #[test]
    fn test_file_storage_sanitizes_id() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let h = highlight(&OwnerKey::Ephemeral, 1).with_id("../weird/id:1");

        block_on(storage.put(&h)).unwrap();
        let loaded = block_on(storage.get("../weird/id:1")).unwrap().unwrap();
        assert_eq!(loaded.id, "../weird/id:1");
        assert!(!dir.path().join("weird").exists());
    }

    #[test]
    fn test_file_storage_similar_ids_do_not_collide() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let doc = OwnerKey::Remote("doc".to_string());
        let dotted = highlight(&doc, 1).with_id("annot.1");
        let underscored = highlight(&doc, 2).with_id("annot_1");

        block_on(storage.put(&dotted)).unwrap();
        block_on(storage.put(&underscored)).unwrap();

        assert_eq!(block_on(storage.get("annot.1")).unwrap(), Some(dotted));
        assert_eq!(block_on(storage.get("annot_1")).unwrap(), Some(underscored));
        assert_eq!(block_on(storage.list_by_owner(&doc)).unwrap().len(), 2);
        assert_eq!(block_on(storage.list_all()).unwrap().len(), 2);
    }

    #[test]
    fn test_stem_for_id() {
        let uuid = "5f0c7a3e-1b2d-4c5e-8f90-123456789abc";
        assert_eq!(stem_for_id(uuid), uuid);
        assert_eq!(stem_for_id("a.b"), "~612e62");
        assert_ne!(stem_for_id("annot.1"), stem_for_id("annot_1"));
    }

    #[test]
    fn test_file_queue_persists_across_instances() {
        let dir = tempdir().unwrap();
        {
            let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
            block_on(storage.push(SyncQueueItem::delete("r1", "offline"))).unwrap();
            block_on(storage.push(SyncQueueItem::delete("r2", "offline"))).unwrap();
        }

        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let items = block_on(storage.list()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].target_id.as_deref(), Some("r1"));

        let third = block_on(storage.push(SyncQueueItem::delete("r3", "offline"))).unwrap();
        assert_eq!(third, 3);

        block_on(storage.remove(items[0].id)).unwrap();
        assert_eq!(block_on(storage.list()).unwrap().len(), 2);
    }

    #[test]
    fn test_file_queue_ids_not_reused() {
        let dir = tempdir().unwrap();
        let first_storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        block_on(first_storage.push(SyncQueueItem::delete("r1", "offline"))).unwrap();
        let newest = block_on(first_storage.push(SyncQueueItem::delete("r2", "offline"))).unwrap();
        block_on(first_storage.remove(newest)).unwrap();
        drop(first_storage);

        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        let next = block_on(storage.push(SyncQueueItem::delete("r3", "offline"))).unwrap();
        assert_eq!(next, newest + 1);
        assert_eq!(block_on(storage.list()).unwrap().len(), 2);
    }
}
