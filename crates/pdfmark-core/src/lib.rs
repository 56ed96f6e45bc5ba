//! pdfmark Core Library
//!
//! Platform-agnostic highlight model, coordinate transforms, offline storage and
//! remote synchronization for PDF highlights.

pub mod highlight;
pub mod overlay;
pub mod palette;
pub mod repository;
pub mod storage;
pub mod sync;
pub mod transform;

pub use highlight::{Geometry, Highlight, HighlightId, HighlightKind, OwnerKey};
pub use overlay::{OverlayConfig, OverlayMode, PageOverlay, PageSurface, ResizeObserver, StaticSurface, TextSelection};
pub use palette::{HighlightColor, PALETTE};
pub use repository::{HighlightRepository, RepositoryError, RepositoryResult};
pub use storage::{FileStorage, HighlightStore, MemoryStorage, QueueStore, StorageError, StorageResult};
pub use sync::{RemoteStore, SyncConfig, SyncOutcome, SyncQueue, SyncQueueItem, Synchronizer};
