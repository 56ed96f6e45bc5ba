//! Remote synchronization: wire contract, durable outbox and push logic.

mod queue;
mod remote;
mod synchronizer;

pub use queue::{DEFAULT_POLL_INTERVAL_SECS, DrainReport, QueueItemId, QueueStatus, SyncAction, SyncConfig, SyncQueue, SyncQueueItem};
pub use remote::{DeletePayload, Position, RemoteAnnotation, RemoteError, RemoteStore, SavePayload, WireRect};
pub use synchronizer::{SyncOutcome, Synchronizer};
