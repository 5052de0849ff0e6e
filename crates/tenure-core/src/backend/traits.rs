//! Backend traits defining the interface to the native session facility.

use crate::error::Result;
use crate::storage::SessionData;

/// Core trait for the native session facility.
///
/// Implementations own session identity and the persisted copy of the
/// session data; the lifecycle manager drives them and never touches
/// durable storage itself.
pub trait SessionBackend: Send + Sync {
    /// Whether a session is currently active.
    fn exists(&self) -> bool;

    /// Start a session and return the data loaded for it.
    ///
    /// Starting an already-active session returns its current data.
    fn start(&mut self) -> Result<SessionData>;

    /// Destroy the active session and its persisted data.
    fn destroy(&mut self) -> Result<()>;

    /// Replace the session id with a fresh one, optionally deleting the
    /// old session's persisted data.
    fn regenerate_id(&mut self, delete_old: bool) -> Result<()>;

    /// Current session id (empty until assigned).
    fn id(&self) -> &str;

    /// Assign the session id. Only meaningful before `start`.
    fn set_id(&mut self, id: &str) -> Result<()>;

    /// Current session name.
    fn name(&self) -> &str;

    /// Assign the session name. Only meaningful before `start`.
    fn set_name(&mut self, name: &str) -> Result<()>;

    /// Persist a snapshot, close the session, and return the persisted
    /// mapping so the caller can reflect backend-side normalization.
    fn write_and_close(&mut self, snapshot: SessionData) -> Result<SessionData>;

    /// Register the save handler used for durable reads/writes.
    fn register_persistence_hook(&mut self, hook: Box<dyn PersistenceHook>) -> Result<()>;
}

/// Save handler trait for durable session storage.
///
/// Called by the backend, never by the lifecycle manager directly.
/// Payloads are opaque bytes; the native backend uses JSON-serialized
/// snapshots.
pub trait PersistenceHook: Send + Sync {
    /// Open the handler for a session name.
    fn open(&mut self, name: &str) -> Result<()>;

    /// Close the handler.
    fn close(&mut self) -> Result<()>;

    /// Read the bytes persisted for an id; empty for an unknown id.
    fn read(&mut self, id: &str) -> Result<Vec<u8>>;

    /// Write the bytes for an id.
    fn write(&mut self, id: &str, bytes: &[u8]) -> Result<()>;

    /// Delete the bytes persisted for an id.
    fn destroy(&mut self, id: &str) -> Result<()>;

    /// Delete sessions idle longer than `max_lifetime_secs`; returns how
    /// many were removed.
    fn garbage_collect(&mut self, max_lifetime_secs: u64) -> Result<usize>;
}
