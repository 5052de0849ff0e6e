//! Native session backend.
//!
//! [`NativeBackend`] is the in-memory default implementation of
//! [`SessionBackend`]: it owns session identity, keeps a saved-session
//! map keyed by id so write/start round-trips work with no persistence
//! hook at all, and delegates durable reads/writes to a registered
//! [`PersistenceHook`] using JSON-serialized snapshots.

mod traits;

pub use traits::{PersistenceHook, SessionBackend};

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::SessionData;

/// Session name used until a host assigns one.
pub const DEFAULT_SESSION_NAME: &str = "sid";

/// In-memory session backend with optional persistence delegation.
pub struct NativeBackend {
    id: String,
    name: String,
    active: bool,
    hook: Option<Box<dyn PersistenceHook>>,
    saved: HashMap<String, SessionData>,
}

impl NativeBackend {
    /// Create an inactive backend with no id assigned yet.
    pub fn new() -> Self {
        Self {
            id: String::new(),
            name: DEFAULT_SESSION_NAME.to_string(),
            active: false,
            hook: None,
            saved: HashMap::new(),
        }
    }

    fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Load the persisted data for an id, from the hook when one is
    /// registered, otherwise from the in-memory saved map.
    fn load(&mut self, id: &str) -> Result<SessionData> {
        if let Some(hook) = self.hook.as_mut() {
            let bytes = hook.read(id)?;
            if bytes.is_empty() {
                return Ok(SessionData::new());
            }
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            Ok(self.saved.get(id).cloned().unwrap_or_default())
        }
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBackend for NativeBackend {
    fn exists(&self) -> bool {
        self.active
    }

    fn start(&mut self) -> Result<SessionData> {
        if self.active {
            let id = self.id.clone();
            return self.load(&id);
        }
        if self.id.is_empty() {
            self.id = Self::generate_id();
        }
        if let Some(hook) = self.hook.as_mut() {
            hook.open(&self.name)?;
        }
        let id = self.id.clone();
        let data = self.load(&id)?;
        self.active = true;
        debug!("Started session backend: {}", self.id);
        Ok(data)
    }

    fn destroy(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        self.saved.remove(&self.id);
        let id = self.id.clone();
        if let Some(hook) = self.hook.as_mut() {
            hook.destroy(&id)?;
            hook.close()?;
        }
        debug!("Destroyed session backend: {}", id);
        Ok(())
    }

    fn regenerate_id(&mut self, delete_old: bool) -> Result<()> {
        let old = std::mem::replace(&mut self.id, Self::generate_id());
        if delete_old && !old.is_empty() {
            self.saved.remove(&old);
            if let Some(hook) = self.hook.as_mut() {
                hook.destroy(&old)?;
            }
        }
        debug!("Regenerated session id: {} -> {}", old, self.id);
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: &str) -> Result<()> {
        self.id = id.to_string();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) -> Result<()> {
        self.name = name.to_string();
        Ok(())
    }

    fn write_and_close(&mut self, snapshot: SessionData) -> Result<SessionData> {
        let id = self.id.clone();
        if let Some(hook) = self.hook.as_mut() {
            let bytes = serde_json::to_vec(&snapshot)?;
            hook.write(&id, &bytes)?;
            hook.close()?;
        } else {
            self.saved.insert(id.clone(), snapshot.clone());
        }
        self.active = false;
        debug!("Wrote and closed session: {} ({} entries)", id, snapshot.len());
        Ok(snapshot)
    }

    fn register_persistence_hook(&mut self, hook: Box<dyn PersistenceHook>) -> Result<()> {
        self.hook = Some(hook);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct SharedHook {
        records: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl PersistenceHook for SharedHook {
        fn open(&mut self, _name: &str) -> Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read(&mut self, id: &str) -> Result<Vec<u8>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .unwrap_or_default())
        }

        fn write(&mut self, id: &str, bytes: &[u8]) -> Result<()> {
            self.records
                .lock()
                .unwrap()
                .insert(id.to_string(), bytes.to_vec());
            Ok(())
        }

        fn destroy(&mut self, id: &str) -> Result<()> {
            self.records.lock().unwrap().remove(id);
            Ok(())
        }

        fn garbage_collect(&mut self, _max_lifetime_secs: u64) -> Result<usize> {
            Ok(0)
        }
    }

    /// Hook tracking idle time per session id.
    #[derive(Default)]
    struct AgingHook {
        idle_secs: HashMap<String, u64>,
    }

    impl PersistenceHook for AgingHook {
        fn open(&mut self, _name: &str) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn read(&mut self, id: &str) -> Result<Vec<u8>> {
            if self.idle_secs.contains_key(id) {
                Ok(b"{}".to_vec())
            } else {
                Ok(Vec::new())
            }
        }

        fn write(&mut self, id: &str, _bytes: &[u8]) -> Result<()> {
            self.idle_secs.insert(id.to_string(), 0);
            Ok(())
        }

        fn destroy(&mut self, id: &str) -> Result<()> {
            self.idle_secs.remove(id);
            Ok(())
        }

        fn garbage_collect(&mut self, max_lifetime_secs: u64) -> Result<usize> {
            let before = self.idle_secs.len();
            self.idle_secs.retain(|_, idle| *idle <= max_lifetime_secs);
            Ok(before - self.idle_secs.len())
        }
    }

    #[test]
    fn test_start_assigns_id_and_activates() {
        let mut backend = NativeBackend::new();
        assert!(!backend.exists());
        assert!(backend.id().is_empty());
        let data = backend.start().unwrap();
        assert!(backend.exists());
        assert_eq!(backend.id().len(), 32); // uuid v4 simple form
        assert!(data.is_empty());
    }

    #[test]
    fn test_write_close_roundtrip_without_hook() {
        let mut backend = NativeBackend::new();
        backend.start().unwrap();
        let mut snapshot = SessionData::new();
        snapshot.insert("user".to_string(), json!("alice"));
        let returned = backend.write_and_close(snapshot).unwrap();
        assert_eq!(returned.get("user"), Some(&json!("alice")));
        assert!(!backend.exists());

        let data = backend.start().unwrap();
        assert_eq!(data.get("user"), Some(&json!("alice"))); // Same id resumes
    }

    #[test]
    fn test_destroy_drops_saved_data() {
        let mut backend = NativeBackend::new();
        backend.start().unwrap();
        let mut snapshot = SessionData::new();
        snapshot.insert("user".to_string(), json!("alice"));
        backend.write_and_close(snapshot).unwrap();
        backend.start().unwrap();
        backend.destroy().unwrap();
        assert!(!backend.exists());
        let data = backend.start().unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_regenerate_id_deletes_old_session() {
        let mut backend = NativeBackend::new();
        backend.start().unwrap();
        let old = backend.id().to_string();
        let mut snapshot = SessionData::new();
        snapshot.insert("k".to_string(), json!(1));
        backend.write_and_close(snapshot).unwrap();

        backend.regenerate_id(true).unwrap();
        assert_ne!(backend.id(), old);
        let data = backend.start().unwrap();
        assert!(data.is_empty()); // Old session gone, new id starts fresh
    }

    #[test]
    fn test_set_id_and_name() {
        let mut backend = NativeBackend::new();
        backend.set_id("fixed0123").unwrap();
        backend.set_name("app").unwrap();
        backend.start().unwrap();
        assert_eq!(backend.id(), "fixed0123");
        assert_eq!(backend.name(), "app");
    }

    #[test]
    fn test_hook_roundtrip() {
        let hook = SharedHook::default();
        let records = Arc::clone(&hook.records);
        let opens = Arc::clone(&hook.opens);
        let closes = Arc::clone(&hook.closes);

        let mut backend = NativeBackend::new();
        backend.register_persistence_hook(Box::new(hook)).unwrap();
        backend.start().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        let id = backend.id().to_string();
        let mut snapshot = SessionData::new();
        snapshot.insert("count".to_string(), json!(7));
        backend.write_and_close(snapshot).unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(records.lock().unwrap().contains_key(&id));

        let data = backend.start().unwrap();
        assert_eq!(data.get("count"), Some(&json!(7))); // Read back through the hook
    }

    #[test]
    fn test_hook_garbage_collect_removes_stale_sessions() {
        let mut hook = AgingHook::default();
        hook.idle_secs.insert("fresh".to_string(), 60);
        hook.idle_secs.insert("idle".to_string(), 2_000);
        hook.idle_secs.insert("stale".to_string(), 90_000);

        let max_lifetime = SessionConfig::default().gc_max_lifetime;
        let removed = hook.garbage_collect(max_lifetime).unwrap();
        assert_eq!(removed, 2); // The 1440s cutoff keeps only the fresh session
        assert!(!hook.read("fresh").unwrap().is_empty());
        assert!(hook.read("idle").unwrap().is_empty());
        assert!(hook.read("stale").unwrap().is_empty());

        assert_eq!(hook.garbage_collect(max_lifetime).unwrap(), 0); // Nothing left to sweep
    }
}
