//! Session state container with locking and immutability semantics.
//!
//! [`SessionStore`] holds the visible session data plus a segregated
//! metadata namespace that never appears in plain exports:
//! - `request_access_time`: seconds since epoch, captured at construction
//!   and preserved across every bulk replace
//! - `readonly`: global lock flag covering every key
//! - `locks`: explicit per-key lock set
//! - `valid`: record of validator ids registered against this session
//!
//! Once [`SessionStore::mark_immutable`] has been called, no mutation of
//! data or metadata succeeds through any path.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Reserved top-level key carrying the metadata namespace in exports.
///
/// Application keys must never collide with it; `set` rejects it and
/// `from_array` splits it back out of an imported mapping.
pub const METADATA_KEY: &str = "__session_meta__";

/// Metadata entry: request access time, seconds since epoch.
pub const META_REQUEST_ACCESS_TIME: &str = "request_access_time";
/// Metadata entry: global read-only flag.
pub const META_READONLY: &str = "readonly";
/// Metadata entry: explicit per-key lock set.
pub const META_LOCKS: &str = "locks";
/// Metadata entry: validator registration record.
pub const META_VALID: &str = "valid";

/// Plain export shape shared with the backend collaborators.
pub type SessionData = HashMap<String, Value>;

/// Keyed session container with per-key locks, a global read-only flag,
/// a reserved metadata namespace, and one-way immutability.
#[derive(Debug, Clone)]
pub struct SessionStore {
    data: SessionData,
    metadata: HashMap<String, Value>,
    immutable: bool,
}

impl SessionStore {
    /// Create an empty store stamped with the current access time.
    pub fn new() -> Self {
        let mut store = Self {
            data: HashMap::new(),
            metadata: HashMap::new(),
            immutable: false,
        };
        store
            .metadata
            .insert(META_REQUEST_ACCESS_TIME.to_string(), Value::from(epoch_now()));
        store
    }

    /// Create a store seeded from an initial mapping.
    ///
    /// The mapping goes through the same reserved-key split as
    /// [`SessionStore::from_array`].
    pub fn from_data(map: SessionData) -> Self {
        let mut store = Self::new();
        store.replace_data(map);
        store
    }

    // ─────────────────────────────────────────────────────────────────
    // Data access
    // ─────────────────────────────────────────────────────────────────

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Check if a key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Iterate over the visible keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(|s| s.as_str())
    }

    /// Number of visible entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if no visible entries exist.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Insert or overwrite a value.
    ///
    /// Fails with `InvalidState` when the store is immutable, the key is
    /// locked, or the key is the reserved metadata key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if self.immutable {
            return Err(Error::invalid_state(format!(
                "cannot set key \"{key}\": store is immutable"
            )));
        }
        if key == METADATA_KEY {
            return Err(Error::invalid_state(format!(
                "key \"{key}\" is reserved for session metadata"
            )));
        }
        if self.is_locked(Some(&key)) {
            return Err(Error::invalid_state(format!("key \"{key}\" is locked")));
        }
        self.data.insert(key, value.into());
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Locking
    // ─────────────────────────────────────────────────────────────────

    /// Lock the whole store (no key) or a single existing key.
    ///
    /// Locking a key that is not present in the data is a no-op.
    pub fn lock(&mut self, key: Option<&str>) -> Result<()> {
        if self.immutable {
            return Err(Error::invalid_state("cannot lock an immutable store"));
        }
        match key {
            None => {
                self.metadata
                    .insert(META_READONLY.to_string(), Value::Bool(true));
            }
            Some(key) if self.data.contains_key(key) => {
                let mut locks = self.explicit_locks().cloned().unwrap_or_default();
                locks.insert(key.to_string(), Value::Bool(true));
                self.metadata
                    .insert(META_LOCKS.to_string(), Value::Object(locks));
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Report whether the store (no key) or a single key is locked.
    ///
    /// Immutability trumps everything. An empty explicit lock set behaves
    /// as absent.
    pub fn is_locked(&self, key: Option<&str>) -> bool {
        if self.immutable {
            return true;
        }
        let Some(key) = key else {
            return self.readonly_flag();
        };
        match self.explicit_locks() {
            // A populated explicit set narrows a global lock down to an
            // allow-list of exactly its own keys; without the global flag
            // it is a plain per-key lock list. Membership decides either
            // way.
            Some(locks) if !locks.is_empty() => locks.contains_key(key),
            _ => self.readonly_flag(),
        }
    }

    /// Unlock everything (no key) or a single key.
    ///
    /// A keyed unlock while the bare global flag is set pins every other
    /// existing key into the explicit lock set before removing the
    /// requested one.
    pub fn unlock(&mut self, key: Option<&str>) -> Result<()> {
        if self.immutable {
            return Err(Error::invalid_state("cannot unlock an immutable store"));
        }
        let Some(key) = key else {
            self.metadata
                .insert(META_READONLY.to_string(), Value::Bool(false));
            self.metadata.remove(META_LOCKS);
            return Ok(());
        };
        let no_explicit_locks = self
            .explicit_locks()
            .map_or(true, |locks| locks.is_empty());
        if no_explicit_locks {
            if !self.readonly_flag() {
                return Ok(());
            }
            let mut locks = Map::new();
            for existing in self.data.keys() {
                locks.insert(existing.clone(), Value::Bool(true));
            }
            locks.remove(key);
            self.metadata
                .insert(META_LOCKS.to_string(), Value::Object(locks));
            return Ok(());
        }
        let mut locks = self.explicit_locks().cloned().unwrap_or_default();
        locks.remove(key);
        self.metadata
            .insert(META_LOCKS.to_string(), Value::Object(locks));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Immutability
    // ─────────────────────────────────────────────────────────────────

    /// Mark the store immutable. One-way; there is no unmark.
    pub fn mark_immutable(&mut self) {
        self.immutable = true;
    }

    /// Read the immutability flag.
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    // ─────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────

    /// Write a metadata entry.
    ///
    /// `Value::Null` deletes an existing entry. A structured value merges
    /// recursively into an existing entry (objects merge per key with
    /// incoming scalars winning, arrays concatenate) unless `overwrite`
    /// is true, which replaces the entry wholesale.
    pub fn set_metadata(
        &mut self,
        name: impl Into<String>,
        value: Value,
        overwrite: bool,
    ) -> Result<()> {
        let name = name.into();
        if self.immutable {
            return Err(Error::invalid_state(format!(
                "cannot write metadata \"{name}\": store is immutable"
            )));
        }
        if overwrite {
            self.metadata.insert(name, value);
            return Ok(());
        }
        if value.is_null() {
            self.metadata.remove(&name);
            return Ok(());
        }
        let merged = match self.metadata.remove(&name) {
            Some(existing) => merge_value(existing, value),
            None => value,
        };
        self.metadata.insert(name, merged);
        Ok(())
    }

    /// Read a metadata entry. `None` marks an absent entry.
    pub fn get_metadata(&self, name: &str) -> Option<&Value> {
        self.metadata.get(name)
    }

    /// The whole metadata namespace.
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Request access time in seconds since epoch, 0.0 if missing.
    pub fn request_access_time(&self) -> f64 {
        self.metadata
            .get(META_REQUEST_ACCESS_TIME)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// True if the validator id is already in the registration record.
    pub fn has_validator(&self, id: &str) -> bool {
        matches!(
            self.metadata.get(META_VALID),
            Some(Value::Object(valid)) if valid.contains_key(id)
        )
    }

    /// Record a validator id in the registration record.
    pub fn record_validator(&mut self, id: &str) -> Result<()> {
        if self.immutable {
            return Err(Error::invalid_state(format!(
                "cannot record validator \"{id}\": store is immutable"
            )));
        }
        let mut valid = match self.metadata.get(META_VALID) {
            Some(Value::Object(valid)) => valid.clone(),
            _ => Map::new(),
        };
        valid.insert(id.to_string(), Value::Bool(true));
        self.metadata
            .insert(META_VALID.to_string(), Value::Object(valid));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Bulk operations
    // ─────────────────────────────────────────────────────────────────

    /// Remove everything (no key) or a single key.
    ///
    /// The whole-store variant empties the data and preserves the
    /// metadata namespace. The keyed variant also drops the key's
    /// metadata entry and its lock; absent keys are a no-op.
    pub fn clear(&mut self, key: Option<&str>) -> Result<()> {
        if self.immutable {
            return Err(Error::invalid_state("cannot clear an immutable store"));
        }
        let Some(key) = key else {
            self.data.clear();
            return Ok(());
        };
        if !self.data.contains_key(key) {
            return Ok(());
        }
        self.metadata.remove(key);
        self.unlock(Some(key))?;
        self.data.remove(key);
        Ok(())
    }

    /// Replace the data wholesale.
    ///
    /// The only wholesale-replace path. A reserved metadata key inside
    /// `map` becomes the new metadata namespace; the access time captured
    /// before the replace is restored afterwards, so it survives
    /// regardless of what `map` contains.
    pub fn from_array(&mut self, map: SessionData) -> Result<()> {
        if self.immutable {
            return Err(Error::invalid_state(
                "cannot replace an immutable store",
            ));
        }
        self.replace_data(map);
        Ok(())
    }

    /// Export a copy of the data, optionally carrying the metadata
    /// namespace under the reserved key.
    pub fn to_array(&self, include_metadata: bool) -> SessionData {
        let mut map = self.data.clone();
        if include_metadata {
            let meta: Map<String, Value> = self
                .metadata
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            map.insert(METADATA_KEY.to_string(), Value::Object(meta));
        }
        map
    }

    // ─────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────

    fn replace_data(&mut self, mut map: SessionData) {
        let access_time = self.request_access_time();
        self.metadata = match map.remove(METADATA_KEY) {
            Some(Value::Object(meta)) => meta.into_iter().collect(),
            _ => HashMap::new(),
        };
        self.data = map;
        self.metadata
            .insert(META_REQUEST_ACCESS_TIME.to_string(), Value::from(access_time));
    }

    fn readonly_flag(&self) -> bool {
        matches!(self.metadata.get(META_READONLY), Some(Value::Bool(true)))
    }

    fn explicit_locks(&self) -> Option<&Map<String, Value>> {
        match self.metadata.get(META_LOCKS) {
            Some(Value::Object(locks)) => Some(locks),
            _ => None,
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `incoming` into `existing`: objects merge per key recursively,
/// arrays concatenate, anything else is replaced by `incoming`.
fn merge_value(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Object(mut base), Value::Object(update)) => {
            for (key, value) in update {
                let merged = match base.remove(&key) {
                    Some(current) => merge_value(current, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (Value::Array(mut base), Value::Array(update)) => {
            base.extend(update);
            Value::Array(base)
        }
        (_, incoming) => incoming,
    }
}

fn epoch_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get() {
        let mut store = SessionStore::new();
        store.set("user_id", 42).unwrap();
        assert_eq!(store.get("user_id"), Some(&json!(42)));
        assert!(store.contains_key("user_id"));
        assert!(!store.contains_key("missing"));
    }

    #[test]
    fn test_access_time_stamped_at_construction() {
        let store = SessionStore::new();
        let now = epoch_now();
        assert!(store.request_access_time() > 0.0);
        assert!(now - store.request_access_time() < 5.0); // Freshly stamped
    }

    #[test]
    fn test_set_rejects_locked_key() {
        let mut store = SessionStore::new();
        store.set("user_id", 42).unwrap();
        store.lock(Some("user_id")).unwrap();
        let err = store.set("user_id", 99).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(store.get("user_id"), Some(&json!(42))); // Prior value intact
    }

    #[test]
    fn test_set_rejects_reserved_key() {
        let mut store = SessionStore::new();
        assert!(store.set(METADATA_KEY, json!({})).is_err());
        assert!(!store.contains_key(METADATA_KEY));
    }

    #[test]
    fn test_immutable_is_permanent() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        store.mark_immutable();
        assert!(store.is_immutable());
        assert!(matches!(store.set("a", 2), Err(Error::InvalidState(_))));
        assert!(matches!(
            store.set_metadata("m", json!(1), false),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(store.clear(None), Err(Error::InvalidState(_))));
        assert!(matches!(store.lock(None), Err(Error::InvalidState(_))));
        assert!(matches!(store.unlock(None), Err(Error::InvalidState(_))));
        assert!(matches!(
            store.from_array(SessionData::new()),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(store.get("a"), Some(&json!(1)));
        assert!(store.is_locked(Some("a"))); // Immutability implies locked
        assert!(store.is_locked(None));
    }

    #[test]
    fn test_global_lock_covers_every_key() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        store.lock(None).unwrap();
        assert!(store.is_locked(None));
        assert!(store.is_locked(Some("a")));
        assert!(store.is_locked(Some("b")));
        assert!(store.is_locked(Some("never_set"))); // No explicit set, flag wins
    }

    #[test]
    fn test_explicit_set_narrows_global_lock() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        store.lock(None).unwrap();
        store.lock(Some("a")).unwrap();
        // With both the flag and an explicit set, only listed keys count.
        assert!(store.is_locked(Some("a")));
        assert!(!store.is_locked(Some("b")));
    }

    #[test]
    fn test_unlock_all_clears_flag_and_set() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        store.lock(None).unwrap();
        store.lock(Some("a")).unwrap();
        store.unlock(None).unwrap();
        assert!(!store.is_locked(None));
        assert!(!store.is_locked(Some("a")));
    }

    #[test]
    fn test_keyed_unlock_materializes_deny_list() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        store.set("c", 3).unwrap();
        store.lock(None).unwrap();
        store.unlock(Some("b")).unwrap();
        assert!(!store.is_locked(Some("b")));
        assert!(store.is_locked(Some("a")));
        assert!(store.is_locked(Some("c")));
        // Keys created afterwards are outside the materialized set.
        store.set("d", 4).unwrap();
        assert!(!store.is_locked(Some("d")));
    }

    #[test]
    fn test_keyed_unlock_without_any_lock_is_noop() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        store.unlock(Some("a")).unwrap();
        assert!(!store.is_locked(Some("a")));
        assert!(store.get_metadata(META_LOCKS).is_none()); // Nothing materialized
    }

    #[test]
    fn test_lock_ignores_missing_keys() {
        let mut store = SessionStore::new();
        store.lock(Some("ghost")).unwrap();
        assert!(!store.is_locked(Some("ghost")));
    }

    #[test]
    fn test_metadata_merges_recursively() {
        let mut store = SessionStore::new();
        store.set_metadata("x", json!({"a": 1}), false).unwrap();
        store.set_metadata("x", json!({"b": 2}), false).unwrap();
        assert_eq!(store.get_metadata("x"), Some(&json!({"a": 1, "b": 2})));

        store
            .set_metadata("x", json!({"nested": {"one": 1}}), false)
            .unwrap();
        store
            .set_metadata("x", json!({"nested": {"two": 2}}), false)
            .unwrap();
        assert_eq!(
            store.get_metadata("x"),
            Some(&json!({"a": 1, "b": 2, "nested": {"one": 1, "two": 2}}))
        );
    }

    #[test]
    fn test_metadata_overwrite_replaces() {
        let mut store = SessionStore::new();
        store.set_metadata("x", json!({"a": 1}), false).unwrap();
        store.set_metadata("x", json!({"b": 2}), true).unwrap();
        assert_eq!(store.get_metadata("x"), Some(&json!({"b": 2})));
    }

    #[test]
    fn test_metadata_null_deletes() {
        let mut store = SessionStore::new();
        store.set_metadata("x", json!("value"), false).unwrap();
        store.set_metadata("x", Value::Null, false).unwrap();
        assert!(store.get_metadata("x").is_none());
    }

    #[test]
    fn test_metadata_arrays_concatenate() {
        let mut store = SessionStore::new();
        store.set_metadata("tags", json!([1, 2]), false).unwrap();
        store.set_metadata("tags", json!([3]), false).unwrap();
        assert_eq!(store.get_metadata("tags"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_to_array_strips_reserved_namespace() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        let plain = store.to_array(false);
        assert!(!plain.contains_key(METADATA_KEY));
        assert_eq!(plain.get("a"), Some(&json!(1)));

        let full = store.to_array(true);
        let meta = full.get(METADATA_KEY).unwrap();
        assert!(meta.get(META_REQUEST_ACCESS_TIME).is_some());
    }

    #[test]
    fn test_from_array_preserves_access_time() {
        let mut store = SessionStore::new();
        let before = store.request_access_time();
        let mut map = SessionData::new();
        map.insert("fresh".to_string(), json!(true));
        store.from_array(map).unwrap();
        assert_eq!(store.request_access_time(), before);
        assert_eq!(store.get("fresh"), Some(&json!(true)));
        assert_eq!(store.len(), 1); // Wholesale replace
    }

    #[test]
    fn test_from_array_splits_reserved_key() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        store.lock(Some("a")).unwrap();
        let exported = store.to_array(true);

        let mut restored = SessionStore::new();
        restored.from_array(exported).unwrap();
        assert!(!restored.contains_key(METADATA_KEY));
        assert_eq!(restored.get("a"), Some(&json!(1)));
        assert!(restored.is_locked(Some("a"))); // Lock state round-tripped
    }

    #[test]
    fn test_clear_all_preserves_metadata() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        store.record_validator("validator.example").unwrap();
        let before = store.request_access_time();
        store.clear(None).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.request_access_time(), before);
        assert!(store.has_validator("validator.example"));
    }

    #[test]
    fn test_clear_key_drops_metadata_and_lock() {
        let mut store = SessionStore::new();
        store.set("a", 1).unwrap();
        store.set_metadata("a", json!("about a"), false).unwrap();
        store.lock(Some("a")).unwrap();
        store.clear(Some("a")).unwrap();
        assert!(!store.contains_key("a"));
        assert!(store.get_metadata("a").is_none());
        assert!(!store.is_locked(Some("a")));
        store.clear(Some("a")).unwrap(); // Absent key is a no-op
    }

    #[test]
    fn test_validator_record_roundtrip() {
        let mut store = SessionStore::new();
        assert!(!store.has_validator("validator.example"));
        store.record_validator("validator.example").unwrap();
        assert!(store.has_validator("validator.example"));
    }

    #[test]
    fn test_end_to_end_lock_cycle() {
        let mut store = SessionStore::new();
        assert!(store.is_empty());
        store.set("user_id", 42).unwrap();
        store.lock(Some("user_id")).unwrap();
        assert!(matches!(
            store.set("user_id", 99),
            Err(Error::InvalidState(_))
        ));
        assert!(!store.is_locked(Some("other_key")));
        store.unlock(Some("user_id")).unwrap();
        store.set("user_id", 99).unwrap();
        assert_eq!(store.get("user_id"), Some(&json!(99)));
    }
}
