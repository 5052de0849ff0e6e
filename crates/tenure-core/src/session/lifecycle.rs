//! Session lifecycle manager.
//!
//! [`LifecycleManager`] drives a session through its phases:
//! - `start`: open the backend, merge ambient data, validate
//! - `write_close`: persist a snapshot and freeze the store
//! - `destroy`: drop backend storage and expire the client cookie
//!
//! Identity changes (`set_name`, `set_id`) are only legal before a
//! session exists; `regenerate_id` and `remember_me` operate on a live
//! session.

use std::ops::{Deref, DerefMut};

use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{NativeBackend, PersistenceHook, SessionBackend};
use crate::config::{MAX_LIFETIME_SECS, SessionConfig};
use crate::error::{Error, Result};
use crate::storage::{SessionData, SessionStore};
use crate::validator::{SessionValidator, ValidationContext, ValidatorChain};

use super::ambient::AmbientSession;
use super::cookie::SessionCookie;

/// Phase of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session has been started.
    #[default]
    Inactive,
    /// A session is open for reading and writing.
    Active,
    /// The session has been written and the store frozen.
    Closed,
}

impl SessionPhase {
    /// Phase name for logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// Options controlling [`LifecycleManager::destroy`].
#[derive(Debug, Clone, Copy)]
pub struct DestroyOptions {
    /// Queue an expired cookie so the client forgets the session.
    pub send_expire_cookie: bool,
    /// Also empty the local store.
    pub clear_storage: bool,
}

impl Default for DestroyOptions {
    fn default() -> Self {
        Self {
            send_expire_cookie: true,
            clear_storage: false,
        }
    }
}

/// Coordinates the store, backend, validators, and ambient state for one
/// session.
pub struct LifecycleManager {
    config: SessionConfig,
    backend: Box<dyn SessionBackend>,
    store: SessionStore,
    ambient: AmbientSession,
    validators: ValidatorChain,
    pending_hook: Option<Box<dyn PersistenceHook>>,
    phase: SessionPhase,
}

impl LifecycleManager {
    /// Create a manager with default configuration and the native
    /// backend.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            backend: Box::new(NativeBackend::new()),
            store: SessionStore::new(),
            ambient: AmbientSession::new(),
            validators: ValidatorChain::new(),
            pending_hook: None,
            phase: SessionPhase::Inactive,
        }
    }

    /// Start building a customized manager.
    pub fn builder() -> LifecycleManagerBuilder {
        LifecycleManagerBuilder::default()
    }

    // ─────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────

    /// Whether a session currently exists.
    ///
    /// True once the backend reports an open session, an id has been
    /// announced to the client, or response output has been committed.
    pub fn session_exists(&self) -> bool {
        self.backend.exists() || self.ambient.has_id() || self.ambient.output_committed()
    }

    /// Start the session. A no-op when one already exists.
    ///
    /// 1. Registers any pending persistence hook with the backend
    /// 2. Opens the backend and loads its data
    /// 3. Merges backend data over ambient data (backend wins) and
    ///    replaces the store, unless `preserve_storage` is set
    /// 4. Propagates the id and queues the session cookie
    /// 5. Reconciles and runs the validator chain
    ///
    /// A validation failure is reported after the backend has opened;
    /// the session stays active so the caller can destroy it.
    pub fn start(&mut self, preserve_storage: bool) -> Result<()> {
        if self.session_exists() {
            debug!(
                "Session already started: {} ({})",
                self.backend.id(),
                self.phase.as_str()
            );
            return Ok(());
        }

        if let Some(hook) = self.pending_hook.take() {
            self.backend.register_persistence_hook(hook)?;
        }

        let backend_data = self.backend.start()?;
        self.phase = SessionPhase::Active;

        if !preserve_storage {
            let mut merged: SessionData = match self.ambient.take_data() {
                Some(Value::Object(map)) => map.into_iter().collect(),
                _ => SessionData::new(),
            };
            merged.extend(backend_data);
            debug!("Merged session data: {} entries", merged.len());
            self.store.from_array(merged)?;
        }

        let id = self.backend.id().to_string();
        self.ambient.set_id(id.clone());
        if self.config.use_cookies {
            self.ambient.queue_cookie(SessionCookie::for_session(
                &self.config.cookie,
                self.backend.name(),
                self.backend.id(),
            ));
        }

        self.validators.reconcile(&mut self.store)?;
        let context = ValidationContext::new(&self.store, self.backend.id(), self.backend.name());
        if !self.validators.run(&context) {
            return Err(Error::validation_failed(
                "session rejected by validator chain",
            ));
        }

        debug!("Session started: {}", id);
        Ok(())
    }

    /// Persist a snapshot and freeze the store. Idempotent.
    ///
    /// The store is refreshed from what the backend actually persisted,
    /// then marked immutable; the session can no longer be written.
    pub fn write_close(&mut self) -> Result<()> {
        if self.phase != SessionPhase::Active || self.store.is_immutable() {
            return Ok(());
        }
        let snapshot = self.store.to_array(true);
        let persisted = self.backend.write_and_close(snapshot)?;
        self.store.from_array(persisted)?;
        self.store.mark_immutable();
        self.phase = SessionPhase::Closed;
        debug!("Session closed: {}", self.backend.id());
        Ok(())
    }

    /// Destroy the session. A no-op when none exists.
    ///
    /// Drops backend storage, forgets the announced id, and by default
    /// queues an expired cookie. `clear_storage` additionally empties
    /// the local store.
    pub fn destroy(&mut self, options: DestroyOptions) -> Result<()> {
        if !self.session_exists() {
            return Ok(());
        }
        self.backend.destroy()?;
        self.ambient.clear_id();
        self.phase = SessionPhase::Inactive;
        if options.send_expire_cookie && self.config.use_cookies {
            let cookie = SessionCookie::expired(&self.config.cookie, self.backend.name());
            self.ambient.queue_cookie(cookie);
        }
        if options.clear_storage {
            self.store.clear(None)?;
        }
        debug!("Session destroyed");
        Ok(())
    }

    /// Start the session and return a guard that closes it on drop.
    pub fn start_scoped(&mut self, preserve_storage: bool) -> Result<SessionGuard<'_>> {
        self.start(preserve_storage)?;
        Ok(SessionGuard { manager: self })
    }

    // ─────────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────────

    /// The session name.
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Set the session name. Only legal before a session exists.
    ///
    /// Names must be non-empty ASCII alphanumeric.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        if self.session_exists() {
            return Err(Error::out_of_sequence(
                "cannot change the session name after the session has started",
            ));
        }
        let name = name.into();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::invalid_name(format!(
                "session name must be non-empty ASCII alphanumeric, got \"{name}\""
            )));
        }
        self.backend.set_name(&name)?;
        Ok(())
    }

    /// The session id, empty before the first start.
    pub fn id(&self) -> &str {
        self.backend.id()
    }

    /// Set the session id. Only legal before a session exists.
    pub fn set_id(&mut self, id: impl Into<String>) -> Result<()> {
        if self.session_exists() {
            return Err(Error::out_of_sequence(
                "cannot change the session id after the session has started",
            ));
        }
        let id = id.into();
        self.backend.set_id(&id)?;
        Ok(())
    }

    /// Rotate the session id. A no-op when no session exists.
    ///
    /// `delete_old` drops the data stored under the previous id. The new
    /// id is propagated and a fresh cookie queued.
    pub fn regenerate_id(&mut self, delete_old: bool) -> Result<()> {
        if !self.session_exists() {
            return Ok(());
        }
        self.backend.regenerate_id(delete_old)?;
        let id = self.backend.id().to_string();
        self.ambient.set_id(id.clone());
        if self.config.use_cookies {
            self.ambient.queue_cookie(SessionCookie::for_session(
                &self.config.cookie,
                self.backend.name(),
                self.backend.id(),
            ));
        }
        debug!("Session id regenerated: {}", id);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Cookies
    // ─────────────────────────────────────────────────────────────────

    /// Extend the session cookie lifetime, by `ttl` seconds or the
    /// configured remember-me duration.
    ///
    /// A live session gets its id regenerated so the refreshed cookie
    /// reaches the client. Durations above [`MAX_LIFETIME_SECS`] are
    /// rejected.
    pub fn remember_me(&mut self, ttl: Option<u64>) -> Result<()> {
        let lifetime = ttl.unwrap_or(self.config.remember_me_seconds);
        self.set_session_cookie_lifetime(lifetime)
    }

    /// Revert to a browser-session cookie.
    pub fn forget_me(&mut self) -> Result<()> {
        self.set_session_cookie_lifetime(0)
    }

    /// Queue an expired cookie without touching the session itself.
    pub fn expire_session_cookie(&mut self) {
        if !self.config.use_cookies {
            return;
        }
        let cookie = SessionCookie::expired(&self.config.cookie, self.backend.name());
        self.ambient.queue_cookie(cookie);
    }

    fn set_session_cookie_lifetime(&mut self, lifetime: u64) -> Result<()> {
        if lifetime > MAX_LIFETIME_SECS {
            return Err(Error::configuration(format!(
                "cookie lifetime must be at most {MAX_LIFETIME_SECS} seconds"
            )));
        }
        self.config.cookie.lifetime = lifetime;
        if self.session_exists() {
            // The client only sees the new lifetime on a fresh cookie.
            self.regenerate_id(true)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────

    /// Attach a validator for future validation runs.
    pub fn attach_validator(&mut self, validator: Box<dyn SessionValidator>) {
        self.validators.attach(validator);
    }

    /// Run the validator chain against the current session.
    pub fn is_valid(&self) -> bool {
        let context = ValidationContext::new(&self.store, self.backend.id(), self.backend.name());
        self.validators.run(&context)
    }

    // ─────────────────────────────────────────────────────────────────
    // Access
    // ─────────────────────────────────────────────────────────────────

    /// The session store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The session store, mutably.
    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    /// The ambient request state.
    pub fn ambient(&self) -> &AmbientSession {
        &self.ambient
    }

    /// The ambient request state, mutably.
    pub fn ambient_mut(&mut self) -> &mut AmbientSession {
        &mut self.ambient
    }

    /// The active configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Defer a persistence hook; it reaches the backend at start.
    pub fn set_persistence_hook(&mut self, hook: impl PersistenceHook + 'static) {
        self.pending_hook = Some(Box::new(hook));
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`LifecycleManager`].
#[derive(Default)]
pub struct LifecycleManagerBuilder {
    config: Option<SessionConfig>,
    backend: Option<Box<dyn SessionBackend>>,
    store: Option<SessionStore>,
    hook: Option<Box<dyn PersistenceHook>>,
    validators: ValidatorChain,
}

impl LifecycleManagerBuilder {
    /// Use this configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this backend instead of the native one.
    pub fn backend(mut self, backend: impl SessionBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Seed the manager with an existing store.
    pub fn store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a persistence hook, handed to the backend at start.
    pub fn persistence_hook(mut self, hook: impl PersistenceHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Attach a validator.
    pub fn validator(mut self, validator: Box<dyn SessionValidator>) -> Self {
        self.validators.attach(validator);
        self
    }

    /// Build the manager, validating the configuration and applying a
    /// configured session name.
    pub fn build(self) -> Result<LifecycleManager> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| Error::configuration(e.to_string()))?;

        let mut manager = LifecycleManager {
            config,
            backend: self
                .backend
                .unwrap_or_else(|| Box::new(NativeBackend::new())),
            store: self.store.unwrap_or_default(),
            ambient: AmbientSession::new(),
            validators: self.validators,
            pending_hook: self.hook,
            phase: SessionPhase::Inactive,
        };
        if let Some(name) = manager.config.name.clone() {
            manager.set_name(name)?;
        }
        Ok(manager)
    }
}

/// Scope guard that writes the session closed when dropped.
///
/// Dereferences to the manager, so session work continues through the
/// guard.
pub struct SessionGuard<'a> {
    manager: &'a mut LifecycleManager,
}

impl Deref for SessionGuard<'_> {
    type Target = LifecycleManager;

    fn deref(&self) -> &Self::Target {
        self.manager
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.manager
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.manager.write_close() {
            warn!("Failed to close session on drop: {}", e);
        }
    }
}
