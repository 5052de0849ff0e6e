//! tenure-core - Session state and lifecycle library
//!
//! This crate provides the building blocks for managing server-side
//! sessions:
//!
//! - **storage**: Keyed session store with locking, metadata, and
//!   one-way immutability
//! - **validator**: Ordered validator chain evaluated at session start
//! - **backend**: Session backend abstraction plus the in-memory native
//!   backend and persistence hooks
//! - **session**: Lifecycle manager, ambient request state, and cookies
//! - **config**: Session and cookie configuration

pub mod backend;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod validator;

// Re-export commonly used types
pub use backend::{NativeBackend, PersistenceHook, SessionBackend, DEFAULT_SESSION_NAME};
pub use config::{CookieConfig, SessionConfig, MAX_LIFETIME_SECS};
pub use error::{Error, Result};
pub use session::{
    AmbientSession, DestroyOptions, LifecycleManager, LifecycleManagerBuilder, SessionCookie,
    SessionGuard, SessionPhase,
};
pub use storage::{SessionData, SessionStore, METADATA_KEY};
pub use validator::{ClosureValidator, SessionValidator, ValidationContext, ValidatorChain};
