//! Session lifecycle management.
//!
//! Coordinates the store, backend, validator chain, and ambient request
//! state through the session phases.
//!
//! ## Phases
//!
//! ```text
//! Session Start
//!   │
//!   ├─► Merge backend data over ambient data
//!   │
//!   ├─► Propagate the id and queue the session cookie
//!   │
//!   └─► Run the validator chain
//!
//! During Session (Active)
//!   │
//!   ├─► Read and write storage
//!   │
//!   └─► regenerate_id / remember_me / forget_me
//!
//! Session End
//!   │
//!   ├─► write_close: persist the snapshot, freeze the store (Closed)
//!   │
//!   └─► destroy: drop backend storage, expire the cookie (Inactive)
//! ```

mod ambient;
mod cookie;
mod lifecycle;

pub use ambient::*;
pub use cookie::*;
pub use lifecycle::*;
