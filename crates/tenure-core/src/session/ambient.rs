//! Ambient per-request session state.
//!
//! Collects the pieces of state that live outside both the store and the
//! backend: the externally visible session id, raw data handed in by the
//! embedding application (for example a decoded request payload), whether
//! response output has already been committed, and the queue of cookies
//! awaiting delivery.

use serde_json::Value;

use super::cookie::SessionCookie;

/// Per-request session state shared with the embedding application.
#[derive(Debug, Default)]
pub struct AmbientSession {
    id: String,
    data: Option<Value>,
    output_committed: bool,
    cookies: Vec<SessionCookie>,
}

impl AmbientSession {
    /// Create an empty ambient state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The externally visible session id, empty when none is known.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether a session id is currently known.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// Record the session id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Forget the session id.
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    /// Provide raw session data ahead of start, e.g. from a request payload.
    pub fn set_data(&mut self, data: Value) {
        self.data = Some(data);
    }

    /// Take the raw session data, leaving none behind.
    pub fn take_data(&mut self) -> Option<Value> {
        self.data.take()
    }

    /// Record that response output has been committed.
    pub fn mark_output_committed(&mut self) {
        self.output_committed = true;
    }

    /// Whether response output has been committed.
    pub fn output_committed(&self) -> bool {
        self.output_committed
    }

    /// Queue a cookie for delivery.
    pub fn queue_cookie(&mut self, cookie: SessionCookie) {
        self.cookies.push(cookie);
    }

    /// Drain all queued cookies in queue order.
    pub fn drain_cookies(&mut self) -> Vec<SessionCookie> {
        std::mem::take(&mut self.cookies)
    }
}
