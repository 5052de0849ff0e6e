//! Session cookie construction.
//!
//! Cookies are queued on the ambient session rather than sent directly;
//! the embedding application drains and delivers them.

use chrono::{DateTime, Duration, Utc};

use crate::config::CookieConfig;

/// Offset into the past applied to expired cookies, in seconds.
const EXPIRED_OFFSET_SECS: i64 = 42_000;

/// A session cookie queued for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCookie {
    /// Cookie name (the session name).
    pub name: String,
    /// Cookie value (the session id, or empty when expiring).
    pub value: String,
    /// Absolute expiry; `None` means a browser-session cookie.
    pub expires: Option<DateTime<Utc>>,
    /// Cookie path.
    pub path: String,
    /// Cookie domain, if restricted.
    pub domain: Option<String>,
    /// Whether the cookie requires HTTPS.
    pub secure: bool,
    /// Whether the cookie is hidden from client-side scripts.
    pub http_only: bool,
}

impl SessionCookie {
    /// Build the cookie announcing the current session id.
    ///
    /// A configured lifetime of 0 produces a browser-session cookie with
    /// no expiry, as does a lifetime too far ahead to represent as an
    /// absolute date.
    pub fn for_session(config: &CookieConfig, name: &str, id: &str) -> Self {
        let expires = if config.lifetime > 0 {
            Self::expiry_after(config.lifetime)
        } else {
            None
        };

        Self {
            name: name.to_string(),
            value: id.to_string(),
            expires,
            path: config.path.clone(),
            domain: config.domain.clone(),
            secure: config.secure,
            http_only: config.http_only,
        }
    }

    /// Build the cookie that clears the session from the client.
    ///
    /// Carries an empty value and an expiry well in the past.
    pub fn expired(config: &CookieConfig, name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: String::new(),
            expires: Some(Utc::now() - Duration::seconds(EXPIRED_OFFSET_SECS)),
            path: config.path.clone(),
            domain: config.domain.clone(),
            secure: config.secure,
            http_only: config.http_only,
        }
    }

    /// Render the cookie as a `Set-Cookie` header value.
    pub fn header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];
        if let Some(expires) = self.expires {
            parts.push(format!(
                "Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        parts.push(format!("Path={}", self.path));
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={}", domain));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        parts.join("; ")
    }

    /// Absolute expiry `lifetime_secs` from now, or `None` when the
    /// offset overflows the representable range.
    fn expiry_after(lifetime_secs: u64) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(lifetime_secs).ok()?;
        Utc::now().checked_add_signed(Duration::try_seconds(secs)?)
    }
}
