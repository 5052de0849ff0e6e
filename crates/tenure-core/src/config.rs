//! Session configuration
//!
//! Defines the cookie and lifetime options the lifecycle manager
//! consults, with optional TOML file loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Highest accepted cookie or remember-me lifetime, in seconds.
pub const MAX_LIFETIME_SECS: u64 = i32::MAX as u64; // About 68 years

/// Session configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session name applied at build time (optional; ASCII alphanumeric)
    pub name: Option<String>,

    /// Whether session cookies are issued at all
    pub use_cookies: bool,

    /// Cookie attributes
    pub cookie: CookieConfig,

    /// Lifetime granted by remember-me, in seconds (default: 1209600 = 2 weeks)
    pub remember_me_seconds: u64,

    /// Idle lifetime before garbage collection, in seconds (default: 1440 = 24 minutes)
    pub gc_max_lifetime: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: None,
            use_cookies: true,
            cookie: CookieConfig::default(),
            remember_me_seconds: 1_209_600, // 2 weeks
            gc_max_lifetime: 1440,          // 24 minutes
        }
    }
}

/// Cookie attribute configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Cookie path (default: "/")
    pub path: String,

    /// Cookie domain (default: none, host-only)
    pub domain: Option<String>,

    /// Require HTTPS transport (default: false)
    pub secure: bool,

    /// Hide the cookie from client-side scripts (default: true)
    pub http_only: bool,

    /// Cookie lifetime in seconds; 0 means a browser-session cookie
    pub lifetime: u64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
            lifetime: 0, // Cleared when the browser closes
        }
    }
}

impl SessionConfig {
    /// Set the session name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the cookie attributes
    pub fn with_cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    /// Set the cookie lifetime in seconds
    pub fn with_cookie_lifetime(mut self, lifetime: u64) -> Self {
        self.cookie.lifetime = lifetime;
        self
    }

    /// Set the remember-me duration in seconds
    pub fn with_remember_me(mut self, seconds: u64) -> Self {
        self.remember_me_seconds = seconds;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if let Some(name) = &self.name {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ConfigValidationError::InvalidValue {
                    field: "name".into(),
                    message: "must be non-empty ASCII alphanumeric".into(),
                });
            }
        }

        if !self.cookie.path.starts_with('/') {
            return Err(ConfigValidationError::InvalidCookiePath);
        }

        if self.cookie.lifetime > MAX_LIFETIME_SECS {
            return Err(ConfigValidationError::InvalidValue {
                field: "cookie.lifetime".into(),
                message: format!("must be at most {MAX_LIFETIME_SECS}"),
            });
        }

        if self.remember_me_seconds == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "remember_me_seconds".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.remember_me_seconds > MAX_LIFETIME_SECS {
            return Err(ConfigValidationError::InvalidValue {
                field: "remember_me_seconds".into(),
                message: format!("must be at most {MAX_LIFETIME_SECS}"),
            });
        }

        if self.gc_max_lifetime == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "gc_max_lifetime".into(),
                message: "must be greater than 0".into(),
            });
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config
            .validate()
            .map_err(|e| Error::configuration(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from the standard location, or defaults
    ///
    /// `TENURE_CONFIG` overrides the path; otherwise
    /// `~/.config/tenure/config.toml` is used. A missing file yields the
    /// defaults.
    pub fn load() -> Result<Self> {
        let path = match std::env::var("TENURE_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let Some(base) = dirs::config_dir() else {
                    return Ok(Self::default());
                };
                base.join("tenure").join("config.toml")
            }
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("cookie path must begin with '/'")]
    InvalidCookiePath,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
