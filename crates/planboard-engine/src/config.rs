//! Engine configuration
//!
//! Loaded from TOML by the operator CLI; every field has a default so a
//! partial file is enough.

use planboard_persist::{GatewayConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EngineResult;

/// Planning engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Product name used as the export file prefix
    pub product_name: String,
    /// Idle window before a deferred commit fires
    pub autosave_idle_ms: u64,
    /// How long a notification stays visible
    pub notification_ttl_ms: u64,
    /// Upper bound on simultaneously visible notifications
    pub max_notifications: usize,
    /// Snapshot slots and trusted version
    pub gateway: GatewayConfig,
    /// Seed fetch retry policy
    pub seed_retry: RetryPolicy,
    /// Login requirements
    pub auth: AuthConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns [`EngineError::Config`](crate::EngineError::Config) on
    /// malformed TOML or mistyped fields
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// With product name
    #[inline]
    #[must_use]
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    /// With auto-save idle window
    #[inline]
    #[must_use]
    pub fn with_autosave_idle(mut self, idle: Duration) -> Self {
        self.autosave_idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With notification time-to-live
    #[inline]
    #[must_use]
    pub fn with_notification_ttl(mut self, ttl: Duration) -> Self {
        self.notification_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With gateway configuration
    #[inline]
    #[must_use]
    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }

    /// With seed retry policy
    #[inline]
    #[must_use]
    pub fn with_seed_retry(mut self, policy: RetryPolicy) -> Self {
        self.seed_retry = policy;
        self
    }

    /// With auth configuration
    #[inline]
    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Auto-save idle window
    #[inline]
    #[must_use]
    pub fn autosave_idle(&self) -> Duration {
        Duration::from_millis(self.autosave_idle_ms)
    }

    /// Notification time-to-live
    #[inline]
    #[must_use]
    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            product_name: "planboard".to_string(),
            autosave_idle_ms: 2000,
            notification_ttl_ms: 3000,
            max_notifications: 16,
            gateway: GatewayConfig::default(),
            seed_retry: RetryPolicy::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Login requirements and the static user table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether callers must present credentials
    pub required: bool,
    /// Known users
    pub users: Vec<UserRecord>,
}

/// A static user entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Login name
    pub username: String,
    /// Shared secret
    pub password: String,
    /// Name shown in greetings; falls back to the login name
    #[serde(default)]
    pub display_name: Option<String>,
}
