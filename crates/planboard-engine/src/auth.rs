//! Login boundary
//!
//! The engine only cares whether a session carries a principal. How the
//! principal was obtained is up to the [`Authenticator`].

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::config::AuthConfig;

/// Login attempt
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub display_name: String,
}

impl Principal {
    #[must_use]
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
        }
    }

    /// Principal used when login is not required
    #[must_use]
    pub fn local() -> Self {
        Self::new("local", "Local user")
    }
}

/// Checks credentials
pub trait Authenticator: Send + Sync + Debug {
    /// The principal for valid credentials, `None` otherwise
    fn authenticate(&self, credentials: &Credentials) -> Option<Principal>;
}

/// Authenticator backed by the configured user table
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    config: AuthConfig,
}

impl StaticAuthenticator {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Open a session: with credentials if given, anonymously-local if
    /// login is not required, unauthenticated otherwise
    #[must_use]
    pub fn login(&self, credentials: Option<&Credentials>) -> Session {
        match credentials {
            Some(credentials) => {
                let session = Session::from(self.authenticate(credentials));
                if !session.is_authenticated() {
                    tracing::warn!(user = %credentials.username, "Login rejected");
                }
                session
            }
            None if !self.config.required => Session::authenticated(Principal::local()),
            None => Session::anonymous(),
        }
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, credentials: &Credentials) -> Option<Principal> {
        self.config
            .users
            .iter()
            .find(|u| u.username == credentials.username && u.password == credentials.password)
            .map(|u| {
                Principal::new(
                    &u.username,
                    u.display_name.clone().unwrap_or_else(|| u.username.clone()),
                )
            })
    }
}

/// Who is using the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    principal: Option<Principal>,
}

impl Session {
    #[must_use]
    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    #[inline]
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }
}

impl From<Option<Principal>> for Session {
    fn from(principal: Option<Principal>) -> Self {
        Self { principal }
    }
}
