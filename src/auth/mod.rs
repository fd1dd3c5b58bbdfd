//! Session collaborators of the API client.
//!
//! - `TokenStore` - where the bearer token lives between calls
//! - `Navigator` - what happens when the session is rejected
//! - `file` - a JSON-file token store used by the CLI

mod file;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use log::warn;

pub use file::FileTokenStore;

/// Key under which the bearer token is stored.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Route the user is sent to when the session is rejected.
pub const LOGIN_ROUTE: &str = "/login";

/// Key-value storage for session values.
///
/// The client reads [`AUTH_TOKEN_KEY`] before every request and removes it on
/// a 401, so implementations must tolerate concurrent and repeated removes.
#[cfg_attr(test, mockall::automock)]
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        let store = Self::new();
        store
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(AUTH_TOKEN_KEY.to_string(), token.to_string());
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Side effect triggered when the backend rejects the session.
#[cfg_attr(test, mockall::automock)]
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Logs the redirect. Suitable for headless callers such as the CLI.
#[derive(Debug, Clone)]
pub struct LogNavigator {
    login_route: String,
}

impl LogNavigator {
    pub fn new(login_route: impl Into<String>) -> Self {
        Self {
            login_route: login_route.into(),
        }
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }
}

impl Default for LogNavigator {
    fn default() -> Self {
        Self::new(LOGIN_ROUTE)
    }
}

impl Navigator for LogNavigator {
    fn redirect_to_login(&self) {
        warn!("Session rejected, redirecting to {}", self.login_route);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self) {}
}
