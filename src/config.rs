//! Client configuration and service endpoints.

use std::collections::BTreeMap;
use std::time::Duration;

use log::warn;

use crate::http::RetryPolicy;

pub const DEFAULT_MAIN_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_AUTH_URL: &str = "http://localhost:3001/api/auth";
pub const DEFAULT_DOCUMENTS_URL: &str = "http://localhost:3001/api/documents";

/// Standard per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const ENV_MAIN_URL: &str = "LEXCRM_API_URL";
pub const ENV_AUTH_URL: &str = "LEXCRM_AUTH_URL";
pub const ENV_DOCUMENTS_URL: &str = "LEXCRM_DOCUMENTS_URL";
pub const ENV_TIMEOUT_MS: &str = "LEXCRM_API_TIMEOUT_MS";

/// Base URLs of the backend services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    pub main: String,
    pub auth: String,
    pub documents: String,
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            main: DEFAULT_MAIN_URL.to_string(),
            auth: DEFAULT_AUTH_URL.to_string(),
            documents: DEFAULT_DOCUMENTS_URL.to_string(),
        }
    }
}

impl ServiceUrls {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`; empty values are ignored.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let read = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            main: read(ENV_MAIN_URL, DEFAULT_MAIN_URL),
            auth: read(ENV_AUTH_URL, DEFAULT_AUTH_URL),
            documents: read(ENV_DOCUMENTS_URL, DEFAULT_DOCUMENTS_URL),
        }
    }
}

/// Headers every request starts from.
pub fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("content-type".to_string(), "application/json".to_string()),
        ("accept".to_string(), "application/json".to_string()),
    ])
}

/// Settings of one client instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Lowercase header names.
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MAIN_URL.to_string(),
            headers: default_headers(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().with_base_url(base_url)
    }

    /// Main service URL and timeout from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    /// An unparsable timeout falls back to the default.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let timeout_ms = match lookup(ENV_TIMEOUT_MS) {
            Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!(
                    "Ignoring invalid {}={:?}, using {}ms",
                    ENV_TIMEOUT_MS, raw, DEFAULT_TIMEOUT_MS
                );
                DEFAULT_TIMEOUT_MS
            }),
            None => DEFAULT_TIMEOUT_MS,
        };
        let urls = ServiceUrls::from_lookup(lookup);
        Self::new(urls.main).with_timeout(Duration::from_millis(timeout_ms))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Adds or replaces a default header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Merges `headers` over the current defaults.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.headers
                .insert(name.as_ref().to_ascii_lowercase(), value.into());
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
