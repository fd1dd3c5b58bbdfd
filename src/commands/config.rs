//! Global options and the client they configure.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{Level, debug, log_enabled};

use crate::auth::{FileTokenStore, LogNavigator};
use crate::config::ClientConfig;
use crate::http::{ApiClient, LoggingInterceptor, RetryPolicy};

/// Global command-line options shared by every command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub token_file: Option<PathBuf>,
    /// Raw `NAME:VALUE` header arguments.
    pub headers: Vec<String>,
}

impl Options {
    /// Environment defaults with the command-line overrides applied.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::from_env();
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.trim_end_matches('/'));
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = self.retries {
            let retry = RetryPolicy {
                max_retries: retries,
                ..config.retry
            };
            config = config.with_retry(retry);
        }
        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            config = config.with_header(name, value);
        }
        debug!("Using API at {}", config.base_url);
        Ok(config)
    }

    /// The `--token-file` store, or the one in the user's config directory.
    pub fn token_store(&self) -> Result<FileTokenStore> {
        match &self.token_file {
            Some(path) => Ok(FileTokenStore::new(path)),
            None => FileTokenStore::default_location(),
        }
    }

    /// Client with the session interceptors plus request/response logging.
    /// Headers are logged when trace logging is enabled.
    pub fn client(&self) -> Result<ApiClient> {
        let store = Arc::new(self.token_store()?);
        let mut client = ApiClient::new(
            self.client_config()?,
            store,
            Arc::new(LogNavigator::default()),
        )
        .context("Failed to create API client")?;

        let logging = if log_enabled!(Level::Trace) {
            LoggingInterceptor::new().with_headers()
        } else {
            LoggingInterceptor::new()
        };
        let logging = Arc::new(logging);
        client
            .add_request_interceptor(logging.clone())
            .add_response_interceptor(logging);
        Ok(client)
    }
}

/// Splits `Name: value` at the first colon.
pub fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Invalid header {:?}, expected NAME:VALUE", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid header {:?}, the name is empty", raw);
    }
    Ok((name, value.trim()))
}

/// Splits `key=value` at the first equals sign.
pub fn parse_pair(raw: &str) -> Result<(&str, &str)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid query parameter {:?}, expected KEY=VALUE", raw))?;
    if key.is_empty() {
        anyhow::bail!("Invalid query parameter {:?}, the key is empty", raw);
    }
    Ok((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AUTH_TOKEN_KEY, TokenStore};

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("X-Tenant: escritorio-1").unwrap(),
            ("X-Tenant", "escritorio-1")
        );
        assert_eq!(
            parse_header("X-Trace:a:b").unwrap(),
            ("X-Trace", "a:b")
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(" : value").is_err());
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("q=silva").unwrap(), ("q", "silva"));
        assert_eq!(parse_pair("filter=a=b").unwrap(), ("filter", "a=b"));
        assert_eq!(parse_pair("empty=").unwrap(), ("empty", ""));
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn test_client_config_overrides() {
        let options = Options {
            base_url: Some("http://127.0.0.1:9999/api/".to_string()),
            timeout_ms: Some(1500),
            retries: Some(0),
            token_file: None,
            headers: vec!["Accept: text/csv".to_string()],
        };

        let config = options.client_config().unwrap();

        assert_eq!(config.base_url, "http://127.0.0.1:9999/api");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.multiplier, RetryPolicy::default().multiplier);
        assert_eq!(config.headers.get("accept").map(String::as_str), Some("text/csv"));
        assert_eq!(
            config.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn test_client_config_rejects_bad_header() {
        let options = Options {
            headers: vec!["broken".to_string()],
            ..Options::default()
        };
        assert!(options.client_config().is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_client_registers_logging_interceptor() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer abc")
            .with_header("content-type", "application/json")
            .with_body(r#"{"nome": "Ana"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let options = Options {
            base_url: Some(server.url()),
            token_file: Some(dir.path().join("session.json")),
            ..Options::default()
        };
        options
            .token_store()
            .unwrap()
            .set(AUTH_TOKEN_KEY, "abc")
            .unwrap();

        let client = options.client().unwrap();
        // auth + logging, unauthorized + logging
        assert_eq!(client.interceptor_counts(), (2, 2));

        let body: serde_json::Value = client.get("/me").await.unwrap();
        mock.assert_async().await;
        assert_eq!(body["nome"], "Ana");
    }

    #[test]
    fn test_token_store_uses_explicit_file() {
        let options = Options {
            token_file: Some(PathBuf::from("/tmp/lexcrm-session.json")),
            ..Options::default()
        };
        let store = options.token_store().unwrap();
        assert_eq!(store.path(), std::path::Path::new("/tmp/lexcrm-session.json"));
    }
}
