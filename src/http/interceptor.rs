//! Request and response interceptors.
//!
//! Request interceptors run once per call, before the first attempt. Response
//! interceptors run on the outcome of every attempt: a successful response
//! flows through `on_fulfilled`, a failure through `on_rejected`, and each
//! interceptor sees what the previous one produced.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace, warn};

use super::error::ApiError;
use super::request::{AUTHORIZATION, RequestConfig};
use super::response::RawResponse;
use crate::auth::{AUTH_TOKEN_KEY, Navigator, TokenStore};

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, config: RequestConfig) -> Result<RequestConfig, ApiError>;
}

#[async_trait]
impl<F> RequestInterceptor for F
where
    F: Fn(RequestConfig) -> Result<RequestConfig, ApiError> + Send + Sync,
{
    async fn intercept(&self, config: RequestConfig) -> Result<RequestConfig, ApiError> {
        self(config)
    }
}

#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// Called with a successful response. May replace it or fail.
    async fn on_fulfilled(&self, response: RawResponse) -> Result<RawResponse, ApiError> {
        Ok(response)
    }

    /// Called with a failure. Rethrow it, replace it, or recover with a response.
    async fn on_rejected(&self, error: ApiError) -> Result<RawResponse, ApiError> {
        Err(error)
    }
}

pub async fn apply_request_interceptors(
    interceptors: &[Arc<dyn RequestInterceptor>],
    config: RequestConfig,
) -> Result<RequestConfig, ApiError> {
    let mut config = config;
    for interceptor in interceptors {
        config = interceptor.intercept(config).await?;
    }
    Ok(config)
}

pub async fn apply_response_interceptors(
    interceptors: &[Arc<dyn ResponseInterceptor>],
    outcome: Result<RawResponse, ApiError>,
) -> Result<RawResponse, ApiError> {
    let mut outcome = outcome;
    for interceptor in interceptors {
        outcome = match outcome {
            Ok(response) => interceptor.on_fulfilled(response).await,
            Err(error) => interceptor.on_rejected(error).await,
        };
    }
    outcome
}

/// Adds `authorization: Bearer <token>` when the store holds a token.
pub struct AuthInterceptor {
    store: Arc<dyn TokenStore>,
}

impl AuthInterceptor {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestInterceptor for AuthInterceptor {
    async fn intercept(&self, mut config: RequestConfig) -> Result<RequestConfig, ApiError> {
        if let Some(token) = self.store.get(AUTH_TOKEN_KEY) {
            config.set_header(AUTHORIZATION, format!("Bearer {}", token));
        }
        Ok(config)
    }
}

/// On a 401, clears the stored token and redirects to login. The error is
/// always passed on.
pub struct UnauthorizedInterceptor {
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl UnauthorizedInterceptor {
    pub fn new(store: Arc<dyn TokenStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self { store, navigator }
    }
}

#[async_trait]
impl ResponseInterceptor for UnauthorizedInterceptor {
    async fn on_rejected(&self, error: ApiError) -> Result<RawResponse, ApiError> {
        if error.status() == 401 {
            debug!("Received 401, clearing stored token");
            if let Err(e) = self.store.remove(AUTH_TOKEN_KEY) {
                warn!("Failed to clear stored token: {:#}", e);
            }
            self.navigator.redirect_to_login();
        }
        Err(error)
    }
}

/// Logs requests and responses at debug level. The client itself logs the
/// method and URL of every call.
#[derive(Debug, Default, Clone)]
pub struct LoggingInterceptor {
    log_headers: bool,
}

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log header names and values at trace level. The authorization
    /// value is never logged.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

#[async_trait]
impl RequestInterceptor for LoggingInterceptor {
    async fn intercept(&self, config: RequestConfig) -> Result<RequestConfig, ApiError> {
        if config.query.is_empty() {
            debug!("Sending {} request", config.method);
        } else {
            debug!(
                "Sending {} request with {} query parameter(s)",
                config.method,
                config.query.len()
            );
        }
        if self.log_headers {
            for (name, value) in &config.headers {
                let value = if name == AUTHORIZATION { "<redacted>" } else { value.as_str() };
                trace!("  {}: {}", name, value);
            }
        }
        Ok(config)
    }
}

#[async_trait]
impl ResponseInterceptor for LoggingInterceptor {
    async fn on_fulfilled(&self, response: RawResponse) -> Result<RawResponse, ApiError> {
        debug!(
            "Received HTTP {} ({} bytes)",
            response.status,
            response.body.len()
        );
        if self.log_headers {
            for (name, value) in &response.headers {
                trace!("  {}: {}", name, value);
            }
        }
        Ok(response)
    }

    async fn on_rejected(&self, error: ApiError) -> Result<RawResponse, ApiError> {
        debug!("Request failed with {} ({}): {}", error.kind(), error.status(), error);
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, MockNavigator, MockTokenStore};
    use crate::http::error::{ErrorKind, create_api_error};
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_auth_interceptor_sets_bearer_token() {
        let store = Arc::new(MemoryTokenStore::with_token("abc123"));
        let interceptor = AuthInterceptor::new(store);

        let config = RequestConfig::default().with_header("Authorization", "Basic xyz");
        let config = interceptor.intercept(config).await.unwrap();

        assert_eq!(config.header("authorization"), Some("Bearer abc123"));
    }

    #[tokio::test]
    async fn test_auth_interceptor_without_token_leaves_headers() {
        let mut store = MockTokenStore::new();
        store
            .expect_get()
            .with(eq(AUTH_TOKEN_KEY))
            .times(1)
            .returning(|_| None);
        let interceptor = AuthInterceptor::new(Arc::new(store));

        let config = RequestConfig::default().with_header("x-tenant", "1");
        let result = interceptor.intercept(config.clone()).await.unwrap();

        assert_eq!(result, config);
    }

    #[tokio::test]
    async fn test_auth_interceptor_reads_store_every_call() {
        let store = Arc::new(MemoryTokenStore::with_token("old"));
        let interceptor = AuthInterceptor::new(store.clone());

        let first = interceptor.intercept(RequestConfig::default()).await.unwrap();
        store.set(AUTH_TOKEN_KEY, "refreshed").unwrap();
        let second = interceptor.intercept(RequestConfig::default()).await.unwrap();

        assert_eq!(first.header("authorization"), Some("Bearer old"));
        assert_eq!(second.header("authorization"), Some("Bearer refreshed"));
    }

    #[tokio::test]
    async fn test_unauthorized_interceptor_clears_token_and_redirects() {
        let mut store = MockTokenStore::new();
        store
            .expect_remove()
            .with(eq(AUTH_TOKEN_KEY))
            .times(1)
            .returning(|_| Ok(()));
        let mut navigator = MockNavigator::new();
        navigator.expect_redirect_to_login().times(1).return_const(());

        let interceptor = UnauthorizedInterceptor::new(Arc::new(store), Arc::new(navigator));
        let err = interceptor
            .on_rejected(create_api_error(401, None, None))
            .await
            .unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_unauthorized_interceptor_redirects_even_if_clear_fails() {
        let mut store = MockTokenStore::new();
        store
            .expect_remove()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("read-only filesystem")));
        let mut navigator = MockNavigator::new();
        navigator.expect_redirect_to_login().times(1).return_const(());

        let interceptor = UnauthorizedInterceptor::new(Arc::new(store), Arc::new(navigator));
        let err = interceptor
            .on_rejected(create_api_error(401, None, None))
            .await
            .unwrap_err();

        assert_eq!(err.status(), 401);
    }

    #[tokio::test]
    async fn test_unauthorized_interceptor_ignores_other_errors() {
        let mut store = MockTokenStore::new();
        store.expect_remove().never();
        let mut navigator = MockNavigator::new();
        navigator.expect_redirect_to_login().never();

        let interceptor = UnauthorizedInterceptor::new(Arc::new(store), Arc::new(navigator));

        for status in [403, 404, 500] {
            let err = interceptor
                .on_rejected(create_api_error(status, None, None))
                .await
                .unwrap_err();
            assert_eq!(err.status(), status);
        }

        let response = interceptor
            .on_fulfilled(RawResponse::new(200, "ok"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_request_chain_runs_in_registration_order() {
        let first = |config: RequestConfig| -> Result<RequestConfig, ApiError> {
            Ok(config.with_header("x-order", "first"))
        };
        let second = |config: RequestConfig| -> Result<RequestConfig, ApiError> {
            let previous = config.header("x-order").unwrap_or_default().to_string();
            Ok(config.with_header("x-order", format!("{},second", previous)))
        };
        let interceptors: Vec<Arc<dyn RequestInterceptor>> = vec![Arc::new(first), Arc::new(second)];

        let config = apply_request_interceptors(&interceptors, RequestConfig::default())
            .await
            .unwrap();

        assert_eq!(config.header("x-order"), Some("first,second"));
    }

    #[tokio::test]
    async fn test_request_chain_stops_on_error() {
        let fail = |_: RequestConfig| -> Result<RequestConfig, ApiError> {
            Err(ApiError::invalid_request("missing tenant"))
        };
        let never = |_: RequestConfig| -> Result<RequestConfig, ApiError> {
            panic!("must not run after a failing interceptor")
        };
        let interceptors: Vec<Arc<dyn RequestInterceptor>> = vec![Arc::new(fail), Arc::new(never)];

        let err = apply_request_interceptors(&interceptors, RequestConfig::default())
            .await
            .unwrap_err();

        assert_eq!(err.message(), "missing tenant");
    }

    struct Recover;

    #[async_trait]
    impl ResponseInterceptor for Recover {
        async fn on_rejected(&self, error: ApiError) -> Result<RawResponse, ApiError> {
            if error.status() == 404 {
                Ok(RawResponse::new(200, "[]").with_header("content-type", "application/json"))
            } else {
                Err(error)
            }
        }
    }

    struct RejectEmpty;

    #[async_trait]
    impl ResponseInterceptor for RejectEmpty {
        async fn on_fulfilled(&self, response: RawResponse) -> Result<RawResponse, ApiError> {
            if response.body.is_empty() {
                Err(create_api_error(500, Some("empty body"), None))
            } else {
                Ok(response)
            }
        }
    }

    #[tokio::test]
    async fn test_response_chain_recovers_and_rejects() {
        let interceptors: Vec<Arc<dyn ResponseInterceptor>> =
            vec![Arc::new(Recover), Arc::new(LoggingInterceptor::new())];

        let response = apply_response_interceptors(&interceptors, Err(create_api_error(404, None, None)))
            .await
            .unwrap();
        assert_eq!(response.body, "[]");

        let interceptors: Vec<Arc<dyn ResponseInterceptor>> =
            vec![Arc::new(RejectEmpty), Arc::new(Recover)];
        let err = apply_response_interceptors(&interceptors, Ok(RawResponse::new(200, "")))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "empty body");
    }

    #[tokio::test]
    async fn test_empty_chains_pass_through() {
        let config = RequestConfig::default().with_query("q", "silva");
        assert_eq!(
            apply_request_interceptors(&[], config.clone()).await.unwrap(),
            config
        );

        let response = RawResponse::new(204, "");
        assert_eq!(
            apply_response_interceptors(&[], Ok(response.clone()))
                .await
                .unwrap(),
            response
        );
    }
}
