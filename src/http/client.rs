//! API client with interceptors, per-attempt timeouts and retry with backoff.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::{ApiError, create_api_error};
use super::interceptor::{
    AuthInterceptor, RequestInterceptor, ResponseInterceptor, UnauthorizedInterceptor,
    apply_request_interceptors, apply_response_interceptors,
};
use super::request::{CONTENT_TYPE, Method, RequestBody, RequestConfig, UploadFile};
use super::response::{ApiResponse, RawResponse, ResponseBody};
use super::retry::should_retry;
use crate::auth::{Navigator, TokenStore};
use crate::config::ClientConfig;

const USER_AGENT: &str = concat!("lexcrm-api/", env!("CARGO_PKG_VERSION"));

/// Multipart field name of an uploaded file.
pub const UPLOAD_FIELD: &str = "file";

/// HTTP client for one backend service.
///
/// Cloning is cheap and clones share the connection pool. Interceptors are
/// registered through `&mut self`, so they cannot change while a call made
/// through the same handle is in flight.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl ApiClient {
    /// Creates a client with the bearer-token and 401 interceptors installed.
    pub fn new(
        config: ClientConfig,
        token_store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let mut client = Self::bare(config)?;
        client.add_request_interceptor(Arc::new(AuthInterceptor::new(token_store.clone())));
        client.add_response_interceptor(Arc::new(UnauthorizedInterceptor::new(
            token_store,
            navigator,
        )));
        Ok(client)
    }

    /// Creates a client without any interceptors.
    pub fn bare(config: ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::invalid_request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::from_parts(http, config))
    }

    /// Wraps an existing reqwest client.
    pub fn from_parts(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            http,
            config: Arc::new(config),
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    /// Base URL, default headers, timeout and retry policy of this client.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Appends a request interceptor. Interceptors run in registration order.
    pub fn add_request_interceptor(&mut self, interceptor: Arc<dyn RequestInterceptor>) -> &mut Self {
        self.request_interceptors.push(interceptor);
        self
    }

    /// Appends a response interceptor. Interceptors run in registration order.
    pub fn add_response_interceptor(
        &mut self,
        interceptor: Arc<dyn ResponseInterceptor>,
    ) -> &mut Self {
        self.response_interceptors.push(interceptor);
        self
    }

    /// Number of registered request and response interceptors, built-ins
    /// included.
    pub fn interceptor_counts(&self) -> (usize, usize) {
        (
            self.request_interceptors.len(),
            self.response_interceptors.len(),
        )
    }

    /// Performs a call and decodes the body into `T`.
    #[tracing::instrument(skip(self, config))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        config: RequestConfig,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.execute(endpoint, config)
            .await?
            .try_map(|body| body.decode())
    }

    /// Performs a call and returns the body parsed by content type.
    #[tracing::instrument(skip(self, config))]
    pub async fn execute(
        &self,
        endpoint: &str,
        config: RequestConfig,
    ) -> Result<ApiResponse<ResponseBody>, ApiError> {
        self.run(endpoint, config, ResponseBody::parse).await
    }

    /// Performs a GET request and deserializes the body into `T`.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.get_with(endpoint, RequestConfig::default()).await
    }

    /// Like [`get`](Self::get), with per-call headers, query or timeout.
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        config: RequestConfig,
    ) -> Result<T, ApiError> {
        self.call(endpoint, config.with_method(Method::GET)).await
    }

    /// Performs a POST request with `body` serialized as JSON.
    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.post_with(endpoint, body, RequestConfig::default()).await
    }

    /// Like [`post`](Self::post), with a per-call configuration. Its method
    /// and body are replaced.
    pub async fn post_with<T, B>(
        &self,
        endpoint: &str,
        body: &B,
        config: RequestConfig,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let config = config.with_method(Method::POST).with_json(body)?;
        self.call(endpoint, config).await
    }

    /// Performs a PUT request with `body` serialized as JSON.
    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.put_with(endpoint, body, RequestConfig::default()).await
    }

    /// Like [`put`](Self::put), with a per-call configuration.
    pub async fn put_with<T, B>(
        &self,
        endpoint: &str,
        body: &B,
        config: RequestConfig,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let config = config.with_method(Method::PUT).with_json(body)?;
        self.call(endpoint, config).await
    }

    /// Performs a PATCH request with `body` serialized as JSON.
    pub async fn patch<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.patch_with(endpoint, body, RequestConfig::default()).await
    }

    /// Like [`patch`](Self::patch), with a per-call configuration.
    pub async fn patch_with<T, B>(
        &self,
        endpoint: &str,
        body: &B,
        config: RequestConfig,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let config = config.with_method(Method::PATCH).with_json(body)?;
        self.call(endpoint, config).await
    }

    /// Performs a DELETE request. Use `()` as `T` for empty responses.
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.delete_with(endpoint, RequestConfig::default()).await
    }

    /// Like [`delete`](Self::delete), with a per-call configuration.
    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        config: RequestConfig,
    ) -> Result<T, ApiError> {
        self.call(endpoint, config.with_method(Method::DELETE)).await
    }

    /// Sends `file` as multipart field `file`. Any content-type header is
    /// dropped so the transport can set the multipart boundary.
    #[tracing::instrument(skip(self, file, config))]
    pub async fn upload<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        file: UploadFile,
        config: RequestConfig,
    ) -> Result<T, ApiError> {
        debug!("Uploading {} ({} bytes)", file.file_name, file.content.len());
        let config = config
            .with_method(Method::POST)
            .without_header(CONTENT_TYPE)
            .with_body(RequestBody::Multipart(file));
        self.call(endpoint, config).await
    }

    /// GET returning the raw body bytes, whatever the content type.
    #[tracing::instrument(skip(self, config))]
    pub async fn download(&self, endpoint: &str, config: RequestConfig) -> Result<Bytes, ApiError> {
        let response = self
            .run(endpoint, config.with_method(Method::GET), |raw| {
                Ok(raw.body.clone())
            })
            .await?;
        debug!("Downloaded {} bytes", response.data.len());
        Ok(response.data)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        config: RequestConfig,
    ) -> Result<T, ApiError> {
        Ok(self.request(endpoint, config).await?.data)
    }

    /// The retry loop. Request interceptors run once; every attempt gets a
    /// fresh timeout, its outcome goes through the response interceptors and
    /// a successful response is parsed with `parse` before the loop ends.
    async fn run<D, P>(
        &self,
        endpoint: &str,
        config: RequestConfig,
        parse: P,
    ) -> Result<ApiResponse<D>, ApiError>
    where
        P: Fn(&RawResponse) -> Result<D, ApiError>,
    {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let config = config.merged_over(&self.config.headers);
        let config = apply_request_interceptors(&self.request_interceptors, config).await?;
        let timeout = config.timeout.unwrap_or(self.config.timeout);
        let policy = self.config.retry;
        debug!("{} {}", config.method, url);

        let mut last_error = None;

        for attempt in 0..=policy.max_retries {
            let outcome = self.attempt(&url, &config, timeout).await;
            let error =
                match apply_response_interceptors(&self.response_interceptors, outcome).await {
                    Ok(response) => match parse(&response) {
                        Ok(data) => {
                            return Ok(ApiResponse {
                                data,
                                status: response.status,
                                headers: response.headers,
                                config,
                            });
                        }
                        Err(error) => error,
                    },
                    Err(error) => error,
                };

            if !should_retry(&error) {
                debug!(
                    "{} {}: not retrying {} ({})",
                    config.method,
                    url,
                    error.kind(),
                    error
                );
                return Err(error);
            }

            if attempt < policy.max_retries {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} {}: attempt {}/{} failed ({}), retrying in {}ms...",
                    config.method,
                    url,
                    attempt + 1,
                    policy.max_attempts(),
                    error,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            ApiError::network(format!(
                "{} {}: failed after {} attempts",
                config.method,
                url,
                policy.max_attempts()
            ))
        }))
    }

    /// One network round-trip. Non-2xx statuses come back as classified errors.
    async fn attempt(
        &self,
        url: &str,
        config: &RequestConfig,
        timeout: Duration,
    ) -> Result<RawResponse, ApiError> {
        let request = self.build_request(url, config)?;

        let response = match tokio::time::timeout(timeout, request.send()).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(
                    "{} {}: no response within {}ms",
                    config.method,
                    url,
                    timeout.as_millis()
                );
                return Err(ApiError::timeout(timeout));
            }
        };

        let response = RawResponse::from_reqwest(response).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(&response))
        }
    }

    fn build_request(
        &self,
        url: &str,
        config: &RequestConfig,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let multipart = matches!(config.body, Some(RequestBody::Multipart(_)));

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            // The multipart encoder sets its own content-type with the boundary
            if multipart && name.eq_ignore_ascii_case(CONTENT_TYPE) {
                continue;
            }
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ApiError::invalid_request(format!("Invalid header name {:?}: {}", name, e))
            })?;
            let mut header_value = HeaderValue::from_str(value).map_err(|e| {
                ApiError::invalid_request(format!("Invalid value for header {}: {}", name, e))
            })?;
            if header_name == reqwest::header::AUTHORIZATION {
                header_value.set_sensitive(true);
            }
            headers.insert(header_name, header_value);
        }

        let mut request = self
            .http
            .request(config.method.clone(), url)
            .headers(headers);

        if !config.query.is_empty() {
            request = request.query(&config.query);
        }

        let request = match &config.body {
            None => request,
            Some(RequestBody::Json(value)) => {
                request.body(serde_json::to_vec(value).map_err(ApiError::serialization)?)
            }
            Some(RequestBody::Text(text)) => request.body(text.clone()),
            Some(RequestBody::Bytes(bytes)) => request.body(bytes.clone()),
            Some(RequestBody::Multipart(file)) => request.multipart(upload_form(file)?),
        };

        Ok(request)
    }
}

fn upload_form(file: &UploadFile) -> Result<Form, ApiError> {
    let mut part = Part::bytes(file.content.to_vec()).file_name(file.file_name.clone());
    if let Some(mime) = &file.mime_type {
        part = part.mime_str(mime).map_err(|e| {
            ApiError::invalid_request(format!("Invalid MIME type {:?}: {}", mime, e))
        })?;
    }
    Ok(Form::new().part(UPLOAD_FIELD, part))
}

fn error_from_response(response: &RawResponse) -> ApiError {
    let body = response.text_lossy();
    let error = create_api_error(response.status, None, Some(&body));
    match response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        Some(seconds) => error.with_retry_after(seconds),
        None => error,
    }
}
