//! Raw responses, parsed bodies and the success envelope.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;
use super::request::{CONTENT_TYPE, RequestConfig};

/// A response as received from the transport, before body parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Lowercase header names. Repeated headers are joined with ", ".
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> &str {
        self.header(CONTENT_TYPE).unwrap_or_default()
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub(crate) async fn from_reqwest(response: reqwest::Response) -> Result<Self, ApiError> {
        let status = response.status().as_u16();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }
}

/// A response body interpreted according to its content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Binary(Bytes),
}

impl ResponseBody {
    /// `application/json` is parsed as JSON (an empty body is `null`),
    /// `text/*` is returned as text (decoded lossily) and anything else as
    /// raw bytes.
    pub fn parse(response: &RawResponse) -> Result<Self, ApiError> {
        let content_type = response.content_type().to_ascii_lowercase();
        if content_type.contains("application/json") {
            if response.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(ResponseBody::Json(Value::Null));
            }
            serde_json::from_slice(&response.body)
                .map(ResponseBody::Json)
                .map_err(|e| {
                    ApiError::parse(
                        format!("Failed to parse JSON response: {}", e),
                        response.status,
                    )
                })
        } else if content_type.contains("text/") {
            // Invalid sequences become U+FFFD
            Ok(ResponseBody::Text(response.text_lossy()))
        } else {
            Ok(ResponseBody::Binary(response.body.clone()))
        }
    }

    /// Converts into a caller type. Text decodes as a JSON string, so
    /// `String` accepts both text and JSON-string bodies. An empty binary
    /// body (such as a 204) decodes as `null`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let value = match self {
            ResponseBody::Json(value) => value,
            ResponseBody::Text(text) => Value::String(text),
            ResponseBody::Binary(bytes) if bytes.is_empty() => Value::Null,
            ResponseBody::Binary(bytes) => {
                return Err(ApiError::parse(
                    format!(
                        "Expected a JSON or text body, got {} bytes of binary data",
                        bytes.len()
                    ),
                    0,
                ));
            }
        };
        serde_json::from_value(value)
            .map_err(|e| ApiError::parse(format!("Unexpected response shape: {}", e), 0))
    }
}

/// A successful call: parsed data plus the status, headers and the request
/// configuration that produced it.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub config: RequestConfig,
}

impl<T> ApiResponse<T> {
    pub fn try_map<U, F>(self, f: F) -> Result<ApiResponse<U>, ApiError>
    where
        F: FnOnce(T) -> Result<U, ApiError>,
    {
        let status = self.status;
        let data = f(self.data).map_err(|e| {
            if e.status() == 0 {
                ApiError::parse(e.message(), status)
            } else {
                e
            }
        })?;
        Ok(ApiResponse {
            data,
            status,
            headers: self.headers,
            config: self.config,
        })
    }
}
