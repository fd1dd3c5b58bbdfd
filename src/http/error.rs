//! Typed errors for API calls and their classification by HTTP status.
//!
//! Every failed call surfaces as exactly one [`ApiError`] whose [`ErrorKind`]
//! is derived from the HTTP status (or from the transport failure when no
//! status exists). Callers discriminate on [`ApiError::kind`], never on the
//! message text.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Field name -> validation messages reported by the server.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// The concrete kind of a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generic API error (unclassified 4xx, invalid request, serialization).
    Api,
    /// The transport failed before an HTTP status was received.
    Network,
    /// The attempt did not receive a response within its timeout.
    Timeout,
    /// HTTP 401
    Authentication,
    /// HTTP 403
    Authorization,
    /// HTTP 404
    NotFound,
    /// HTTP 400 and 422
    Validation { errors: FieldErrors },
    /// HTTP 409
    Conflict,
    /// HTTP 429
    RateLimit { retry_after: Option<u64> },
    /// HTTP 500 and any other 5xx except 503
    Server,
    /// HTTP 503
    ServiceUnavailable,
    /// A response body could not be interpreted.
    Parse,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Api => "ApiError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Authentication => "AuthenticationError",
            ErrorKind::Authorization => "AuthorizationError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Validation { .. } => "ValidationError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::RateLimit { .. } => "RateLimitError",
            ErrorKind::Server => "ServerError",
            ErrorKind::ServiceUnavailable => "ServiceUnavailableError",
            ErrorKind::Parse => "ParseError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed API call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    status: u16,
    code: Option<String>,
    details: Option<Value>,
    timestamp: Option<String>,
    path: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, status: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
            code: None,
            details: None,
            timestamp: None,
            path: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message, 0)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Request timed out after {}ms", after.as_millis()),
            0,
        )
        .with_code("TIMEOUT")
    }

    /// A body that could not be parsed. `status` is the status of the
    /// response that carried it.
    pub fn parse(message: impl Into<String>, status: u16) -> Self {
        Self::new(ErrorKind::Parse, message, status).with_code("PARSE_ERROR")
    }

    /// A request that could not be built (bad header, bad URL).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, message, 0).with_code("INVALID_REQUEST")
    }

    pub fn serialization(error: serde_json::Error) -> Self {
        Self::new(
            ErrorKind::Api,
            format!("Failed to serialize request body: {}", error),
            0,
        )
        .with_code("SERIALIZATION")
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the retry-after hint. Has no effect unless this is a rate-limit error.
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        if let ErrorKind::RateLimit { retry_after } = &mut self.kind {
            *retry_after = Some(seconds);
        }
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status, or 0 when no response was received.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match &self.kind {
            ErrorKind::Validation { errors } => Some(errors),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self.kind {
            ErrorKind::RateLimit { retry_after } => retry_after,
            _ => None,
        }
    }

    /// Network, timeout, 5xx and rate-limit errors may succeed if tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::Server
                | ErrorKind::ServiceUnavailable
                | ErrorKind::RateLimit { .. }
        )
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            ApiError::invalid_request(format!("Failed to build request: {}", error))
        } else if error.is_timeout() {
            ApiError::new(ErrorKind::Timeout, error.to_string(), 0).with_code("TIMEOUT")
        } else if error.is_decode() {
            ApiError::parse(
                format!("Failed to read response body: {}", error),
                error.status().map(|s| s.as_u16()).unwrap_or_default(),
            )
        } else {
            ApiError::network(format!("Network error: {}", error)).with_code("NETWORK_ERROR")
        }
    }
}

/// Error payload a backend may send with a non-2xx response.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: Option<String>,
    code: Option<Value>,
    details: Option<Value>,
    timestamp: Option<String>,
    path: Option<String>,
    errors: Option<BTreeMap<String, OneOrMany>>,
    #[serde(alias = "retryAfter")]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Builds the error for an HTTP status.
///
/// `message` overrides the default message; `body` is the raw response body.
/// A JSON body contributes its `message`, `code`, `details`, `timestamp`,
/// `path`, `errors` and `retryAfter` fields. A non-JSON body is used as the
/// message when no explicit message is given.
pub fn create_api_error(status: u16, message: Option<&str>, body: Option<&str>) -> ApiError {
    let raw = body.map(str::trim).filter(|b| !b.is_empty());
    let parsed = raw.and_then(|b| serde_json::from_str::<ErrorBody>(b).ok());
    let parsed_ok = parsed.is_some();
    let mut parsed = parsed.unwrap_or_default();

    let message = parsed
        .message
        .take()
        .or_else(|| message.map(str::to_string))
        .or_else(|| raw.filter(|_| !parsed_ok).map(str::to_string))
        .unwrap_or_else(|| default_message(status));

    let kind = match status {
        0 => ErrorKind::Network,
        400 | 422 => ErrorKind::Validation {
            errors: parsed
                .errors
                .map(|errors| errors.into_iter().map(|(k, v)| (k, v.into())).collect())
                .unwrap_or_default(),
        },
        401 => ErrorKind::Authentication,
        403 => ErrorKind::Authorization,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        429 => ErrorKind::RateLimit {
            retry_after: parsed.retry_after,
        },
        503 => ErrorKind::ServiceUnavailable,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Api,
    };

    ApiError {
        kind,
        message,
        status,
        code: parsed.code.map(|c| match c {
            Value::String(s) => s,
            other => other.to_string(),
        }),
        details: parsed.details,
        timestamp: parsed.timestamp,
        path: parsed.path,
    }
}

fn default_message(status: u16) -> String {
    match StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("HTTP {} {}", status, reason),
        None if status == 0 => "Network request failed".to_string(),
        None => format!("HTTP {}", status),
    }
}

const FALLBACK_MESSAGE: &str = "Ocorreu um erro inesperado. Tente novamente.";

/// Fixed pt-BR sentence shown to users for an error.
pub fn user_message(error: &ApiError) -> &'static str {
    match error.kind() {
        ErrorKind::Api => "Ocorreu um erro ao processar sua solicitação.",
        ErrorKind::Network => "Erro de conexão. Verifique sua internet e tente novamente.",
        ErrorKind::Timeout => "A requisição demorou muito para responder. Tente novamente.",
        ErrorKind::Authentication => "Sua sessão expirou. Faça login novamente.",
        ErrorKind::Authorization => "Você não tem permissão para realizar esta ação.",
        ErrorKind::NotFound => "O recurso solicitado não foi encontrado.",
        ErrorKind::Validation { .. } => {
            "Os dados informados são inválidos. Verifique os campos e tente novamente."
        }
        ErrorKind::Conflict => "Este registro já existe ou está em conflito com outro.",
        ErrorKind::RateLimit { .. } => "Muitas requisições. Aguarde um momento e tente novamente.",
        ErrorKind::Server => "Erro interno do servidor. Tente novamente mais tarde.",
        ErrorKind::ServiceUnavailable => {
            "Serviço temporariamente indisponível. Tente novamente mais tarde."
        }
        ErrorKind::Parse => "Não foi possível interpretar a resposta do servidor.",
    }
}

/// Like [`user_message`], for any error. Walks the source chain looking for
/// an [`ApiError`] and falls back to a generic sentence.
pub fn user_message_for(error: &(dyn std::error::Error + 'static)) -> &'static str {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(api_error) = err.downcast_ref::<ApiError>() {
            return user_message(api_error);
        }
        current = err.source();
    }
    FALLBACK_MESSAGE
}
