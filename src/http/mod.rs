//! HTTP client module with interceptors, retry logic and typed errors.

mod client;
mod error;
mod interceptor;
mod request;
mod response;
mod retry;

pub use client::{ApiClient, UPLOAD_FIELD};
pub use error::{
    ApiError, ErrorKind, FieldErrors, create_api_error, user_message, user_message_for,
};
pub use interceptor::{
    AuthInterceptor, LoggingInterceptor, RequestInterceptor, ResponseInterceptor,
    UnauthorizedInterceptor, apply_request_interceptors, apply_response_interceptors,
};
pub use request::{AUTHORIZATION, CONTENT_TYPE, Method, RequestBody, RequestConfig, UploadFile};
pub use response::{ApiResponse, RawResponse, ResponseBody};
pub use retry::{MAX_RETRIES, RETRY_DELAY_MS, RETRY_MULTIPLIER, RetryPolicy, should_retry};
