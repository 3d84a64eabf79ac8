//! Classification of AWS API errors
//!
//! Every SDK failure is reduced to an [`ApiError`] carrying the vendor error
//! code and HTTP status, then classified into the provider's error kinds.

use aws_sdk_cloudcontrol::config::http::HttpResponse;
use aws_sdk_cloudcontrol::error::{ProvideErrorMetadata, SdkError};
use stratus_core::provider::{ErrorKind, ProviderError};
use thiserror::Error;

const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFoundException",
    "NotFound",
    "NoSuchBucket",
    "NoSuchEntity",
    "NoSuchKey",
];

const RETRYABLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "SlowDown",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalFailure",
    "InternalError",
    "ConcurrentOperationException",
    "RequestTimeout",
    "RequestTimeoutException",
];

/// A failed AWS API call
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation}: {}", self.detail())]
pub struct ApiError {
    pub operation: String,
    pub code: Option<String>,
    pub message: String,
    pub status: Option<u16>,
    /// Request never got a response (connection, DNS, timeout)
    pub transport: bool,
}

impl ApiError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            code: None,
            message: message.into(),
            status: None,
            transport: false,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Reduce an SDK error to its code, message and status
    pub fn from_sdk<E>(operation: &str, err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let transport = matches!(
            err,
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
        );
        let status = err.raw_response().map(|r| r.status().as_u16());
        let code = err.code().map(String::from);
        let message = match err.message() {
            Some(m) => m.to_string(),
            None => match &err {
                SdkError::ServiceError(service) => service.err().to_string(),
                other => other.to_string(),
            },
        };
        Self {
            operation: operation.to_string(),
            code,
            message,
            status,
            transport,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        classify(self.code.as_deref(), self.status, self.transport)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    fn detail(&self) -> String {
        match &self.code {
            Some(code) => format!("{}: {}", code, self.message),
            None => self.message.clone(),
        }
    }
}

/// Map an error code and status onto the provider's error kinds
pub fn classify(code: Option<&str>, status: Option<u16>, transport: bool) -> ErrorKind {
    if let Some(code) = code {
        if NOT_FOUND_CODES.contains(&code) || code.ends_with(".NotFound") {
            return ErrorKind::NotFound;
        }
        if RETRYABLE_CODES.contains(&code) {
            return ErrorKind::Retryable;
        }
    }
    if transport {
        return ErrorKind::Retryable;
    }
    match status {
        Some(404) => ErrorKind::NotFound,
        Some(429) => ErrorKind::Retryable,
        Some(s) if (500..600).contains(&s) => ErrorKind::Retryable,
        _ => ErrorKind::Api,
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        ProviderError::with_kind(err.kind(), err.to_string())
    }
}
