//! Error taxonomy for the request layer and the tokenizer adapter.

use thiserror::Error;

/// Coarse classification of an [`ApiError`], used by retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// HTTP 429 from the API.
    RateLimited,
    /// Any other non-200 status from the API.
    ServiceError,
    /// An optional backend was not compiled in.
    MissingDependency,
    /// A tokenizer or encoding identifier could not be resolved.
    InvalidModelIdentifier,
    /// Network failure, timeout or a response that could not be decoded.
    Transport,
    /// The caller passed input the API cannot accept.
    InvalidInput,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API rate limit exceeded: {body}")]
    RateLimited { body: String },

    #[error("API returned an error.\nStatus code: {status_code}\nResponse body: {body}")]
    Service { status_code: u16, body: String },

    #[error("The `{feature}` backend is not available. Rebuild with `--features {feature}`.")]
    MissingDependency { feature: &'static str },

    #[error("Invalid tokenizer identifier '{identifier}': {reason}")]
    InvalidModelIdentifier { identifier: String, reason: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Malformed response (status {status}): {reason}\nResponse body: {body}")]
    MalformedResponse {
        status: u16,
        body: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::Service { .. } => ErrorKind::ServiceError,
            ApiError::MissingDependency { .. } => ErrorKind::MissingDependency,
            ApiError::InvalidModelIdentifier { .. } => ErrorKind::InvalidModelIdentifier,
            ApiError::Transport(_) | ApiError::MalformedResponse { .. } => ErrorKind::Transport,
            ApiError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Status code carried by a classified API failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Service { status_code, .. } => Some(*status_code),
            ApiError::MalformedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is a classified API failure (429 or other non-200).
    pub fn is_classified(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited | ErrorKind::ServiceError
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Transport(format!("request timed out: {}", err))
        } else if err.is_connect() {
            ApiError::Transport(format!("connection failed: {}", err))
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}
