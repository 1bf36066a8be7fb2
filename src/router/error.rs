//! Error types surfaced by the dispatcher.

use axum::http::{Method, StatusCode};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Registration rejected because an earlier spec shadows the new one.
#[derive(Debug, thiserror::Error)]
#[error("Route {template} ({method}) collides with already registered {existing}: both have shape {shape}")]
pub struct RegistrationError {
    pub method: Method,
    pub template: String,
    pub existing: String,
    pub shape: String,
}

/// Failure to read or decode a request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("Error while parsing body. Invalid Json!: {0}")]
    InvalidJson(String),

    #[error("Error decoding body: {0}")]
    Decode(String),

    #[error("Error reading body: {0}")]
    Read(String),

    #[error("Error encoding body: {0}")]
    Encode(String),
}

/// Handler error that carries the HTTP status to respond with.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    pub message: String,
    pub code: u16,
}

impl HttpError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }
}

/// Anything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Other(BoxError),
}

impl HandlerError {
    pub fn other(error: impl Into<BoxError>) -> Self {
        Self::Other(error.into())
    }

    /// Codes outside `[100, 600)` fall back to 500.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Http(err) if (100..600).contains(&err.code) => {
                StatusCode::from_u16(err.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BoxError> for HandlerError {
    fn from(error: BoxError) -> Self {
        Self::Other(error)
    }
}

impl From<BodyError> for HandlerError {
    fn from(error: BodyError) -> Self {
        Self::Other(Box::new(error))
    }
}
