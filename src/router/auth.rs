//! Authorization outcomes.
//!
//! An authorization function resolves to `Ok(Ok(token))`, `Ok(Err(failure))`
//! for an expected refusal, or `Err(_)` when the check itself broke. The
//! last case becomes a 500 and never reaches the handler.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;

use crate::router::dispatch::RequestHead;
use crate::router::error::BoxError;
use crate::router::respond;

pub type AuthOutcome<T> = Result<T, AuthFailure>;

/// Why a request was refused.
#[derive(Debug, Clone)]
pub enum AuthFailure {
    /// 401 with the message, or a redirect when the run options name a login page.
    Message(String),
    /// 302 to the given location.
    Redirect(String),
    /// Exactly this status and these headers, empty body.
    Status(StatusCode, HeaderMap),
}

impl AuthFailure {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn into_response(self, redirect_on_unauthorized: Option<&str>) -> Response {
        match self {
            AuthFailure::Message(message) => match redirect_on_unauthorized {
                Some(location) => respond::redirect(location),
                None => respond::text(
                    StatusCode::UNAUTHORIZED,
                    format!("Failed to authorize: {message}"),
                ),
            },
            AuthFailure::Redirect(location) => respond::redirect(&location),
            AuthFailure::Status(status, headers) => {
                let mut response = respond::empty(status);
                response.headers_mut().extend(headers);
                response
            }
        }
    }
}

/// Authorization that lets every request through with a `()` token.
pub async fn allow<C, P>(
    _request: RequestHead,
    _context: Arc<C>,
    _params: P,
) -> Result<AuthOutcome<()>, BoxError> {
    Ok(Ok(()))
}

/// Extract a bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value: &HeaderValue| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
