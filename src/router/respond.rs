//! Response builders shared by the dispatcher and the SSE channel.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_EVENT_STREAM: &str = "text/event-stream";

pub fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    with_content_type(status, TEXT_PLAIN, Body::from(body.into()))
}

pub fn json(bytes: Vec<u8>) -> Response {
    let length = bytes.len();
    let mut response = with_content_type(StatusCode::OK, APPLICATION_JSON, Body::from(bytes));
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    response
}

pub fn html(markup: &str) -> Response {
    let document = format!("<!DOCTYPE html><html>{markup}</html>");
    let mut response = with_content_type(StatusCode::OK, TEXT_HTML, Body::from(document));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

pub fn redirect(location: &str) -> Response {
    let mut response = empty(StatusCode::FOUND);
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(_) => {
            tracing::error!(location = %location, "Redirect location is not a valid header value");
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    response
}

pub fn event_stream(body: Body) -> Response {
    let mut response = with_content_type(StatusCode::OK, TEXT_EVENT_STREAM, body);
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

fn with_content_type(status: StatusCode, content_type: &'static str, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
