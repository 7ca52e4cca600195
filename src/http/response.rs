//! Synthesized responses.
//!
//! Every response the proxy produces itself (default 404, upstream 502/504)
//! is built here, so they all carry the same framing headers.

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};

/// Build a plain-text response with an exact `Content-Length`.
pub fn simple_response(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    let body = body.into();
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    *response.body_mut() = Body::from(body);
    response
}

/// Fallback when no pre-response stage answered.
pub fn not_found() -> Response<Body> {
    simple_response(StatusCode::NOT_FOUND, "")
}

/// Upstream transport failure.
pub fn bad_gateway() -> Response<Body> {
    simple_response(StatusCode::BAD_GATEWAY, "Bad Gateway\n")
}

/// Upstream round trip timed out.
pub fn gateway_timeout() -> Response<Body> {
    simple_response(StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout\n")
}
