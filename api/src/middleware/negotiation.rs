//! Repairs the `Accept` header of message-endpoint requests.
//!
//! Clients must declare both the plain JSON and the event-stream response
//! formats. Many batch-oriented callers omit `Accept` or send only one of
//! them; the relay rewrites the header once, before anything downstream
//! looks at it.

use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, HeaderValue};
use tower::{Layer, Service};

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_EVENT_STREAM: &str = "text/event-stream";

const NORMALIZED_ACCEPT: &str = "application/json, text/event-stream";

/// Whether any `Accept` value lists `media_type`. Case-insensitive;
/// parameters such as `;q=0.9` are ignored.
pub fn accepts(headers: &HeaderMap, media_type: &str) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|entry| entry.split(';').next())
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(media_type))
}

/// Ensure `Accept` lists both response formats. Returns whether the header
/// was rewritten; a complete header is left exactly as received.
pub fn normalize_accept(headers: &mut HeaderMap) -> bool {
    if accepts(headers, APPLICATION_JSON) && accepts(headers, TEXT_EVENT_STREAM) {
        return false;
    }
    headers.remove(ACCEPT);
    headers.insert(ACCEPT, HeaderValue::from_static(NORMALIZED_ACCEPT));
    true
}

fn joined_accept(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

/// Tower layer applying [`normalize_accept`] to every request it wraps.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeAcceptLayer;

impl<S> Layer<S> for NormalizeAcceptLayer {
    type Service = NormalizeAccept<S>;

    fn layer(&self, inner: S) -> Self::Service {
        NormalizeAccept { inner }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizeAccept<S> {
    inner: S,
}

impl<S> Service<Request> for NormalizeAccept<S>
where
    S: Service<Request>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let original = joined_accept(req.headers());
        if normalize_accept(req.headers_mut()) {
            tracing::debug!(
                event = "accept_header_normalized",
                path = %req.uri().path(),
                original = ?original,
                "Rewrote incomplete Accept header"
            );
        }
        self.inner.call(req)
    }
}
