use axum::Json;
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use serper_relay_core::error::{ApiError, codes};

const AUTH_CHALLENGE: &str = "Bearer realm=\"serper-relay\"";

/// Relay-level failures, converted to structured JSON responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No credential from any carrier on a credential-required route (401)
    #[error("missing API key")]
    MissingCredential {
        request_id: String,
        carriers: Vec<String>,
    },
    /// A route's internal handler is not registered (500)
    #[error("no handler registered for {path}")]
    HandlerUnavailable {
        request_id: String,
        path: String,
        routes: Value,
    },
    /// No route matches the path (404)
    #[error("no route for {path}")]
    NotFound {
        request_id: String,
        path: String,
        routes: Value,
    },
    /// Internal error (500)
    #[error("internal error: {message}")]
    Internal { request_id: String, message: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::MissingCredential {
                request_id,
                carriers,
            } => {
                let body = ApiError::new(
                    "Missing API key. Provide one with a request or configure a server default.",
                    codes::MISSING_CREDENTIAL,
                    request_id,
                )
                .with_docs_hint(format!("Accepted carriers: {}.", carriers.join(", ")));
                let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_CHALLENGE));
                response
            }
            AppError::HandlerUnavailable {
                request_id,
                path,
                routes,
            } => {
                tracing::error!(
                    event = "handler_unavailable",
                    request_id = %request_id,
                    path = %path,
                    "No internal handler registered for route"
                );
                let body = ApiError::new(
                    format!("No handler is registered for {path}. This is a deployment defect."),
                    codes::HANDLER_UNAVAILABLE,
                    request_id,
                )
                .with_routes(routes);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
            AppError::NotFound {
                request_id,
                path,
                routes,
            } => {
                let body = ApiError::new(
                    format!("No route matches {path}."),
                    codes::NOT_FOUND,
                    request_id,
                )
                .with_docs_hint("See `routes` for the paths this relay serves.")
                .with_routes(routes);
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            AppError::Internal {
                request_id,
                message,
            } => {
                tracing::error!(request_id = %request_id, "Internal error: {}", message);
                let body = ApiError::new(
                    "An internal error occurred",
                    codes::INTERNAL_ERROR,
                    request_id,
                );
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
