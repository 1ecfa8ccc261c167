use serde::Serialize;

/// Structured error body for relay-level failures.
/// `error` is always a sentence the caller can act on; `error_code` is the
/// stable machine-readable counterpart.
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Human/agent-readable description of what went wrong and how to fix it
    pub error: String,
    /// Machine-readable error code (see [`codes`])
    pub error_code: String,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    /// Registered route listing, attached to routing/configuration failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, error_code: &str, request_id: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_code: error_code.to_string(),
            request_id: request_id.into(),
            docs_hint: None,
            routes: None,
        }
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_routes(mut self, routes: serde_json::Value) -> Self {
        self.routes = Some(routes);
        self
    }
}

/// Error codes used across the relay
pub mod codes {
    pub const MISSING_CREDENTIAL: &str = "missing_credential";
    pub const HANDLER_UNAVAILABLE: &str = "handler_unavailable";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL_ERROR: &str = "internal_error";
}
