use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use serde::Serialize;
use serde_json::Value;

use crate::config::RouteMode;
use crate::error::AppError;
use crate::middleware::request_id;
use crate::state::AppState;

pub const SERVICE_NAME: &str = "serper-relay";

#[derive(Serialize)]
pub struct RootResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub route_mode: RouteMode,
    pub routes: Value,
    pub instructions: String,
}

#[derive(Serialize)]
pub struct HealthcheckResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Service overview with the registered route table.
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let instructions = format!(
        "Send JSON-RPC messages to {}. Credentials are accepted as: {}.{}",
        state.routes.message_path(),
        state.routes.credential_carriers().join(", "),
        if state.default_api_key.is_some() {
            " A server default is configured."
        } else {
            ""
        }
    );

    Json(RootResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        route_mode: state.routes.mode(),
        routes: state.routes.listing(),
        instructions,
    })
}

pub async fn healthcheck() -> Json<HealthcheckResponse> {
    Json(HealthcheckResponse { status: "healthy" })
}

/// Build identifier plus process start time.
pub async fn version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: state.started_at.to_rfc3339(),
    })
}

pub async fn not_found(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> AppError {
    AppError::NotFound {
        request_id: request_id::current(&headers),
        path: uri.path().to_string(),
        routes: state.routes.listing(),
    }
}
