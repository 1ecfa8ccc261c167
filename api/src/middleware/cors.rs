use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build a CORS layer from the configured origin list.
///
/// - Origins: `*` for any origin, otherwise a comma-separated list
/// - Methods: GET, POST, OPTIONS
/// - Headers: Authorization, Content-Type, Accept, Mcp-Protocol-Version
/// - Max age: 3600s
pub fn build_cors_layer(origins: &str) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allow_origin(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
            HeaderName::from_static("accept"),
            HeaderName::from_static("mcp-protocol-version"),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

fn allow_origin(origins: &str) -> AllowOrigin {
    let listed: Vec<&str> = origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .collect();

    if listed.is_empty() || listed.contains(&"*") {
        return AllowOrigin::any();
    }

    let values: Vec<HeaderValue> = listed
        .into_iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    AllowOrigin::list(values)
}
