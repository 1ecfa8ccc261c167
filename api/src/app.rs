use axum::Router;
use axum::routing::{MethodRouter, get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::credential::ResolveCredentialLayer;
use crate::middleware;
use crate::middleware::negotiation::NormalizeAcceptLayer;
use crate::routes::table::{CredentialPolicy, RouteDescriptor, RouteTarget};
use crate::routes::{health, mcp_http};
use crate::state::AppState;

/// Register every route of the state's table, each with its own credential
/// and negotiation layers, plus the shared tracing, request-id and CORS stack.
pub fn build_app(state: AppState, cors_origins: &str) -> Router {
    let mut router = Router::new();
    for route in state.routes.routes() {
        router = router.route(&route.pattern, method_router(route, &state));
    }

    router
        .fallback(health::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::request_id::set_layer())
                .layer(TraceLayer::new_for_http())
                .layer(middleware::request_id::propagate_layer())
                .layer(middleware::cors::build_cors_layer(cors_origins)),
        )
        .with_state(state)
}

fn method_router(route: &RouteDescriptor, state: &AppState) -> MethodRouter<AppState> {
    let mut methods = match route.target {
        RouteTarget::Root => get(health::root),
        RouteTarget::Healthcheck => get(health::healthcheck),
        RouteTarget::Version => get(health::version),
        RouteTarget::Message => get(mcp_http::mcp_get)
            .post(mcp_http::mcp_post)
            .route_layer(NormalizeAcceptLayer),
    };

    if let CredentialPolicy::Required { path_segment } = route.credential {
        methods = methods.route_layer(ResolveCredentialLayer::new(
            path_segment,
            state.default_api_key.clone(),
            state.routes.credential_carriers(),
        ));
    }

    methods
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use axum::routing::post;
    use futures_util::StreamExt;
    use serde_json::{Value, json};
    use serper_relay_mcp_runtime::{
        EventSink, McpRuntime, ProtocolHandler, RequestContext, UpstreamConfig,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::RouteMode;
    use crate::routes::table::RouteTable;
    use crate::state::HandlerRegistry;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// Echoes the credential it was handed, once per call.
    struct CredentialEcho;

    #[async_trait]
    impl ProtocolHandler for CredentialEcho {
        async fn handle(&self, ctx: RequestContext, _incoming: Value, sink: EventSink) {
            let _ = sink.emit(credential_json(&ctx)).await;
        }

        async fn open_stream(&self, ctx: RequestContext, sink: EventSink) {
            let _ = sink.emit(credential_json(&ctx)).await;
        }
    }

    fn credential_json(ctx: &RequestContext) -> Value {
        json!({
            "credential": ctx.credential().map(|c| c.value()),
            "source": ctx.credential().map(|c| c.source().as_str()),
        })
    }

    fn app_with(
        mode: RouteMode,
        handler: Option<Arc<dyn ProtocolHandler>>,
        default_api_key: Option<&str>,
    ) -> Router {
        let handlers = match handler {
            Some(handler) => HandlerRegistry::new().register(RouteTarget::Message, handler),
            None => HandlerRegistry::new(),
        };
        let state = AppState::new(
            RouteTable::build(mode, "/mcp"),
            handlers,
            default_api_key.map(ToOwned::to_owned),
        );
        build_app(state, "*")
    }

    fn runtime_for(search_api: SocketAddr) -> Arc<dyn ProtocolHandler> {
        Arc::new(McpRuntime::new(UpstreamConfig {
            search_api_url: format!("http://{search_api}"),
            fetch_api_url: format!("http://{search_api}/reader"),
            ..UpstreamConfig::default()
        }))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build")
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    async fn send(app: Router, request: Request<Body>) -> Response {
        app.oneshot(request).await.expect("router is infallible")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    /// `data:` payloads of a fully-read event-stream body.
    async fn sse_payloads(response: Response) -> Vec<Value> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .filter_map(|data| serde_json::from_str(data.trim()).ok())
            .collect()
    }

    fn search_upstream(calls: Arc<AtomicUsize>, delay: Duration) -> Router {
        Router::new().route(
            "/search",
            post(move |headers: axum::http::HeaderMap| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    axum::Json(json!({
                        "organic": [{ "title": "Test result" }],
                        "key": headers.get("x-api-key").and_then(|v| v.to_str().ok()),
                    }))
                }
            }),
        )
    }

    #[tokio::test]
    async fn health_routes_need_no_credential() {
        let app = app_with(RouteMode::Both, None, None);

        let root = send(app.clone(), get_request("/")).await;
        assert_eq!(root.status(), StatusCode::OK);
        let root = body_json(root).await;
        assert_eq!(root["status"], "ok");
        assert_eq!(root["routes"].as_array().map(Vec::len), Some(5));

        let health = send(app.clone(), get_request("/healthcheck")).await;
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(body_json(health).await, json!({ "status": "healthy" }));

        let version = body_json(send(app, get_request("/version")).await).await;
        assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
        assert!(
            chrono::DateTime::parse_from_rfc3339(version["timestamp"].as_str().unwrap_or_default())
                .is_ok()
        );
    }

    #[tokio::test]
    async fn scenario_query_credential_without_accept_header() {
        let calls = Arc::new(AtomicUsize::new(0));
        let upstream = serve(search_upstream(calls.clone(), Duration::ZERO)).await;
        let app = app_with(RouteMode::Both, Some(runtime_for(upstream)), None);

        let response = send(
            app,
            post_json(
                "/mcp?api_key=ABC",
                &json!({
                    "method": "tools/call",
                    "params": { "name": "search", "arguments": { "q": "test" } }
                }),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = body_json(response).await;
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["result"].get("isError"), None);
        let text = body["result"]["content"][0]["text"]
            .as_str()
            .expect("tool result text");
        let result: Value = serde_json::from_str(text).expect("search result JSON");
        assert_eq!(result["key"], "ABC");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scenario_missing_credential_is_401() {
        let app = app_with(RouteMode::Both, Some(Arc::new(CredentialEcho)), None);

        let response = send(
            app,
            post_json(
                "/mcp",
                &json!({
                    "method": "tools/call",
                    "params": { "name": "search", "arguments": { "q": "test" } }
                }),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap_or_default().contains("API key"));
    }

    #[tokio::test]
    async fn scenario_path_segment_credential() {
        let app = app_with(RouteMode::Both, Some(Arc::new(CredentialEcho)), None);

        let response = send(app, get_request("/ABC123/mcp")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            sse_payloads(response).await,
            vec![json!({ "credential": "ABC123", "source": "path-segment" })]
        );
    }

    #[tokio::test]
    async fn header_and_query_outrank_path_segment() {
        let app = app_with(RouteMode::Path, Some(Arc::new(CredentialEcho)), Some("D"));
        let ping = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });

        let mut request = post_json("/Z/mcp?api_key=Y", &ping);
        request
            .headers_mut()
            .insert(AUTHORIZATION, "Bearer X".parse().expect("header value"));
        let body = body_json(send(app.clone(), request).await).await;
        assert_eq!(body["credential"], "X");

        let body = body_json(send(app.clone(), post_json("/Z/mcp?api_key=Y", &ping)).await).await;
        assert_eq!(body["credential"], "Y");

        let body = body_json(send(app, post_json("/Z/mcp", &ping)).await).await;
        assert_eq!(body["credential"], "Z");
    }

    #[tokio::test]
    async fn default_credential_is_last_resort() {
        let app = app_with(RouteMode::Fixed, Some(Arc::new(CredentialEcho)), Some("D"));

        let body = body_json(send(app, post_json("/mcp", &json!({ "method": "ping" }))).await).await;

        assert_eq!(body["credential"], "D");
        assert_eq!(body["source"], "environment-default");
    }

    #[tokio::test]
    async fn scenario_disconnect_cancels_streaming_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let upstream = serve(search_upstream(calls.clone(), Duration::from_millis(300))).await;
        let app = app_with(RouteMode::Both, Some(runtime_for(upstream)), None);

        let call = |id: u64| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "tools/call",
                "params": {
                    "name": "search",
                    "arguments": { "q": "test" },
                    "_meta": { "progressToken": id }
                }
            })
        };
        let mut request = post_json("/mcp?api_key=ABC", &json!([call(1), call(2)]));
        request.headers_mut().insert(
            ACCEPT,
            "application/json, text/event-stream".parse().expect("header value"),
        );

        let response = send(app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );

        let mut body = response.into_body().into_data_stream();
        let first = body
            .next()
            .await
            .expect("stream should yield an event")
            .expect("event bytes");
        assert!(String::from_utf8_lossy(&first).contains("notifications/progress"));

        // Client goes away while the first upstream call is in flight.
        drop(body);
        tokio::time::sleep(Duration::from_millis(900)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn streaming_reply_forwards_progress_and_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let upstream = serve(search_upstream(calls.clone(), Duration::ZERO)).await;
        let app = app_with(RouteMode::Both, Some(runtime_for(upstream)), None);

        let mut request = post_json(
            "/mcp",
            &json!({
                "jsonrpc": "2.0",
                "id": 9,
                "method": "tools/call",
                "params": {
                    "name": "search",
                    "arguments": { "q": "test" },
                    "_meta": { "progressToken": "tok" }
                }
            }),
        );
        request
            .headers_mut()
            .insert(AUTHORIZATION, "Bearer ABC".parse().expect("header value"));

        // No Accept header: the normalizer adds the event-stream token.
        let payloads = sse_payloads(send(app, request).await).await;

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["method"], "notifications/progress");
        assert_eq!(payloads[1]["id"], 9);
        assert!(payloads[1]["result"]["content"][0]["text"].is_string());
    }

    #[tokio::test]
    async fn batch_and_notification_reply_shapes() {
        let unused_upstream = SocketAddr::from(([127, 0, 0, 1], 9));
        let app = app_with(RouteMode::Both, Some(runtime_for(unused_upstream)), Some("D"));

        let batch = body_json(
            send(
                app.clone(),
                post_json(
                    "/mcp",
                    &json!([
                        { "jsonrpc": "2.0", "id": 1, "method": "ping" },
                        { "jsonrpc": "2.0", "id": 2, "method": "tools/list" }
                    ]),
                ),
            )
            .await,
        )
        .await;
        assert_eq!(batch.as_array().map(Vec::len), Some(2));

        let notification = send(
            app,
            post_json(
                "/mcp",
                &json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            ),
        )
        .await;
        assert_eq!(notification.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let app = app_with(RouteMode::Both, Some(Arc::new(CredentialEcho)), Some("D"));
        let request = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request should build");

        let response = send(app, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn missing_handler_is_500_with_routes() {
        let app = app_with(RouteMode::Both, None, Some("D"));

        let response = send(app, post_json("/mcp", &json!({ "method": "ping" }))).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "handler_unavailable");
        assert!(body["routes"].as_array().is_some_and(|routes| !routes.is_empty()));
    }

    #[tokio::test]
    async fn unknown_path_is_404_with_routes() {
        let app = app_with(RouteMode::Fixed, Some(Arc::new(CredentialEcho)), None);

        let response = send(app, get_request("/ABC123/mcp")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "not_found");
        assert_eq!(body["routes"].as_array().map(Vec::len), Some(4));
    }

    #[tokio::test]
    async fn wrong_method_is_405_not_401() {
        let app = app_with(RouteMode::Both, Some(Arc::new(CredentialEcho)), None);

        let request = Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .body(Body::empty())
            .expect("request should build");

        assert_eq!(send(app, request).await.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
