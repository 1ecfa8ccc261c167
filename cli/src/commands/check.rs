use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{Value, json};

use crate::util::{EXIT_CHECK_FAILED, EXIT_OK, client, endpoint, report_error, to_pretty_json};

const FULL_ACCEPT: &str = "application/json, text/event-stream";
const DETAIL_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub ok: bool,
    pub status: u16,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub checks: Vec<CheckResult>,
    pub ok: bool,
}

/// Run the deployment checks and print the JSON report.
pub async fn run(base_url: &str, api_key: Option<&str>, message_path: &str) -> i32 {
    match run_checks(&client(), base_url, api_key, message_path).await {
        Ok(report) => {
            let output = serde_json::to_value(&report).unwrap_or(Value::Null);
            if report.ok {
                println!("{}", to_pretty_json(&output));
                EXIT_OK
            } else {
                eprintln!("{}", to_pretty_json(&output));
                EXIT_CHECK_FAILED
            }
        }
        Err(e) => report_error(
            "connection_error",
            &e.to_string(),
            Some("Is the relay running? Check RELAY_URL."),
        ),
    }
}

pub async fn run_checks(
    http: &reqwest::Client,
    base_url: &str,
    api_key: Option<&str>,
    message_path: &str,
) -> Result<Report, Box<dyn std::error::Error>> {
    let mut checks = Vec::new();

    let response = http.get(endpoint(base_url, "/version", None)?).send().await?;
    let status = response.status().as_u16();
    checks.push(check_version(status, &read_json(response).await));

    let message_url = endpoint(base_url, message_path, api_key)?;
    let tools_list = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" });

    // No explicit Accept: the relay must repair it instead of answering 406.
    let response = http
        .post(message_url.clone())
        .header(CONTENT_TYPE, "application/json")
        .body(tools_list.to_string())
        .send()
        .await?;
    let status = response.status().as_u16();
    checks.push(check_tools_list(
        "tools_list_without_accept",
        status,
        &read_json(response).await,
    ));

    let response = http
        .post(message_url.clone())
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, FULL_ACCEPT)
        .body(tools_list.to_string())
        .send()
        .await?;
    let status = response.status().as_u16();
    checks.push(check_tools_list(
        "tools_list_with_accept",
        status,
        &read_json(response).await,
    ));

    let search = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": { "name": "search", "arguments": { "q": "test", "num": 1 } }
    });
    let response = http
        .post(message_url)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, FULL_ACCEPT)
        .body(search.to_string())
        .send()
        .await?;
    let status = response.status().as_u16();
    checks.push(check_search(status, &read_json(response).await));

    let ok = checks.iter().all(|check| check.ok);
    Ok(Report { checks, ok })
}

async fn read_json(response: reqwest::Response) -> Value {
    match response.text().await {
        Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Err(e) => json!({ "read_error": e.to_string() }),
    }
}

fn preview(value: &Value) -> String {
    let text = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    text.chars().take(DETAIL_PREVIEW_CHARS).collect()
}

fn check_version(status: u16, body: &Value) -> CheckResult {
    let version = body.get("version").and_then(Value::as_str);
    CheckResult {
        name: "version",
        ok: status == 200 && version.is_some(),
        status,
        detail: match (version, body.get("timestamp").and_then(Value::as_str)) {
            (Some(version), Some(started)) => format!("version {version}, started {started}"),
            (Some(version), None) => format!("version {version}"),
            _ => preview(body),
        },
    }
}

fn check_tools_list(name: &'static str, status: u16, body: &Value) -> CheckResult {
    let tools: Option<Vec<&str>> = body
        .pointer("/result/tools")
        .and_then(Value::as_array)
        .map(|tools| tools.iter().filter_map(|t| t["name"].as_str()).collect());

    let detail = match (&tools, status) {
        (_, 406) => "relay rejected the request as not acceptable".to_string(),
        (Some(names), _) => format!("{} tools: {}", names.len(), names.join(", ")),
        (None, _) => preview(body),
    };
    CheckResult {
        name,
        ok: status == 200 && tools.is_some(),
        status,
        detail,
    }
}

fn check_search(status: u16, body: &Value) -> CheckResult {
    let result = body.get("result");
    let is_error = result
        .and_then(|r| r.get("isError"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let text = result
        .and_then(|r| r.pointer("/content/0/text"))
        .map(preview);

    CheckResult {
        name: "search_tool_call",
        ok: status == 200 && result.is_some() && !is_error,
        status,
        detail: text.unwrap_or_else(|| preview(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// Relay stand-in that, like a strict MCP server, answers 406 unless
    /// both response formats are accepted.
    fn strict_relay() -> Router {
        Router::new()
            .route(
                "/version",
                get(|| async {
                    axum::Json(json!({
                        "status": "ok",
                        "version": "0.1.0",
                        "timestamp": "2026-01-01T00:00:00+00:00"
                    }))
                }),
            )
            .route(
                "/mcp",
                post(|headers: HeaderMap, body: axum::Json<Value>| async move {
                    let accept = headers
                        .get("accept")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    if !accept.contains("text/event-stream") {
                        return (StatusCode::NOT_ACCEPTABLE, axum::Json(json!({}))).into_response();
                    }
                    let result = match body["method"].as_str() {
                        Some("tools/list") => json!({ "tools": [{ "name": "search" }] }),
                        _ => json!({ "content": [{ "type": "text", "text": "{}" }] }),
                    };
                    axum::Json(json!({ "jsonrpc": "2.0", "id": body["id"], "result": result }))
                        .into_response()
                }),
            )
    }

    #[tokio::test]
    async fn report_flags_relay_that_rejects_missing_accept() {
        let addr = serve(strict_relay()).await;

        let report = run_checks(&client(), &format!("http://{addr}"), Some("k"), "/mcp")
            .await
            .expect("relay reachable");

        let by_name = |name: &str| {
            report
                .checks
                .iter()
                .find(|check| check.name == name)
                .expect("check present")
        };
        assert!(by_name("version").ok);
        assert!(!by_name("tools_list_without_accept").ok);
        assert_eq!(by_name("tools_list_without_accept").status, 406);
        assert!(by_name("tools_list_with_accept").ok);
        assert!(by_name("search_tool_call").ok);
        assert!(!report.ok);
    }

    #[test]
    fn search_tool_error_fails_the_check() {
        let check = check_search(
            200,
            &json!({
                "result": {
                    "isError": true,
                    "content": [{ "type": "text", "text": "Error: No API key available" }]
                }
            }),
        );
        assert!(!check.ok);
        assert_eq!(check.detail, "Error: No API key available");
    }

    #[test]
    fn version_check_requires_version_field() {
        assert!(check_version(200, &json!({ "version": "0.1.0" })).ok);
        assert!(!check_version(200, &json!({ "status": "ok" })).ok);
        assert!(!check_version(500, &json!({ "version": "0.1.0" })).ok);
    }
}
