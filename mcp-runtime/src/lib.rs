use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

pub mod context;
pub mod tools;
pub mod upstream;

pub use context::{EventSink, RequestContext, SinkClosed, event_channel};
pub use upstream::UpstreamConfig;

use tools::{ToolOutcome, Tools};

pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";
pub const MCP_SERVER_NAME: &str = "serper-relay";

/// The protocol handler the relay dispatches message-endpoint requests to.
///
/// Outbound messages are pushed into `sink` as soon as they are ready; a
/// failed emit means the client went away and the handler should stop.
#[async_trait]
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Handle one inbound JSON-RPC payload (single message or batch).
    async fn handle(&self, ctx: RequestContext, incoming: Value, sink: EventSink);

    /// Standalone server-to-client stream opened with `GET`. Stays open
    /// until the client disconnects.
    async fn open_stream(&self, ctx: RequestContext, sink: EventSink) {
        tracing::debug!(
            event = "mcp_stream_opened",
            request_id = %ctx.request_id,
            "Standalone event stream opened"
        );
        sink.closed().await;
    }
}

/// JSON-RPC 2.0 tool-invocation runtime exposing `search` and `visit_page`.
#[derive(Clone)]
pub struct McpRuntime {
    tools: Arc<Tools>,
}

impl McpRuntime {
    pub fn new(config: UpstreamConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: UpstreamConfig) -> Self {
        Self {
            tools: Arc::new(Tools::new(http, &config)),
        }
    }

    async fn handle_single_message(
        &self,
        ctx: &RequestContext,
        incoming: Value,
        sink: &EventSink,
    ) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        // Batch-oriented clients routinely omit `jsonrpc`; only a wrong value is rejected.
        if let Some(version) = obj.get("jsonrpc")
            && version.as_str() != Some("2.0")
        {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; the runtime never issues outbound requests.
            return None;
        };

        if is_notification_method(method) {
            return None;
        }

        // Request-class methods without an id are answered with a null id
        // instead of being dropped as notifications.
        let id = obj.get("id").cloned().unwrap_or(Value::Null);
        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        Some(match self.handle_request(ctx, method, params, sink).await {
            Ok(payload) => success_response(id, payload),
            Err(err) => error_response(id, err),
        })
    }

    async fn handle_request(
        &self,
        ctx: &RequestContext,
        method: &str,
        params: Value,
        sink: &EventSink,
    ) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools.definitions() })),
            "tools/call" => self.handle_tools_call(ctx, params, sink).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    async fn handle_tools_call(
        &self,
        ctx: &RequestContext,
        params: Value,
        sink: &EventSink,
    ) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        if !self.tools.contains(name) {
            return Err(RpcError::invalid_params(format!("Unknown tool: {name}")));
        }

        if ctx.is_streaming()
            && let Some(token) = progress_token(params)
        {
            let notification = progress_notification(token, format!("calling {name}"));
            if sink.emit(notification).await.is_err() {
                return Err(RpcError::internal("client disconnected"));
            }
        }

        tracing::info!(
            event = "tool_call",
            request_id = %ctx.request_id,
            tool = name,
            credential_source = ctx.credential().map(|c| c.source().as_str()).unwrap_or("none"),
            "MCP tool call"
        );

        let ToolOutcome { text, is_error } = self.tools.call(ctx, name, args).await;
        Ok(build_tool_call_response(text, is_error))
    }
}

#[async_trait]
impl ProtocolHandler for McpRuntime {
    async fn handle(&self, ctx: RequestContext, incoming: Value, sink: EventSink) {
        let items = match incoming {
            Value::Array(batch) if batch.is_empty() => {
                let _ = sink
                    .emit(error_response(
                        Value::Null,
                        RpcError::invalid_request("Batch request must not be empty"),
                    ))
                    .await;
                return;
            }
            Value::Array(batch) => batch,
            single => vec![single],
        };

        for item in items {
            if sink.is_closed() {
                tracing::debug!(
                    event = "mcp_client_gone",
                    request_id = %ctx.request_id,
                    "Client disconnected, skipping remaining messages"
                );
                return;
            }
            if let Some(response) = self.handle_single_message(&ctx, item, &sink).await
                && sink.emit(response).await.is_err()
            {
                return;
            }
        }
    }
}

/// Whether any request in `incoming` asks for progress notifications.
pub fn wants_progress(incoming: &Value) -> bool {
    let carries_token = |item: &Value| {
        item.get("params")
            .and_then(Value::as_object)
            .and_then(progress_token)
            .is_some()
    };
    match incoming {
        Value::Array(batch) => batch.iter().any(carries_token),
        single => carries_token(single),
    }
}

fn progress_token(params: &Map<String, Value>) -> Option<&Value> {
    params
        .get("_meta")
        .and_then(|meta| meta.get("progressToken"))
        .filter(|token| token.is_string() || token.is_number())
}

fn progress_notification(token: &Value, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "notifications/progress",
        "params": {
            "progressToken": token,
            "progress": 0,
            "message": message
        }
    })
}

fn is_notification_method(method: &str) -> bool {
    method.starts_with("notifications/")
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Use `search` for Google results (type: search, news, images, places, videos, shopping, scholar) and `visit_page` to read a page as text."
    })
}

fn build_tool_call_response(text: String, is_error: bool) -> Value {
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }]
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }]
        })
    }
}

#[derive(Debug)]
pub struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}
