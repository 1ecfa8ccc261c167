use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::Stream;
use serde_json::Value;
use serper_relay_core::credential::ResolvedCredential;
use serper_relay_mcp_runtime::{
    ProtocolHandler, RequestContext, RpcError, error_response, event_channel, wants_progress,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::middleware::negotiation::{TEXT_EVENT_STREAM, accepts};
use crate::middleware::request_id;
use crate::routes::table::RouteTarget;
use crate::state::AppState;

const SSE_MESSAGE_EVENT: &str = "message";
const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Handler invocation running as its own task. Dropping the guard aborts
/// the task, which cancels any in-flight upstream call.
struct HandlerTask {
    request_id: String,
    handle: Option<JoinHandle<()>>,
}

impl HandlerTask {
    fn spawn<F>(request_id: &str, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            request_id: request_id.to_string(),
            handle: Some(tokio::spawn(work)),
        }
    }

    /// Let a handler that already closed its sink run to completion.
    fn release(&mut self) {
        self.handle.take();
    }

    /// Wait for the handler to finish; `Err` carries a panic message.
    async fn finish(mut self) -> Result<(), String> {
        match self.handle.take() {
            Some(handle) => handle.await.map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }
}

impl Drop for HandlerTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take()
            && !handle.is_finished()
        {
            tracing::debug!(
                event = "mcp_stream_closed",
                request_id = %self.request_id,
                reason = "client_disconnected",
                "Cancelling in-flight handler"
            );
            handle.abort();
        }
    }
}

fn message_handler(
    state: &AppState,
    request_id: &str,
    uri: &Uri,
) -> Result<Arc<dyn ProtocolHandler>, AppError> {
    state
        .handlers
        .get(RouteTarget::Message)
        .ok_or_else(|| AppError::HandlerUnavailable {
            request_id: request_id.to_string(),
            path: uri.path().to_string(),
            routes: state.routes.listing(),
        })
}

/// Message submission. Replies with plain JSON, or with an event stream when
/// the client accepts one and asked for progress.
pub async fn mcp_post(
    State(state): State<AppState>,
    credential: Option<Extension<ResolvedCredential>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let request_id = request_id::current(&headers);
    let handler = message_handler(&state, &request_id, &uri)?;

    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return Ok((
                StatusCode::OK,
                Json(error_response(Value::Null, RpcError::parse_error("Parse error"))),
            )
                .into_response());
        }
    };

    let streaming = accepts(&headers, TEXT_EVENT_STREAM) && wants_progress(&incoming);
    let ctx = RequestContext::new(request_id.clone(), credential.map(|Extension(c)| c))
        .with_streaming(streaming);

    tracing::debug!(
        event = "mcp_dispatch",
        request_id = %request_id,
        path = %uri.path(),
        streaming,
        credential_source = ctx.credential().map(|c| c.source().as_str()).unwrap_or("none"),
        "Dispatching MCP message"
    );

    let (sink, rx) = event_channel();
    let task = HandlerTask::spawn(&request_id, async move {
        handler.handle(ctx, incoming, sink).await;
    });

    if streaming {
        Ok(sse_reply(rx, task))
    } else {
        plain_reply(rx, task).await
    }
}

/// Standalone server-to-client event stream.
pub async fn mcp_get(
    State(state): State<AppState>,
    credential: Option<Extension<ResolvedCredential>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let request_id = request_id::current(&headers);
    let handler = message_handler(&state, &request_id, &uri)?;
    let ctx = RequestContext::new(request_id.clone(), credential.map(|Extension(c)| c))
        .with_streaming(true);

    tracing::debug!(
        event = "mcp_dispatch",
        request_id = %request_id,
        path = %uri.path(),
        streaming = true,
        "Opening standalone MCP event stream"
    );

    let (sink, rx) = event_channel();
    let task = HandlerTask::spawn(&request_id, async move {
        handler.open_stream(ctx, sink).await;
    });
    Ok(sse_reply(rx, task))
}

/// Collect every outbound message: none → 202, one → object, more → array.
async fn plain_reply(mut rx: mpsc::Receiver<Value>, task: HandlerTask) -> Result<Response, AppError> {
    let mut messages = Vec::new();
    while let Some(message) = rx.recv().await {
        messages.push(message);
    }

    let request_id = task.request_id.clone();
    if let Err(message) = task.finish().await {
        return Err(AppError::Internal {
            request_id,
            message,
        });
    }

    Ok(match messages.len() {
        0 => StatusCode::ACCEPTED.into_response(),
        1 => (StatusCode::OK, Json(messages.remove(0))).into_response(),
        _ => (StatusCode::OK, Json(Value::Array(messages))).into_response(),
    })
}

fn sse_reply(rx: mpsc::Receiver<Value>, task: HandlerTask) -> Response {
    Sse::new(event_stream(rx, task))
        .keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
        .into_response()
}

/// Forward each outbound message as one SSE event. The stream owns the task
/// guard, so dropping the response body cancels the handler.
fn event_stream(
    rx: mpsc::Receiver<Value>,
    task: HandlerTask,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    futures_util::stream::unfold((rx, task), |(mut rx, mut task)| async move {
        match rx.recv().await {
            Some(message) => {
                let event = Event::default()
                    .event(SSE_MESSAGE_EVENT)
                    .data(message.to_string());
                Some((Ok(event), (rx, task)))
            }
            None => {
                task.release();
                tracing::debug!(
                    event = "mcp_stream_closed",
                    request_id = %task.request_id,
                    reason = "handler_finished",
                    "MCP event stream finished"
                );
                None
            }
        }
    })
}
