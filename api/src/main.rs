use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use serper_relay_mcp_runtime::McpRuntime;

mod app;
mod config;
mod credential;
mod error;
mod middleware;
mod routes;
mod state;

use config::RelayConfig;
use routes::table::{RouteTable, RouteTarget};
use state::{AppState, HandlerRegistry};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "serper_relay_api=debug,serper_relay_mcp_runtime=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = RelayConfig::parse();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "serper-relay terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: RelayConfig) -> std::io::Result<()> {
    let routes = RouteTable::build(config.route_mode, &config.message_path());
    let runtime = McpRuntime::new(config.upstream());
    let handlers = HandlerRegistry::new().register(RouteTarget::Message, Arc::new(runtime));
    let state = AppState::new(routes, handlers, config.default_api_key());

    let has_default = state.default_api_key.is_some();
    let app = app::build_app(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        route_mode = ?config.route_mode,
        message_path = %config.message_path(),
        default_credential = has_default,
        "serper-relay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
