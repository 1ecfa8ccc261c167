use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use serper_relay_mcp_runtime::UpstreamConfig;
use serper_relay_mcp_runtime::upstream::{DEFAULT_FETCH_API_URL, DEFAULT_SEARCH_API_URL};

const DEFAULT_MESSAGE_PATH: &str = "/mcp";

/// Which message-endpoint shapes a deployment exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    /// Only the fixed path; credential from header, query or default.
    Fixed,
    /// Only `/{credential}/<message path>`.
    Path,
    /// Both shapes, converging on the same handler.
    Both,
}

impl RouteMode {
    pub fn exposes_fixed(self) -> bool {
        matches!(self, RouteMode::Fixed | RouteMode::Both)
    }

    pub fn exposes_path(self) -> bool {
        matches!(self, RouteMode::Path | RouteMode::Both)
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "serper-relay",
    version,
    about = "HTTP relay exposing web search and page fetch tools over MCP"
)]
pub struct RelayConfig {
    #[arg(long, env = "MCP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "MCP_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Credential used when a request carries none of its own
    #[arg(long = "default-api-key", env = "SERPER_API_KEY", hide_env_values = true)]
    pub default_api_key: Option<String>,

    #[arg(long, env = "RELAY_ROUTE_MODE", value_enum, default_value_t = RouteMode::Both)]
    pub route_mode: RouteMode,

    #[arg(long, env = "RELAY_MESSAGE_PATH", default_value = DEFAULT_MESSAGE_PATH)]
    pub message_path: String,

    #[arg(long, env = "SERPER_API_URL", default_value = DEFAULT_SEARCH_API_URL)]
    pub search_api_url: String,

    #[arg(long, env = "READER_API_URL", default_value = DEFAULT_FETCH_API_URL)]
    pub fetch_api_url: String,

    #[arg(long, env = "SEARCH_TIMEOUT_SECS", default_value_t = 30)]
    pub search_timeout_secs: u64,

    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 60)]
    pub fetch_timeout_secs: u64,

    /// `*` for any origin, otherwise a comma-separated list
    #[arg(long, env = "RELAY_CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,
}

impl RelayConfig {
    /// Message endpoint path with exactly one leading slash and no trailing one.
    pub fn message_path(&self) -> String {
        normalize_message_path(&self.message_path)
    }

    pub fn default_api_key(&self) -> Option<String> {
        self.default_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(ToOwned::to_owned)
    }

    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig {
            search_api_url: self.search_api_url.clone(),
            fetch_api_url: self.fetch_api_url.clone(),
            search_timeout: Duration::from_secs(self.search_timeout_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }
}

fn normalize_message_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        DEFAULT_MESSAGE_PATH.to_string()
    } else {
        format!("/{trimmed}")
    }
}
