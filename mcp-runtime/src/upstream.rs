//! Single-call adapters for the two upstream APIs behind the tools.
//!
//! Each call carries its own timeout and never retries; failures surface as
//! [`UpstreamError`] and are turned into tool-result text by the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_SEARCH_API_URL: &str = "https://google.serper.dev";
pub const DEFAULT_FETCH_API_URL: &str = "https://r.jina.ai";
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

const SEARCH_TYPES: [&str; 7] = [
    "search", "news", "images", "places", "videos", "shopping", "scholar",
];
const FETCH_USER_AGENT: &str = "Mozilla/5.0";
const ERROR_BODY_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub search_api_url: String,
    pub fetch_api_url: String,
    pub search_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            search_api_url: DEFAULT_SEARCH_API_URL.to_string(),
            fetch_api_url: DEFAULT_FETCH_API_URL.to_string(),
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl UpstreamError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(timeout)
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Arguments of the `search` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchArgs {
    pub q: String,
    #[serde(rename = "type", default = "default_search_type")]
    pub search_type: String,
    #[serde(default = "default_locale")]
    pub gl: String,
    #[serde(default = "default_locale")]
    pub hl: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_num")]
    pub num: u32,
}

fn default_search_type() -> String {
    "search".to_string()
}

fn default_locale() -> String {
    "nl".to_string()
}

fn default_num() -> u32 {
    10
}

impl SearchArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.q.trim().is_empty() {
            return Err("'q' must not be empty".to_string());
        }
        if !SEARCH_TYPES.contains(&self.search_type.as_str()) {
            return Err(format!(
                "'type' must be one of: {}",
                SEARCH_TYPES.join(", ")
            ));
        }
        if !(1..=100).contains(&self.num) {
            return Err("'num' must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SearchPayload<'a> {
    q: &'a str,
    gl: &'a str,
    hl: &'a str,
    num: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl SearchClient {
    pub fn new(http: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub async fn search(&self, api_key: &str, args: &SearchArgs) -> Result<Value, UpstreamError> {
        let payload = SearchPayload {
            q: args.q.trim(),
            gl: &args.gl,
            hl: &args.hl,
            num: args.num,
            location: args.location.as_deref().filter(|l| !l.trim().is_empty()),
        };

        let response = self
            .http
            .post(format!("{}/{}", self.base_url, args.search_type))
            .header("X-API-KEY", api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(e, self.timeout))?;

        let response = ensure_success(response, self.timeout).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout(self.timeout)
                } else {
                    UpstreamError::Decode(e.to_string())
                }
            })
    }
}

#[derive(Debug, Clone)]
pub struct PageReader {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PageReader {
    pub fn new(http: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Fetch the extracted text of `target` through the reader API.
    pub async fn visit(&self, target: &url::Url) -> Result<String, UpstreamError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, target))
            .header(reqwest::header::USER_AGENT, FETCH_USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(e, self.timeout))?;

        let response = ensure_success(response, self.timeout).await?;
        response
            .text()
            .await
            .map_err(|e| UpstreamError::from_reqwest(e, self.timeout))
    }
}

/// Parse and restrict a page URL to http(s).
pub fn parse_page_url(raw: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| format!("invalid url '{raw}': {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(format!("unsupported url scheme '{other}', expected http or https")),
    }
}

async fn ensure_success(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|e| UpstreamError::from_reqwest(e, timeout))?;
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body: body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect(),
    })
}
