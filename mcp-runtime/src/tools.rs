use serde_json::{Map, Value, json};

use crate::context::RequestContext;
use crate::upstream::{PageReader, SearchArgs, SearchClient, UpstreamConfig, parse_page_url};

const SEARCH_TOOL: &str = "search";
const VISIT_PAGE_TOOL: &str = "visit_page";

/// Text result of one tool invocation; `is_error` maps to the MCP `isError` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    fn error(text: String) -> Self {
        Self {
            text,
            is_error: true,
        }
    }
}

pub struct Tools {
    search: SearchClient,
    reader: PageReader,
}

impl Tools {
    pub fn new(http: reqwest::Client, config: &UpstreamConfig) -> Self {
        Self {
            search: SearchClient::new(http.clone(), &config.search_api_url, config.search_timeout),
            reader: PageReader::new(http, &config.fetch_api_url, config.fetch_timeout),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        matches!(name, SEARCH_TOOL | VISIT_PAGE_TOOL)
    }

    pub fn definitions(&self) -> Vec<Value> {
        vec![
            json!({
                "name": SEARCH_TOOL,
                "description": "Search Google through Serper. Returns the raw JSON result set for the chosen result type.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "q": { "type": "string", "description": "Search query" },
                        "type": {
                            "type": "string",
                            "enum": ["search", "news", "images", "places", "videos", "shopping", "scholar"],
                            "default": "search"
                        },
                        "gl": { "type": "string", "description": "Country code", "default": "nl" },
                        "hl": { "type": "string", "description": "Interface language", "default": "nl" },
                        "location": { "type": "string", "description": "Free-form location, e.g. 'Amsterdam, Netherlands'" },
                        "num": { "type": "integer", "minimum": 1, "maximum": 100, "default": 10 }
                    },
                    "required": ["q"]
                }
            }),
            json!({
                "name": VISIT_PAGE_TOOL,
                "description": "Fetch a web page and return its readable text content.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "Absolute http(s) URL" }
                    },
                    "required": ["url"]
                }
            }),
        ]
    }

    pub async fn call(&self, ctx: &RequestContext, name: &str, args: Map<String, Value>) -> ToolOutcome {
        match name {
            SEARCH_TOOL => self.call_search(ctx, args).await,
            VISIT_PAGE_TOOL => self.call_visit_page(ctx, args).await,
            other => ToolOutcome::error(format!("Error: unknown tool '{other}'")),
        }
    }

    async fn call_search(&self, ctx: &RequestContext, args: Map<String, Value>) -> ToolOutcome {
        let args: SearchArgs = match serde_json::from_value(Value::Object(args)) {
            Ok(args) => args,
            Err(e) => return ToolOutcome::error(format!("Invalid arguments for search: {e}")),
        };
        if let Err(reason) = args.validate() {
            return ToolOutcome::error(format!("Invalid arguments for search: {reason}"));
        }

        let Some(credential) = ctx.credential() else {
            return ToolOutcome::error("Error: No API key available".to_string());
        };

        match self.search.search(credential.value(), &args).await {
            Ok(result) => match serde_json::to_string_pretty(&result) {
                Ok(text) => ToolOutcome::ok(text),
                Err(e) => ToolOutcome::error(format!("Error connecting to search API: {e}")),
            },
            Err(err) => {
                tracing::warn!(
                    event = "upstream_error",
                    request_id = %ctx.request_id,
                    tool = SEARCH_TOOL,
                    error = %err,
                    "Search API call failed"
                );
                ToolOutcome::error(format!("Error connecting to search API: {err}"))
            }
        }
    }

    async fn call_visit_page(&self, ctx: &RequestContext, args: Map<String, Value>) -> ToolOutcome {
        let Some(raw) = args.get("url").and_then(Value::as_str) else {
            return ToolOutcome::error(
                "Invalid arguments for visit_page: 'url' must be a string".to_string(),
            );
        };
        let target = match parse_page_url(raw) {
            Ok(target) => target,
            Err(reason) => return ToolOutcome::error(format!("Error visiting page: {reason}")),
        };

        match self.reader.visit(&target).await {
            Ok(text) => ToolOutcome::ok(text),
            Err(err) => {
                tracing::warn!(
                    event = "upstream_error",
                    request_id = %ctx.request_id,
                    tool = VISIT_PAGE_TOOL,
                    error = %err,
                    "Reader API call failed"
                );
                ToolOutcome::error(format!("Error visiting page: {err}"))
            }
        }
    }
}
