use serde_json::{Value, json};

/// Exit codes: 0 = every check passed, 1 = usage or connection error,
/// 2 = the relay answered but a check failed.
pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_CHECK_FAILED: i32 = 2;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Print a structured error to stderr and return [`EXIT_USAGE`].
pub fn report_error(error: &str, message: &str, docs_hint: Option<&str>) -> i32 {
    let mut err = json!({
        "error": error,
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", to_pretty_json(&err));
    EXIT_USAGE
}

/// `base` + `path` (+ `api_key` query parameter), validated as a URL.
pub fn endpoint(base: &str, path: &str, api_key: Option<&str>) -> Result<url::Url, url::ParseError> {
    let mut url = url::Url::parse(&format!("{}{path}", base.trim_end_matches('/')))?;
    if let Some(key) = api_key {
        url.query_pairs_mut().append_pair("api_key", key);
    }
    Ok(url)
}
