use serde_json::Value;

use crate::util::{EXIT_CHECK_FAILED, EXIT_OK, client, endpoint, report_error, to_pretty_json};

/// GET `/version` and print the body.
pub async fn run(base_url: &str) -> i32 {
    let url = match endpoint(base_url, "/version", None) {
        Ok(url) => url,
        Err(e) => return report_error("cli_error", &format!("Invalid base URL {base_url}: {e}"), None),
    };

    let response = match client().get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            return report_error(
                "connection_error",
                &e.to_string(),
                Some("Is the relay running? Check RELAY_URL."),
            );
        }
    };

    let status = response.status();
    let body: Value = match response.json().await {
        Ok(body) => body,
        Err(e) => return report_error("invalid_response", &e.to_string(), None),
    };

    if status.is_success() {
        println!("{}", to_pretty_json(&body));
        EXIT_OK
    } else {
        eprintln!("{}", to_pretty_json(&body));
        EXIT_CHECK_FAILED
    }
}
