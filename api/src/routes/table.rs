use serde::Serialize;
use serde_json::Value;

use crate::config::RouteMode;

/// Credential requirement declared by a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CredentialPolicy {
    Exempt,
    /// `path_segment` routes also accept the leading path segment as a
    /// candidate, below header and query.
    Required { path_segment: bool },
}

/// Internal handler a route dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Root,
    Healthcheck,
    Version,
    Message,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteDescriptor {
    pub pattern: String,
    pub methods: Vec<&'static str>,
    pub credential: CredentialPolicy,
    pub target: RouteTarget,
}

impl RouteDescriptor {
    fn exempt(pattern: &str, target: RouteTarget) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: vec!["GET"],
            credential: CredentialPolicy::Exempt,
            target,
        }
    }

    fn message(pattern: String, path_segment: bool) -> Self {
        Self {
            pattern,
            methods: vec!["GET", "POST"],
            credential: CredentialPolicy::Required { path_segment },
            target: RouteTarget::Message,
        }
    }
}

/// Static route table, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct RouteTable {
    mode: RouteMode,
    message_path: String,
    routes: Vec<RouteDescriptor>,
}

impl RouteTable {
    pub fn build(mode: RouteMode, message_path: &str) -> Self {
        let mut routes = vec![
            RouteDescriptor::exempt("/", RouteTarget::Root),
            RouteDescriptor::exempt("/healthcheck", RouteTarget::Healthcheck),
            RouteDescriptor::exempt("/version", RouteTarget::Version),
        ];
        if mode.exposes_fixed() {
            routes.push(RouteDescriptor::message(message_path.to_string(), false));
        }
        if mode.exposes_path() {
            routes.push(RouteDescriptor::message(
                format!("/{{credential}}{message_path}"),
                true,
            ));
        }

        Self {
            mode,
            message_path: message_path.to_string(),
            routes,
        }
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn mode(&self) -> RouteMode {
        self.mode
    }

    pub fn message_path(&self) -> &str {
        &self.message_path
    }

    /// Route listing attached to introspection payloads and routing errors.
    pub fn listing(&self) -> Value {
        serde_json::to_value(&self.routes).unwrap_or(Value::Null)
    }

    /// Credential carriers accepted by the message endpoint in this mode.
    pub fn credential_carriers(&self) -> Vec<String> {
        let mut carriers = vec![
            "Authorization: Bearer <key>".to_string(),
            format!("?{}=<key>", serper_relay_core::credential::API_KEY_QUERY_PARAM),
        ];
        if self.mode.exposes_path() {
            carriers.push(format!("/<key>{}", self.message_path));
        }
        carriers
    }
}

/// Leading segment of `path`, the credential candidate of path-segment routes.
pub fn leading_segment(path: &str) -> Option<&str> {
    path.strip_prefix('/')?
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
}
