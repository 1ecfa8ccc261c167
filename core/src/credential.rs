use std::fmt;

use serde::Serialize;

/// Query parameter that carries the upstream API key directly.
pub const API_KEY_QUERY_PARAM: &str = "api_key";

const BEARER_PREFIX: &str = "Bearer ";
const MASK_VISIBLE_CHARS: usize = 4;

/// Where a resolved credential came from, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialSource {
    Header,
    Query,
    PathSegment,
    EnvironmentDefault,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialSource::Header => "header",
            CredentialSource::Query => "query",
            CredentialSource::PathSegment => "path-segment",
            CredentialSource::EnvironmentDefault => "environment-default",
        }
    }
}

/// A non-empty credential resolved for exactly one request.
///
/// `Debug` never prints the value; use [`ResolvedCredential::masked`] in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    value: String,
    source: CredentialSource,
}

impl ResolvedCredential {
    /// Returns `None` when `value` is empty after trimming.
    pub fn new(value: &str, source: CredentialSource) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            value: trimmed.to_string(),
            source,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// First few characters followed by an ellipsis, for log lines.
    pub fn masked(&self) -> String {
        let visible: String = self.value.chars().take(MASK_VISIBLE_CHARS).collect();
        if self.value.chars().count() <= MASK_VISIBLE_CHARS {
            "…".to_string()
        } else {
            format!("{visible}…")
        }
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("value", &self.masked())
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedCredential),
    Missing,
}

impl Resolution {
    pub fn into_credential(self) -> Option<ResolvedCredential> {
        match self {
            Resolution::Resolved(credential) => Some(credential),
            Resolution::Missing => None,
        }
    }

    pub fn source_label(&self) -> &'static str {
        match self {
            Resolution::Resolved(credential) => credential.source().as_str(),
            Resolution::Missing => "none",
        }
    }
}

/// Raw values observed at each credential carrier of one request.
///
/// `authorization` is the full header value; the bearer token is extracted
/// during resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialCandidates<'a> {
    pub authorization: Option<&'a str>,
    pub query: Option<&'a str>,
    pub path_segment: Option<&'a str>,
    pub default: Option<&'a str>,
}

/// Apply the fixed precedence: bearer header, query parameter, path segment,
/// configured default. Empty values at any source fall through.
pub fn resolve(candidates: CredentialCandidates<'_>) -> Resolution {
    let ordered = [
        (
            candidates.authorization.and_then(bearer_token),
            CredentialSource::Header,
        ),
        (candidates.query, CredentialSource::Query),
        (candidates.path_segment, CredentialSource::PathSegment),
        (candidates.default, CredentialSource::EnvironmentDefault),
    ];

    ordered
        .into_iter()
        .find_map(|(value, source)| value.and_then(|v| ResolvedCredential::new(v, source)))
        .map_or(Resolution::Missing, Resolution::Resolved)
}

/// Token of an `Authorization: Bearer <token>` value. Any other scheme is
/// ignored rather than rejected.
pub fn bearer_token(raw: &str) -> Option<&str> {
    let token = raw.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() { None } else { Some(token) }
}
