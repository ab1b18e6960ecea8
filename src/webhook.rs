//! Webhook related structures

use axum::body::Bytes;
use axum::http::HeaderMap;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const GITLAB_TOKEN_HEADER: &str = "X-Gitlab-Token";
pub const GITLAB_EVENT_HEADER: &str = "X-Gitlab-Event";
pub const GITLAB_INSTANCE_HEADER: &str = "X-Gitlab-Instance";

/// Prefix of every environment variable exported to actions
pub const ENV_PREFIX: &str = "YAGWR_";

/// The request attributes a condition can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Path,
    GitlabToken,
    GitlabEvent,
    GitlabHost,
}

impl Property {
    pub const ALL: [Property; 4] = [
        Property::Path,
        Property::GitlabToken,
        Property::GitlabEvent,
        Property::GitlabHost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Property::Path => "path",
            Property::GitlabToken => "gitlab_token",
            Property::GitlabEvent => "gitlab_event",
            Property::GitlabHost => "gitlab_host",
        }
    }
}

impl FromStr for Property {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Property::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownProperty(s.to_string()))
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts extracted from an incoming webhook request.
/// Missing headers are represented by empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFacts {
    path: String,
    gitlab_token: String,
    gitlab_event: String,
    gitlab_host: String,
}

impl RequestFacts {
    /// Builds the facts for a request. Never fails.
    pub fn from_request(path: &str, headers: &HeaderMap) -> Self {
        Self {
            path: path.to_string(),
            gitlab_token: header_value(headers, GITLAB_TOKEN_HEADER),
            gitlab_event: header_value(headers, GITLAB_EVENT_HEADER),
            gitlab_host: instance_hostname(&header_value(headers, GITLAB_INSTANCE_HEADER))
                .to_string(),
        }
    }

    /// Returns a copy with one property replaced
    pub fn with(mut self, property: Property, value: impl Into<String>) -> Self {
        let value = value.into();
        match property {
            Property::Path => self.path = value,
            Property::GitlabToken => self.gitlab_token = value,
            Property::GitlabEvent => self.gitlab_event = value,
            Property::GitlabHost => self.gitlab_host = value,
        }
        self
    }

    pub fn get(&self, property: Property) -> &str {
        match property {
            Property::Path => &self.path,
            Property::GitlabToken => &self.gitlab_token,
            Property::GitlabEvent => &self.gitlab_event,
            Property::GitlabHost => &self.gitlab_host,
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}

/// Reduces an instance URL such as `https://gitlab1.example.com:8443/` to its hostname.
/// A bare hostname is returned unchanged.
pub fn instance_hostname(instance: &str) -> &str {
    let rest = instance.trim();
    let rest = rest.split_once("://").map_or(rest, |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    if let Some(bracketed) = authority.strip_prefix('[') {
        // IPv6 literal
        return bracketed.split(']').next().unwrap_or_default();
    }
    authority.split(':').next().unwrap_or_default()
}

/// Per-request data handed to actions: headers become environment variables,
/// the body is written to stdin.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl DispatchContext {
    pub fn from_request(headers: &HeaderMap, body: Bytes) -> Self {
        let headers = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        Self { headers, body }
    }

    /// Environment exported to actions. When two headers normalize to the same
    /// variable name the later one wins.
    pub fn environment(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .map(|(name, value)| (env_var_name(name), value.clone()))
            .collect()
    }
}

/// `X-Gitlab-Token` becomes `YAGWR_X_GITLAB_TOKEN`
pub fn env_var_name(header: &str) -> String {
    let normalized: String = header
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '-' {
                '_'
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect();
    format!("{ENV_PREFIX}{normalized}")
}
