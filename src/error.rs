use std::io;
use std::path::PathBuf;

/// Errors raised while loading settings or the rule set. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown property '{0}' (expected path, gitlab_token, gitlab_event or gitlab_host)")]
    UnknownProperty(String),

    #[error("unknown operator in '{0}' (expected =, !=, ~= or !~=)")]
    UnknownOperator(String),

    #[error("invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid condition: {0}")]
    InvalidExpression(String),

    #[error("action must not be empty")]
    EmptyAction,

    #[error("rule set is empty, at least one rule is required")]
    EmptyRuleSet,

    #[error("rule {index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create log directory '{}': {source}", .path.display())]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid value for {name}: {message}")]
    InvalidSetting { name: &'static str, message: String },
}

impl ConfigError {
    /// Attaches the 1-based position of the offending rule.
    pub fn in_rule(self, index: usize) -> Self {
        ConfigError::Rule {
            index,
            source: Box::new(self),
        }
    }
}

/// Failure to run an action. Reported per action and never propagated further.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to launch action '{action}': {source}")]
    Spawn {
        action: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for action to finish: {0}")]
    Wait(#[source] io::Error),
}

/// Custom error type for yagwr operations
#[derive(Debug, thiserror::Error)]
pub enum YagwrError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Helper type for Results that use YagwrError
pub type Result<T> = std::result::Result<T, YagwrError>;
