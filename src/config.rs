//! Process settings, read from the environment (and `.env`)

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::dispatch::{DEFAULT_SHELL, Shell};
use crate::error::ConfigError;
use crate::logging::{DEFAULT_LOG_LEVEL, LogRotation, LogSettings, LogTarget};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:7777";
pub const DEFAULT_RULES_PATH: &str = "yagwr_rules.yaml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_address: SocketAddr,
    pub rules_path: PathBuf,
    pub shell: Shell,
    pub log: LogSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the settings from any variable source; unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let bind_address = var("BIND_ADDRESS", DEFAULT_BIND_ADDRESS);
        let bind_address: SocketAddr =
            bind_address
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidSetting {
                    name: "BIND_ADDRESS",
                    message: format!("'{bind_address}': {e}"),
                })?;
        if bind_address.port() == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "BIND_ADDRESS",
                message: "port must be positive".to_string(),
            });
        }

        let shell = var("ACTION_SHELL", DEFAULT_SHELL);
        let login_shell = parse_flag("ACTION_LOGIN_SHELL", &var("ACTION_LOGIN_SHELL", "false"))?;
        if shell.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "ACTION_SHELL",
                message: "must not be empty".to_string(),
            });
        }

        let log = LogSettings {
            target: var("LOG_FILE", "stderr").parse::<LogTarget>()?,
            level: var("LOG_LEVEL", DEFAULT_LOG_LEVEL).trim().to_ascii_lowercase(),
            rotation: var("LOG_ROTATION", "daily").parse::<LogRotation>()?,
            quiet: parse_flag("LOG_QUIET", &var("LOG_QUIET", "false"))?,
        };

        Ok(Self {
            bind_address,
            rules_path: PathBuf::from(var("RULES_FILE", DEFAULT_RULES_PATH)),
            shell: Shell::new(shell.trim()).with_login(login_shell),
            log,
        })
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidSetting {
            name,
            message: format!("'{other}' is not a boolean"),
        }),
    }
}
