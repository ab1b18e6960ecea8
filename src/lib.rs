pub mod condition;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod rules;
pub mod webhook;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use crate::dispatch::Shell;
use crate::rules::RuleSet;

/// State shared by all request handlers. Read-only after startup.
pub struct AppState {
    pub rules: RuleSet,
    pub shell: Shell,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(rules: RuleSet, shell: Shell) -> Self {
        Self {
            rules,
            shell,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
