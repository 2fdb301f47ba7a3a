use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use client_core::{RetryPolicy, SyncOptions, DEFAULT_GROUPS_URL, SELECTION_DEBOUNCE};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "viewer.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub groups_url: String,
    pub database_url: String,
    pub selection_debounce_ms: u64,
    pub request_timeout_secs: u64,
    pub retry_backoff_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            groups_url: DEFAULT_GROUPS_URL.into(),
            database_url: "sqlite://./data/viewer.db".into(),
            selection_debounce_ms: SELECTION_DEBOUNCE.as_millis() as u64,
            request_timeout_secs: 15,
            retry_backoff_ms: 0,
        }
    }
}

impl Settings {
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            selection_debounce: Duration::from_millis(self.selection_debounce_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(self.retry_backoff_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    groups_url: Option<String>,
    database_url: Option<String>,
    selection_debounce_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    retry_backoff_ms: Option<u64>,
}

/// Defaults, then the config file (if present), then environment overrides.
pub fn load_settings(config_path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    if let Ok(raw) = fs::read_to_string(path) {
        if let Err(err) = apply_file(&mut settings, &raw) {
            warn!(path = %path.display(), error = %err, "config: ignoring malformed file");
        }
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw).context("invalid viewer config")?;
    if let Some(v) = file.groups_url {
        settings.groups_url = v;
    }
    if let Some(v) = file.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file.selection_debounce_ms {
        settings.selection_debounce_ms = v;
    }
    if let Some(v) = file.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file.retry_backoff_ms {
        settings.retry_backoff_ms = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("GROUPS_URL") {
        settings.groups_url = v;
    }
    if let Some(v) = lookup("APP__GROUPS_URL") {
        settings.groups_url = v;
    }

    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(parsed) = lookup("APP__DEBOUNCE_MS").and_then(|v| v.parse().ok()) {
        settings.selection_debounce_ms = parsed;
    }
    if let Some(parsed) = lookup("APP__REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.request_timeout_secs = parsed;
    }
    if let Some(parsed) = lookup("APP__RETRY_BACKOFF_MS").and_then(|v| v.parse().ok()) {
        settings.retry_backoff_ms = parsed;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
