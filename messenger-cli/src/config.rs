//! Load config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration. File: ~/.config/messenger/config.toml or /etc/messenger/config.toml.
/// Env overrides: MESSENGER_SERVICE, MESSENGER_HEARTBEAT_MS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Service to connect to (default amqp://localhost:5672).
    #[serde(default = "default_service")]
    pub service: String,
    /// Client id; empty lets the session pick one.
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Interval between forced transport ticks (default 1000 ms).
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// PEM file of trusted certificates for amqps services.
    #[serde(default)]
    pub trust_certificate: Option<PathBuf>,
}

fn default_service() -> String {
    "amqp://localhost:5672".to_string()
}
fn default_heartbeat_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: default_service(),
            client_id: String::new(),
            username: String::new(),
            password: String::new(),
            heartbeat_ms: default_heartbeat_ms(),
            trust_certificate: None,
        }
    }
}

impl Config {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file(&config_paths()).unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("MESSENGER_SERVICE") {
        if !s.is_empty() {
            c.service = s;
        }
    }
    if let Some(s) = var("MESSENGER_HEARTBEAT_MS") {
        if let Ok(ms) = s.parse::<u64>() {
            c.heartbeat_ms = ms;
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/messenger/config.toml"));
    }
    out.push(PathBuf::from("/etc/messenger/config.toml"));
    out
}

/// First existing file wins, even when it does not parse.
fn load_file(paths: &[PathBuf]) -> Option<Config> {
    let path = paths.iter().find(|p| p.exists())?;
    match read(path) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring config file");
            None
        }
    }
}

fn read(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<Config>(&s)?)
}
