//! Configuration loading with env-var overrides.
//!
//! Reads the optional `config/default.toml` relative to the current working
//! directory, then applies environment overrides. Secrets (`BOT_TOKEN`,
//! `WEBHOOK_SECRET`) are only ever read from the environment.

use std::{
    collections::HashMap,
    env, fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::Url;
use serde::Deserialize;

use crate::error::AppError;
use crate::subsystems::comms::webhook::WEBHOOK_PATH;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
pub const ENV_BOT_MODE: &str = "BOT_MODE";
pub const ENV_WEBHOOK_URL: &str = "WEBHOOK_URL";
pub const ENV_WEBHOOK_PORT: &str = "WEBHOOK_PORT";
pub const ENV_WEBHOOK_SECRET: &str = "WEBHOOK_SECRET";
pub const ENV_LOG_LEVEL: &str = "SCOREBOT_LOG_LEVEL";

/// Webhook (push) delivery settings.
#[derive(Clone)]
pub struct WebhookConfig {
    /// Publicly reachable URL the platform pushes updates to.
    pub url: Url,
    /// Local port the HTTP listener binds on all interfaces.
    pub port: u16,
    /// Optional secret the platform echoes back on every push.
    pub secret: Option<String>,
}

/// How inbound events reach the bot.
#[derive(Clone)]
pub enum DeliveryMode {
    /// Client-initiated long polling.
    Polling,
    /// Platform-initiated HTTP pushes.
    Webhook(WebhookConfig),
}

impl DeliveryMode {
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryMode::Polling => "polling",
            DeliveryMode::Webhook(_) => "webhook",
        }
    }
}

/// Fully-resolved service configuration.
#[derive(Clone)]
pub struct Config {
    /// SQLite database file (already expanded, no `~`, no `sqlite://`).
    pub database_path: PathBuf,
    /// Bot-platform token. Never sourced from TOML.
    pub bot_token: String,
    pub mode: DeliveryMode,
    pub log_level: String,
    /// `true` when the level came from the environment and should beat `RUST_LOG`.
    pub log_level_forced: bool,
    /// Server-side wait for each long-poll request, in seconds.
    pub poll_timeout_secs: u32,
    /// Upper bound on draining in-flight work at shutdown.
    pub shutdown_grace: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("bot_token", &"<redacted>")
            .field("mode", &self.mode.name())
            .field("log_level", &self.log_level)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

/// Raw TOML shape: `serde` target before resolution.
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    supervisor: RawSupervisor,
    #[serde(default)]
    bot: RawBot,
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    webhook: RawWebhook,
}

#[derive(Deserialize)]
struct RawSupervisor {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_shutdown_grace_secs")]
    shutdown_grace_secs: u64,
}

#[derive(Deserialize)]
struct RawBot {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default = "default_poll_timeout_secs")]
    poll_timeout_secs: u32,
}

#[derive(Deserialize, Default)]
struct RawStore {
    #[serde(default)]
    database_url: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawWebhook {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

impl Default for RawSupervisor {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for RawBot {
    fn default() -> Self {
        Self { mode: None, poll_timeout_secs: default_poll_timeout_secs() }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_shutdown_grace_secs() -> u64 { 5 }
fn default_poll_timeout_secs() -> u32 { 60 }

/// Load config from `config/default.toml` (if present), then apply the
/// process environment.
pub fn load() -> Result<Config, AppError> {
    let env: HashMap<String, String> = env::vars().collect();
    load_from(Path::new("config/default.toml"), &env)
}

/// Internal loader: accepts an explicit path and environment map.
/// Tests pass the environment directly instead of mutating process env vars.
pub fn load_from(path: &Path, env: &HashMap<String, String>) -> Result<Config, AppError> {
    let parsed: RawConfig = if path.exists() {
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?
    } else {
        RawConfig::default()
    };

    let database_url = lookup(env, ENV_DATABASE_URL)
        .map(str::to_string)
        .or(parsed.store.database_url)
        .ok_or_else(|| missing(ENV_DATABASE_URL))?;
    let database_path = database_path_from_url(&database_url)?;

    let bot_token = lookup(env, ENV_BOT_TOKEN)
        .map(str::to_string)
        .ok_or_else(|| missing(ENV_BOT_TOKEN))?;

    let mode_name = lookup(env, ENV_BOT_MODE)
        .map(str::to_string)
        .or(parsed.bot.mode)
        .ok_or_else(|| missing(ENV_BOT_MODE))?;

    let mode = match mode_name.as_str() {
        "polling" => DeliveryMode::Polling,
        "webhook" => {
            let url_str = lookup(env, ENV_WEBHOOK_URL)
                .map(str::to_string)
                .or(parsed.webhook.url)
                .ok_or_else(|| missing(ENV_WEBHOOK_URL))?;
            let url = Url::parse(&url_str)
                .map_err(|e| AppError::Config(format!("invalid {ENV_WEBHOOK_URL} '{url_str}': {e}")))?;
            if url.path() != WEBHOOK_PATH {
                return Err(AppError::Config(format!(
                    "{ENV_WEBHOOK_URL} path must be '{WEBHOOK_PATH}', got '{}'",
                    url.path()
                )));
            }
            let port = match lookup(env, ENV_WEBHOOK_PORT) {
                Some(p) => p
                    .parse::<u16>()
                    .map_err(|e| AppError::Config(format!("invalid {ENV_WEBHOOK_PORT} '{p}': {e}")))?,
                None => parsed.webhook.port.ok_or_else(|| missing(ENV_WEBHOOK_PORT))?,
            };
            DeliveryMode::Webhook(WebhookConfig {
                url,
                port,
                secret: lookup(env, ENV_WEBHOOK_SECRET).map(str::to_string),
            })
        }
        other => {
            return Err(AppError::Config(format!(
                "unknown {ENV_BOT_MODE} '{other}' (expected 'polling' or 'webhook')"
            )));
        }
    };

    if parsed.bot.poll_timeout_secs == 0 {
        return Err(AppError::Config("bot.poll_timeout_secs must be positive".into()));
    }

    let log_level_env = lookup(env, ENV_LOG_LEVEL).map(str::to_string);
    let log_level_forced = log_level_env.is_some();

    Ok(Config {
        database_path,
        bot_token,
        mode,
        log_level: log_level_env.unwrap_or(parsed.supervisor.log_level),
        log_level_forced,
        poll_timeout_secs: parsed.bot.poll_timeout_secs,
        shutdown_grace: Duration::from_secs(parsed.supervisor.shutdown_grace_secs),
    })
}

/// Environment value for `key`, treating blank values as unset.
fn lookup<'a>(env: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn missing(key: &str) -> AppError {
    AppError::Config(format!("env {key} is required"))
}

/// Turn a `DATABASE_URL` value into a filesystem path.
///
/// Accepts `sqlite://path`, `sqlite:path` or a bare path.
pub fn database_path_from_url(url: &str) -> Result<PathBuf, AppError> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    if path.is_empty() {
        return Err(AppError::Config(format!("{ENV_DATABASE_URL} has no path: '{url}'")));
    }
    Ok(expand_home(path))
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
