use anyhow::{Context, Result, anyhow, bail};
use axum::http::HeaderValue;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::mail::decoders::DEFAULT_TIME_FORMAT;
use crate::mail::inbox::InboxOptions;

pub const PORT_ENV: &str = "PORT";
/// JSON blob holding the account store connection config, e.g.
/// `{"db_path": "/var/lib/temp_email_backend/accounts.db"}`.
pub const STORE_CONFIG_ENV: &str = "STORE_CONFIG_JSON";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub db_path: Option<String>,
    /// Directory holding `credentials.json` and `token.json`.
    pub secrets_dir: Option<String>,
    pub gmail_api_base: Option<String>,
    pub token_url: Option<String>,
    pub redirect_uri: Option<String>,
    pub max_results: u32,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_secs: u64,
    pub time_format: String,
    pub utc_offset_minutes: Option<i32>,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3001,
            db_path: None,
            secrets_dir: None,
            gmail_api_base: None,
            token_url: None,
            redirect_uri: None,
            max_results: 50,
            max_concurrent_fetches: 10,
            fetch_timeout_secs: 15,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            utc_offset_minutes: None,
            cors_origins: vec![],
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoreConfig {
    db_path: String,
}

impl Config {
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri
            .as_deref()
            .unwrap_or("http://127.0.0.1:8080/callback")
    }

    pub fn inbox_options(&self) -> Result<InboxOptions> {
        let utc_offset = self
            .utc_offset_minutes
            .map(|m| {
                FixedOffset::east_opt(m * 60)
                    .ok_or_else(|| anyhow!("utc_offset_minutes out of range: {m}"))
            })
            .transpose()?;

        Ok(InboxOptions {
            max_results: self.max_results,
            max_concurrent_fetches: self.max_concurrent_fetches,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            time_format: self.time_format.clone(),
            utc_offset,
        })
    }

    /// `cors_origins` as header values; any entry that is not a bare
    /// `http(s)://host[:port]` origin is an error.
    pub fn allowed_origins(&self) -> Result<Vec<HeaderValue>> {
        self.cors_origins.iter().map(|o| parse_origin(o)).collect()
    }

    /// Apply `PORT` and `STORE_CONFIG_JSON` from `env`.
    pub fn apply_env_overrides<F>(mut self, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = env(PORT_ENV) {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("{PORT_ENV} is not a valid port: {port:?}"))?;
        }
        if let Some(raw) = env(STORE_CONFIG_ENV) {
            let store: StoreConfig =
                serde_json::from_str(&raw).with_context(|| format!("parse {STORE_CONFIG_ENV}"))?;
            self.db_path = Some(store.db_path);
        }
        Ok(self)
    }
}

fn parse_origin(raw: &str) -> Result<HeaderValue> {
    let url = Url::parse(raw).with_context(|| format!("cors origin {raw:?} is not a URL"))?;
    let bare = matches!(url.scheme(), "http" | "https")
        && url.host_str().is_some()
        && url.username().is_empty()
        && url.password().is_none()
        && url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none();
    if !bare {
        bail!("cors origin {raw:?} must look like https://host[:port]");
    }
    HeaderValue::from_str(&url.origin().ascii_serialization())
        .with_context(|| format!("cors origin {raw:?}"))
}

/// Environment lookup used outside tests.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("temp_email_backend"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn default_db_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("accounts.db");
    Ok(p)
}

/// Load `path` (or the default config file) and apply environment overrides.
///
/// A missing default file means built-in defaults; a missing explicit path is
/// an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let cfg = match path {
        Some(p) => parse_file(p)?,
        None => {
            let p = config_path()?;
            if p.exists() {
                parse_file(&p)?
            } else {
                log::info!("No config file at {}, using defaults", p.display());
                Config::default()
            }
        }
    };
    cfg.apply_env_overrides(process_env)
}

fn parse_file(path: &Path) -> Result<Config> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    log::info!("Loaded config from {}", path.display());
    Ok(cfg)
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    if let Some(p) = &cfg.db_path {
        Ok(PathBuf::from(p))
    } else {
        default_db_path()
    }
}

pub fn resolve_secrets_dir(cfg: &Config) -> PathBuf {
    cfg.secrets_dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
