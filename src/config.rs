use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::error::Error;
use crate::http_client::HttpClient;
use crate::proxy_pool::ProxyPool;

/// Convert an underscore-separated option name into canonical HTTP header
/// casing: `x_forwarded_for` becomes `X-Forwarded-For`.
pub fn canonical_header_name(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Default headers carried on every request unless overridden per call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderOverrides {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub x_forwarded_for: Option<String>,
    #[serde(default)]
    pub x_requested_with: Option<String>,
    #[serde(default)]
    pub accept: Option<String>,
    #[serde(default)]
    pub accept_language: Option<String>,
    #[serde(default)]
    pub accept_encoding: Option<String>,
    #[serde(default)]
    pub accept_charset: Option<String>,
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
}

impl HeaderOverrides {
    fn entries(&self) -> [(&'static str, &Option<String>); 10] {
        [
            ("user_agent", &self.user_agent),
            ("referer", &self.referer),
            ("x_forwarded_for", &self.x_forwarded_for),
            ("x_requested_with", &self.x_requested_with),
            ("accept", &self.accept),
            ("accept_language", &self.accept_language),
            ("accept_encoding", &self.accept_encoding),
            ("accept_charset", &self.accept_charset),
            ("connection", &self.connection),
            ("cookie", &self.cookie),
        ]
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, Error> {
        let mut map = HeaderMap::new();
        for (key, value) in self.entries() {
            if let Some(value) = value {
                let name = HeaderName::from_bytes(canonical_header_name(key).as_bytes())
                    .map_err(|e| Error::InvalidHeader(format!("{key}: {e}")))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::InvalidHeader(format!("{key}: {e}")))?;
                map.insert(name, value);
            }
        }
        Ok(map)
    }
}

/// Client behavior knobs. Every recognized option is enumerated here with
/// its default; unknown keys in a config file are rejected at load time.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Retry ceiling per logical request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Prefix for relative request URLs.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Proxy used when rotation is off or the pool is empty. None = direct.
    #[serde(default)]
    pub default_proxy: Option<String>,

    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fixed pause before retrying a transient server error.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// 5xx statuses returned to the caller instead of retried.
    #[serde(default)]
    pub ignore_codes: Vec<u16>,

    /// Explicit user agent; when unset one is drawn from the built-in pool.
    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub headers: HeaderOverrides,
}

fn default_max_retries() -> u32 {
    6
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retry_backoff_ms() -> u64 {
    200
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            max_retries: default_max_retries(),
            base_url: None,
            default_proxy: None,
            timeout_secs: default_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            ignore_codes: Vec::new(),
            user_agent: None,
            headers: HeaderOverrides::default(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Proxy pool validation knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// IP-echo endpoint requested through each candidate proxy.
    #[serde(default = "default_check_url")]
    pub check_url: String,

    /// Liveness probe timeout in seconds.
    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,

    /// In-flight bound for batch validation.
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
}

fn default_check_url() -> String {
    "https://api.ipify.org".to_string()
}
fn default_check_timeout_secs() -> u64 {
    5
}
fn default_max_concurrent_checks() -> usize {
    8
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            check_url: default_check_url(),
            check_timeout_secs: default_check_timeout_secs(),
            max_concurrent_checks: default_max_concurrent_checks(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    /// Proxy URLs seeded into the pool unchecked; use
    /// `ProxyPool::checkadd_all` for validated seeding.
    #[serde(default)]
    pub proxies: Vec<String>,
}

impl Config {
    pub fn load() -> Self {
        let path = Path::new("config.toml");
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                if let Ok(cfg) = Config::from_toml(&content) {
                    return cfg;
                }
            }
        }
        Self::default()
    }

    pub fn from_toml(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Build a client with a pool seeded from the configured proxy list.
    pub fn build_client(&self) -> Result<HttpClient, Error> {
        let mut pool = ProxyPool::with_config(&self.pool);
        for url in &self.proxies {
            pool.add_url(url)?;
        }
        Ok(HttpClient::with_config(self.client.clone())?.with_pool(pool))
    }
}
