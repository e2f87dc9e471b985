// src/config/app.rs
//! Service settings from `config/app.toml`, with env overrides.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::source::SourceName;

// --- env defaults & names ---
pub const DEFAULT_APP_CONFIG_PATH: &str = "config/app.toml";

pub const ENV_APP_CONFIG_PATH: &str = "IDEA_PULSE_CONFIG_PATH";
pub const ENV_CACHE_TTL_MINUTES: &str = "IDEA_PULSE_CACHE_TTL_MINUTES";
pub const ENV_MAX_RETRIES: &str = "IDEA_PULSE_MAX_RETRIES";
pub const ENV_FETCHER_MODE: &str = "IDEA_PULSE_FETCHER_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherMode {
    /// Call the configured serverless endpoints.
    Http,
    /// Seeded synthetic data, for local runs without API keys.
    #[default]
    Demo,
}

impl FetcherMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "demo" => Some(Self::Demo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub ttl_minutes: u64,
    /// Directory of the durable per-user store; unset keeps caching in memory only.
    pub store_dir: Option<PathBuf>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_minutes: 30,
            store_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub base_delay_ms: u64,
    pub max_retries: u32,
    pub attempt_timeout_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_retries: 2,
            attempt_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherSection {
    pub mode: FetcherMode,
    /// Env var holding the bearer token sent to the endpoints.
    pub bearer_env: Option<String>,
    pub timeout_ms: u64,
    /// Source name → endpoint URL. Unknown source names are ignored.
    pub endpoints: HashMap<String, String>,
}

impl Default for FetcherSection {
    fn default() -> Self {
        Self {
            mode: FetcherMode::Demo,
            bearer_env: None,
            timeout_ms: 15_000,
            endpoints: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub enabled: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiSection {
    pub config_path: PathBuf,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(super::ai::DEFAULT_AI_CONFIG_PATH),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheSection,
    pub retry: RetrySection,
    pub fetchers: FetcherSection,
    pub metrics: MetricsSection,
    pub ai: AiSection,
}

impl AppConfig {
    /// Load from `IDEA_PULSE_CONFIG_PATH` (or `config/app.toml`). A missing
    /// file yields defaults; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_APP_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_APP_CONFIG_PATH));

        let mut cfg = match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| {
                anyhow::anyhow!("Failed to parse app config at {}: {}", path.display(), e)
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no app config, using defaults");
                Self::default()
            }
            Err(e) => {
                anyhow::bail!("Failed to read app config at {}: {}", path.display(), e)
            }
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Some(ttl) = parse_env::<u64>(ENV_CACHE_TTL_MINUTES) {
            self.cache.ttl_minutes = ttl;
        }
        if let Some(n) = parse_env::<u32>(ENV_MAX_RETRIES) {
            self.retry.max_retries = n;
        }
        if let Some(mode) = std::env::var(ENV_FETCHER_MODE)
            .ok()
            .and_then(|m| FetcherMode::parse(&m))
        {
            self.fetchers.mode = mode;
        }
        self.sanitize();
    }

    fn sanitize(&mut self) {
        if self.cache.ttl_minutes == 0 {
            self.cache.ttl_minutes = CacheSection::default().ttl_minutes;
        }
        self.retry.max_retries = self.retry.max_retries.min(5);
        if self.retry.attempt_timeout_ms == 0 {
            self.retry.attempt_timeout_ms = RetrySection::default().attempt_timeout_ms;
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_minutes * 60)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .with_max_retries(self.retry.max_retries)
            .with_attempt_timeout(Duration::from_millis(self.retry.attempt_timeout_ms))
    }

    pub fn endpoints(&self) -> HashMap<SourceName, String> {
        self.fetchers
            .endpoints
            .iter()
            .filter_map(|(name, url)| {
                let source = SourceName::parse(name)?;
                let url = url.trim();
                (!url.is_empty()).then(|| (source, url.to_string()))
            })
            .collect()
    }

    pub fn bearer_token(&self) -> Option<String> {
        let var = self.fetchers.bearer_env.as_deref()?;
        std::env::var(var).ok().filter(|t| !t.trim().is_empty())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}
