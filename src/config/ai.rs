// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_daily_limit() -> u32 {
    20
}
fn default_max_insights() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// Only "openai" is wired; anything else builds a disabled synthesizer.
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Real API calls per UTC day.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    /// Upper bound on insights one analyze pass may add.
    #[serde(default = "default_max_insights")]
    pub max_insights: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: None,
            daily_limit: default_daily_limit(),
            api_key: String::new(),
            max_insights: default_max_insights(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;

        cfg.provider = cfg.provider.trim().to_lowercase();

        // Resolve api key if "ENV" (only needed when enabled)
        if cfg.enabled && cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        cfg.max_insights = cfg.max_insights.clamp(1, 10);
        Ok(cfg)
    }

    /// Disabled config when the file is absent or unusable; the service still runs.
    pub fn load_or_disabled<P: AsRef<Path>>(path: P) -> Self {
        match Self::load_from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "AI config unavailable, synthesis disabled"
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_tmp(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    #[serial]
    fn env_api_key_is_resolved() {
        env::set_var("OPENAI_API_KEY", "sk-test");
        let f = write_tmp(r#"{"enabled": true, "provider": "OpenAI", "api_key": "ENV"}"#);
        let cfg = AiConfig::load_from_file(f.path()).unwrap();
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.daily_limit, 20);
        env::remove_var("OPENAI_API_KEY");
    }

    #[test]
    #[serial]
    fn missing_env_key_is_an_error() {
        env::remove_var("OPENAI_API_KEY");
        let f = write_tmp(r#"{"enabled": true, "provider": "openai", "api_key": "env"}"#);
        assert!(AiConfig::load_from_file(f.path()).is_err());
        assert!(!AiConfig::load_or_disabled(f.path()).enabled);
    }

    #[test]
    fn missing_file_disables_ai() {
        let cfg = AiConfig::load_or_disabled("does/not/exist.json");
        assert!(!cfg.enabled);
    }
}
