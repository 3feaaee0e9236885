use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kb_chat_core::reconcile::ReconcilePolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_key_env() -> String {
    "KBCHAT_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}

impl BackendConfig {
    /// Bearer token from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcileConfig {
    #[serde(default = "default_prefix_ratio")]
    pub prefix_ratio: f64,
    #[serde(default = "default_prefix_min_chars")]
    pub prefix_min_chars: usize,
}

fn default_prefix_ratio() -> f64 {
    0.8
}
fn default_prefix_min_chars() -> usize {
    400
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            prefix_ratio: default_prefix_ratio(),
            prefix_min_chars: default_prefix_min_chars(),
        }
    }
}

impl ReconcileConfig {
    pub fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            prefix_ratio: self.prefix_ratio,
            prefix_min_chars: self.prefix_min_chars,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Config {
    /// A config usable without a file: local backend, default store path.
    pub fn minimal() -> Self {
        Self {
            backend: BackendConfig {
                base_url: "http://127.0.0.1:9380".to_string(),
                api_key_env: default_api_key_env(),
                timeout_secs: default_timeout_secs(),
                connect_timeout_secs: default_connect_timeout_secs(),
                max_retries: default_max_retries(),
            },
            store: StoreConfig {
                path: PathBuf::from("./data/kbchat.sqlite"),
            },
            reconcile: ReconcileConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate backend
    let url = config.backend.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!(
            "backend.base_url must start with http:// or https:// (got '{}')",
            config.backend.base_url
        );
    }
    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }

    // Validate store
    if config.store.path.as_os_str().is_empty() {
        anyhow::bail!("store.path must not be empty");
    }

    // Validate reconcile
    let ratio = config.reconcile.prefix_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
        anyhow::bail!("reconcile.prefix_ratio must be in (0.0, 1.0]");
    }
    if config.reconcile.prefix_min_chars == 0 {
        anyhow::bail!("reconcile.prefix_min_chars must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[backend]
base_url = "http://localhost:9380"

[store]
path = "./data/kbchat.sqlite"
"#;

    #[test]
    fn defaults_fill_optional_sections() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.backend.api_key_env, "KBCHAT_API_KEY");
        assert_eq!(cfg.backend.max_retries, 3);
        assert_eq!(cfg.reconcile.policy(), ReconcilePolicy::default());
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn rejects_non_http_backend() {
        let bad = MINIMAL.replace("http://localhost:9380", "ftp://x");
        let err = parse_config(&bad).unwrap_err();
        assert!(err.to_string().contains("backend.base_url"));
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let bad = format!("{MINIMAL}\n[reconcile]\nprefix_ratio = 1.5\n");
        assert!(parse_config(&bad).is_err());
    }

    #[test]
    fn minimal_config_is_valid() {
        assert!(validate(&Config::minimal()).is_ok());
    }
}
