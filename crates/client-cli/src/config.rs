use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use shared::UserSummary;
use std::path::PathBuf;

pub const DEFAULT_SERVER: &str = "http://localhost:5000";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_MODEL_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub server: Option<String>,
    pub token: Option<String>,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_MODEL_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "medchat", "medchat")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn server(&self) -> String {
        self.remote
            .server
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
    }

    /// Server for this run: the command-line value if given, else the configured one.
    pub fn server_for_run(&self, cli_server: Option<&str>) -> String {
        cli_server.map(str::to_string).unwrap_or_else(|| self.server())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server(), DEFAULT_SERVER);
        assert_eq!(config.model.model, DEFAULT_MODEL);
        assert_eq!(config.model.timeout_secs, 120);
        assert_eq!(config.outbox.max_attempts, 3);
        assert!(config.remote.token.is_none());
    }

    #[test]
    fn test_cli_server_is_not_written_to_config() {
        let mut config = Config::default();
        config.remote.server = Some("http://saved.test:5000".to_string());

        assert_eq!(
            config.server_for_run(Some("http://once.test:5000")),
            "http://once.test:5000"
        );
        assert_eq!(config.server_for_run(None), "http://saved.test:5000");

        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("once.test"));
    }

    #[test]
    fn test_round_trip_keeps_session() {
        let mut config = Config::default();
        config.remote.server = Some("http://example.test:5000".to_string());
        config.remote.token = Some("tok".to_string());
        config.remote.user = Some(UserSummary {
            id: 1,
            email: "a@x.com".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
        });

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server(), "http://example.test:5000");
        assert_eq!(parsed.remote.token.as_deref(), Some("tok"));
        assert_eq!(parsed.remote.user, config.remote.user);
    }
}
