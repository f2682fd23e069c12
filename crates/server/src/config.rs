use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted body for report uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Token lifetime; 0 issues tokens without an expiry claim check
    pub token_expiry_hours: u64,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                max_upload_bytes: default_max_upload_bytes(),
            },
            database: DatabaseConfig {
                path: "./data/medchat.db".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: DEFAULT_JWT_SECRET.to_string(),
                token_expiry_hours: 24,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env_overrides()?;

        if config.auth.jwt_secret == DEFAULT_JWT_SECRET {
            tracing::warn!("Using the default JWT secret; set JWT_SECRET in production");
        }
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        // Try to load from environment variable
        if let Ok(path) = std::env::var("MEDCHAT_CONFIG") {
            return Self::load_from_path(&PathBuf::from(path));
        }

        let default_paths = vec![
            PathBuf::from("medchat-server.toml"),
            PathBuf::from("config/medchat-server.toml"),
            PathBuf::from("/etc/medchat/server.toml"),
        ];

        for path in default_paths {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        tracing::warn!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Environment values win over file values.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("MEDCHAT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MEDCHAT_PORT").or_else(|| lookup("PORT")) {
            self.server.port = port
                .parse()
                .with_context(|| format!("invalid port '{}'", port))?;
        }
        if let Some(path) = lookup("MEDCHAT_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(hours) = lookup("MEDCHAT_TOKEN_EXPIRY_HOURS") {
            self.auth.token_expiry_hours = hours
                .parse()
                .with_context(|| format!("invalid token expiry '{}'", hours))?;
        }
        Ok(())
    }
}
