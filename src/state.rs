use crate::conversation::conversation_service::ConversationService;
use crate::websocket::ConnectionManager;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ws_connections: ConnectionManager,
    pub conversation_service: ConversationService,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} is not valid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub conversation_cache_ttl_secs: u64,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));
        let or_default =
            |name: &'static str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let port_raw = or_default("PORT", "3000");
        let port: u16 = port_raw
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name: "PORT", value: port_raw })?;

        let ttl_raw = or_default("CONVERSATION_CACHE_TTL_SECS", "60");
        let conversation_cache_ttl_secs: u64 = ttl_raw.parse().map_err(|_| ConfigError::InvalidNumber {
            name: "CONVERSATION_CACHE_TTL_SECS",
            value: ttl_raw,
        })?;

        let cors_origins = or_default("CORS_ORIGINS", "http://localhost:5173,http://localhost:3000")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: or_default("REDIS_URL", "redis://127.0.0.1:6379"),
            jwt_secret: required("JWT_SECRET")?,
            host: or_default("HOST", "127.0.0.1"),
            port,
            conversation_cache_ttl_secs,
            cors_origins,
        })
    }
}
