// config.rs

use dotenv::dotenv;
use std::env;
use thiserror::Error;

pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_UPLOAD_KEY_PREFIX: &str = "chatroom_images";
pub const DEFAULT_PRESENCE_STALE_SECS: u64 = 5 * 60;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error when an environment variable holds an unparseable value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Tunables for the sync engine, loaded from the environment with defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Upper bound for attachment uploads, in bytes
    pub max_attachment_bytes: u64,
    /// Object-storage key prefix for chat attachments
    pub upload_key_prefix: String,
    /// Age after which an `is_online` flag is treated as stale
    pub presence_stale_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            upload_key_prefix: DEFAULT_UPLOAD_KEY_PREFIX.to_string(),
            presence_stale_secs: DEFAULT_PRESENCE_STALE_SECS,
        }
    }
}

impl ChatConfig {
    /// Loads configuration from the environment (a `.env` file is honored).
    /// Missing variables fall back to defaults; malformed values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let mut config = Self::default();
        if let Some(bytes) = parse_var("MAX_ATTACHMENT_BYTES")? {
            config.max_attachment_bytes = bytes;
        }
        if let Ok(prefix) = env::var("UPLOAD_KEY_PREFIX") {
            config.upload_key_prefix = prefix;
        }
        if let Some(secs) = parse_var("PRESENCE_STALE_SECS")? {
            config.presence_stale_secs = secs;
        }
        Ok(config)
    }
}

fn parse_var(name: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_baseline() {
        let config = ChatConfig::default();
        assert_eq!(config.max_attachment_bytes, 5 * 1024 * 1024);
        assert_eq!(config.upload_key_prefix, "chatroom_images");
    }

    #[test]
    fn malformed_env_value_is_an_error() {
        env::set_var("MAX_ATTACHMENT_BYTES", "five megabytes");
        let result = ChatConfig::from_env();
        env::remove_var("MAX_ATTACHMENT_BYTES");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_, _))));
    }
}
