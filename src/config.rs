// src/config.rs
use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Keep state in memory only; nothing is written to `data_dir`.
    pub ephemeral: bool,
    pub request_timeout: Duration,
    pub log_capacity: usize,
    /// When set, every route but `/health` requires a matching `x-api-key`.
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_dir: PathBuf::from("data"),
            ephemeral: false,
            request_timeout: Duration::from_secs(30),
            log_capacity: 500,
            api_key: None,
        }
    }
}

fn parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(None),
    }
}

impl Config {
    /// Reads `CHATBOT_*` variables, after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            bind_addr: parse("CHATBOT_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            data_dir: parse("CHATBOT_DATA_DIR")?.unwrap_or(defaults.data_dir),
            ephemeral: parse("CHATBOT_EPHEMERAL")?.unwrap_or(defaults.ephemeral),
            request_timeout: parse("CHATBOT_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            log_capacity: parse("CHATBOT_LOG_CAPACITY")?.unwrap_or(defaults.log_capacity),
            api_key: parse("CHATBOT_API_KEY")?,
        })
    }
}
