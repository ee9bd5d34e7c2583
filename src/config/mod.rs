//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::util::rate_limit::SIGNAL_RATE_LIMIT;

/// Where browsers may call us from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

/// Log line encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// `text` or `json`
    pub log_format: LogFormat,
    /// Allowed client origins for CORS (`*` or a comma-separated list)
    pub client_origin: AllowedOrigins,
    /// Directory served under `/stages/:key`
    pub stage_dir: PathBuf,
    /// Signaling messages per second accepted from one socket
    pub signal_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_source<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT; fall back to SERVER_ADDR or default
        let server_addr = match get("PORT") {
            Some(port) => format!("0.0.0.0:{}", port.trim()),
            None => get("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let signal_rate_limit = match get("SIGNAL_RATE_LIMIT") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid("SIGNAL_RATE_LIMIT"))?,
            None => SIGNAL_RATE_LIMIT,
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            client_origin: parse_origins(get("CLIENT_ORIGIN").as_deref().unwrap_or("*")),
            stage_dir: PathBuf::from(get("STAGE_DIR").unwrap_or_else(|| "stages".to_string())),
            signal_rate_limit,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            client_origin: AllowedOrigins::Any,
            stage_dir: PathBuf::from("stages"),
            signal_rate_limit: SIGNAL_RATE_LIMIT,
        }
    }
}

fn parse_origins(raw: &str) -> AllowedOrigins {
    let list: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if list.is_empty() || list.iter().any(|o| o == "*") {
        AllowedOrigins::Any
    } else {
        AllowedOrigins::List(list)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.client_origin, AllowedOrigins::Any);
        assert_eq!(config.stage_dir, PathBuf::from("stages"));
        assert_eq!(config.signal_rate_limit, SIGNAL_RATE_LIMIT);
    }

    #[test]
    fn port_wins_over_server_addr() {
        let config = load(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:7000")]).unwrap();
        assert_eq!(config.server_addr.port(), 9000);

        let config = load(&[("SERVER_ADDR", "127.0.0.1:7000")]).unwrap();
        assert_eq!(config.server_addr.to_string(), "127.0.0.1:7000");
    }

    #[test]
    fn origin_list_is_split_and_trimmed() {
        let config = load(&[("CLIENT_ORIGIN", "https://a.example, https://b.example ,")]).unwrap();
        assert_eq!(
            config.client_origin,
            AllowedOrigins::List(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
        let config = load(&[("CLIENT_ORIGIN", "https://a.example,*")]).unwrap();
        assert_eq!(config.client_origin, AllowedOrigins::Any);
    }

    #[test]
    fn json_logs_on_request() {
        let config = load(&[("LOG_FORMAT", "json")]).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            load(&[("PORT", "not-a-port")]),
            Err(ConfigError::InvalidAddress)
        ));
        assert!(matches!(
            load(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid("LOG_FORMAT"))
        ));
        assert!(matches!(
            load(&[("SIGNAL_RATE_LIMIT", "0")]),
            Err(ConfigError::Invalid("SIGNAL_RATE_LIMIT"))
        ));
    }
}
