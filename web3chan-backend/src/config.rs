use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RPC_ADDRESS: &str = "127.0.0.1:18166";
pub const DEFAULT_DATABASE_URL: &str = "./.db/web3chan.db";
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be a boolean, got '{value}'")]
    InvalidBool { key: String, value: String },

    #[error("{key} must be a number of seconds, got '{value}'")]
    InvalidSeconds { key: String, value: String },

    #[error("{key} must be a positive number, got '{value}'")]
    InvalidCapacity { key: String, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone)]
pub struct Config {
    /// Client name sent when registering the application on an instance
    pub app_name: String,
    pub database_url: String,
    pub rpc_address: String,
    /// Flags applied to boards created by `add_board`
    pub default_autofollow: bool,
    pub default_replies: bool,
    pub default_streaming: bool,
    pub fetcher_cooldown: Duration,
    /// Poll interval once a push stream is delivering notifications
    pub fetcher_cooldown_with_streaming: Duration,
    pub relationships_cooldown: Duration,
    /// Capacity of each worker's notification and dismissal queues
    pub queue_capacity: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let flag = |key: &str, default: bool| -> ConfigResult<bool> {
            match lookup(key) {
                Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::InvalidBool {
                    key: key.to_string(),
                    value,
                }),
                None => Ok(default),
            }
        };

        let seconds = |key: &str, default: u64| -> ConfigResult<Duration> {
            match lookup(key) {
                Some(value) => match value.trim().parse::<u64>() {
                    Ok(secs) => Ok(Duration::from_secs(secs)),
                    Err(_) => Err(ConfigError::InvalidSeconds {
                        key: key.to_string(),
                        value,
                    }),
                },
                None => Ok(Duration::from_secs(default)),
            }
        };

        let queue_capacity = match lookup("WEB3CHAN_QUEUE_CAPACITY") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    return Err(ConfigError::InvalidCapacity {
                        key: "WEB3CHAN_QUEUE_CAPACITY".to_string(),
                        value,
                    });
                }
            },
            None => DEFAULT_QUEUE_CAPACITY,
        };

        Ok(Self {
            app_name: string("WEB3CHAN_APP_NAME", "web3chan"),
            database_url: string("WEB3CHAN_DATABASE", DEFAULT_DATABASE_URL),
            rpc_address: string("WEB3CHAN_RPC_ADDRESS", DEFAULT_RPC_ADDRESS),
            default_autofollow: flag("WEB3CHAN_AUTOFOLLOW", true)?,
            default_replies: flag("WEB3CHAN_REPLIES", true)?,
            default_streaming: flag("WEB3CHAN_STREAMING", false)?,
            fetcher_cooldown: seconds("FETCHER_COOLDOWN", 120)?,
            fetcher_cooldown_with_streaming: seconds("FETCHER_COOLDOWN_WITH_STREAMING", 300)?,
            relationships_cooldown: seconds("RELATIONSHIPS_SYNCER_COOLDOWN", 1800)?,
            queue_capacity,
            log_level: string("WEB3CHAN_LOGLEVEL", "DEBUG"),
        })
    }

    /// Map the configured level name onto a log filter.
    /// Unknown names fall back to `info`.
    pub fn log_filter(&self) -> log::LevelFilter {
        match self.log_level.to_uppercase().as_str() {
            "DEBUG" => log::LevelFilter::Debug,
            "INFO" => log::LevelFilter::Info,
            "WARNING" | "WARN" => log::LevelFilter::Warn,
            "ERROR" | "CRITICAL" => log::LevelFilter::Error,
            "TRACE" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "web3chan".to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            rpc_address: DEFAULT_RPC_ADDRESS.to_string(),
            default_autofollow: true,
            default_replies: true,
            default_streaming: false,
            fetcher_cooldown: Duration::from_secs(120),
            fetcher_cooldown_with_streaming: Duration::from_secs(300),
            relationships_cooldown: Duration::from_secs(1800),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            log_level: "DEBUG".to_string(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ConfigResult<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.app_name, "web3chan");
        assert_eq!(config.rpc_address, "127.0.0.1:18166");
        assert!(config.default_autofollow);
        assert!(config.default_replies);
        assert!(!config.default_streaming);
        assert_eq!(config.fetcher_cooldown, Duration::from_secs(120));
        assert_eq!(config.fetcher_cooldown_with_streaming, Duration::from_secs(300));
        assert_eq!(config.relationships_cooldown, Duration::from_secs(1800));
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("WEB3CHAN_STREAMING", "True"),
            ("WEB3CHAN_AUTOFOLLOW", "False"),
            ("FETCHER_COOLDOWN", "30"),
            ("WEB3CHAN_RPC_ADDRESS", "0.0.0.0:9000"),
            ("WEB3CHAN_QUEUE_CAPACITY", "8"),
        ])
        .unwrap();
        assert!(config.default_streaming);
        assert!(!config.default_autofollow);
        assert_eq!(config.fetcher_cooldown, Duration::from_secs(30));
        assert_eq!(config.rpc_address, "0.0.0.0:9000");
        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert_eq!(
            config_from(&[("FETCHER_COOLDOWN", "soon")]).unwrap_err(),
            ConfigError::InvalidSeconds {
                key: "FETCHER_COOLDOWN".to_string(),
                value: "soon".to_string(),
            }
        );
        assert!(matches!(
            config_from(&[("WEB3CHAN_REPLIES", "maybe")]),
            Err(ConfigError::InvalidBool { .. })
        ));

        let err = config_from(&[("WEB3CHAN_QUEUE_CAPACITY", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCapacity { .. }));
        assert_eq!(err.to_string(), "WEB3CHAN_QUEUE_CAPACITY must be a positive number, got '0'");
    }

    #[test]
    fn test_log_filter() {
        let mut config = Config::default();
        config.log_level = "WARNING".to_string();
        assert_eq!(config.log_filter(), log::LevelFilter::Warn);
        config.log_level = "CRITICAL".to_string();
        assert_eq!(config.log_filter(), log::LevelFilter::Error);
        config.log_level = "debug".to_string();
        assert_eq!(config.log_filter(), log::LevelFilter::Debug);
    }
}
