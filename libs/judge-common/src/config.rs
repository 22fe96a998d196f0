// Process configuration, read once from the environment at start-up

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_WORKER_ID: &str = "worker-0";
pub const DEFAULT_LANGUAGES_CONFIG: &str = "config/languages.json";
pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 4;
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024;

#[derive(Debug, Error, PartialEq)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub worker_id: String,
    pub languages_config: PathBuf,
    pub max_concurrent_executions: usize,
    pub run_timeout_secs: u64,
    pub max_output_bytes: usize,
    /// `LOG_FORMAT=json` switches the subscriber to JSON lines
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            worker_id: DEFAULT_WORKER_ID.to_string(),
            languages_config: PathBuf::from(DEFAULT_LANGUAGES_CONFIG),
            max_concurrent_executions: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            json_logs: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            port: parse_or(get("PORT"), "PORT", defaults.port)?,
            redis_url: get("REDIS_URL").unwrap_or(defaults.redis_url),
            worker_id: get("WORKER_ID").unwrap_or(defaults.worker_id),
            languages_config: get("LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.languages_config),
            max_concurrent_executions: parse_or(
                get("MAX_CONCURRENT_EXECUTIONS"),
                "MAX_CONCURRENT_EXECUTIONS",
                defaults.max_concurrent_executions,
            )?,
            run_timeout_secs: parse_or(
                get("RUN_TIMEOUT_SECS"),
                "RUN_TIMEOUT_SECS",
                defaults.run_timeout_secs,
            )?,
            max_output_bytes: parse_or(
                get("MAX_OUTPUT_BYTES"),
                "MAX_OUTPUT_BYTES",
                defaults.max_output_bytes,
            )?,
            json_logs: get("LOG_FORMAT")
                .map(|v| v.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json_logs),
        };

        if config.max_concurrent_executions == 0 {
            return Err(ConfigError {
                key: "MAX_CONCURRENT_EXECUTIONS".into(),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if config.run_timeout_secs == 0 {
            return Err(ConfigError {
                key: "RUN_TIMEOUT_SECS".into(),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            key: key.to_string(),
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}
