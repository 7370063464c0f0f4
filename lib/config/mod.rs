use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

use crate::pool;

fn default_port() -> u16 {
    12345
}

fn default_thread_pool_size() -> usize {
    4
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("value \"{value}\" for key {key} is not valid")]
    InvalidValue { key: String, value: String },
}

/// Matches the `DEBUG|INFO|WARN|ERROR|NONE` sink levels from spec.md §1 —
/// logging itself is a sink the core only configures, never re-specifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    None,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "NONE" => Ok(LogLevel::None),
            _ => Err(()),
        }
    }
}

/// The server configuration inputs consumed by the core (spec.md §6).
/// Startup glue — CLI parsing, config-file discovery, signal wiring — is
/// out of scope; this struct is just the resulting values.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub thread_pool_size: usize,
    pub tariff_file_path: Option<String>,
    pub server_data_root_dir: String,
    pub log_level: LogLevel,
    pub log_file_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            thread_pool_size: default_thread_pool_size(),
            tariff_file_path: None,
            server_data_root_dir: String::new(),
            log_level: LogLevel::default(),
            log_file_path: Some("server.log".to_string()),
        }
    }
}

pub static CONFIG: LazyLock<Arc<RwLock<Config>>> = LazyLock::new(|| Arc::new(RwLock::new(Config::default())));

impl Config {
    fn apply_line(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let bad = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key.to_ascii_uppercase().as_str() {
            "PORT" => {
                let port: u16 = value.parse().map_err(|_| bad())?;
                if port == 0 {
                    return Err(bad());
                }
                self.port = port;
            }
            "THREAD_POOL_SIZE" => {
                let size: usize = value.parse().map_err(|_| bad())?;
                self.thread_pool_size = pool::clamp_size(size);
            }
            "TARIFF_FILE_PATH" => self.tariff_file_path = Some(value.to_string()),
            "SERVER_DATA_ROOT_DIR" => self.server_data_root_dir = value.to_string(),
            "LOG_LEVEL" => self.log_level = value.parse().map_err(|()| bad())?,
            "LOG_FILE_PATH" => {
                self.log_file_path = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            other => {
                warn!(key = other, "unknown config key ignored");
            }
        }
        Ok(())
    }

    /// Loads `KEY=VALUE` lines from `path` into `self`. `#` starts a line
    /// (or trailing) comment; a missing file is not an error — the current
    /// (default) values are kept, matching the original loader's "file not
    /// found, using current values" behavior. An invalid value for a
    /// recognized key is logged and that line is skipped; it does not fail
    /// the whole load.
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub async fn load_file(&mut self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("config file not found, using current values");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        for (number, raw_line) in contents.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!(line = number + 1, "config line missing '=', ignored");
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                warn!(line = number + 1, "config line has an empty key, ignored");
                continue;
            }
            if let Err(err) = self.apply_line(key, value) {
                warn!(line = number + 1, %err, "ignoring invalid config line");
            }
        }

        Ok(())
    }

    pub async fn get<F, T>(func: F) -> T
    where
        F: Fn(&Config) -> T,
    {
        func(&CONFIG.read().await)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn missing_file_keeps_defaults() {
        let mut config = Config::default();
        config.load_file("/no/such/file").await.unwrap();
        assert_eq!(config.port, default_port());
    }

    #[tokio::test]
    async fn loads_recognized_keys_and_ignores_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledgerd.conf");
        tokio::fs::write(
            &path,
            "# comment\nPORT=9000\nTHREAD_POOL_SIZE=0 # coerced to 1\nLOG_LEVEL=debug\nUNKNOWN_KEY=1\n",
        )
        .await
        .unwrap();

        let mut config = Config::default();
        config.load_file(&path).await.unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.thread_pool_size, 1);
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[tokio::test]
    async fn invalid_value_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledgerd.conf");
        tokio::fs::write(&path, "PORT=not_a_number\nTHREAD_POOL_SIZE=2\n")
            .await
            .unwrap();

        let mut config = Config::default();
        config.load_file(&path).await.unwrap();
        assert_eq!(config.port, default_port());
        assert_eq!(config.thread_pool_size, 2);
    }
}
