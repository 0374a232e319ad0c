//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "TRADEWINDS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Server configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the line-protocol listener binds to
    pub bind_address: SocketAddr,
    /// Directory holding `nations.yaml` and `policy.yaml`; embedded rules when unset
    pub rules_dir: Option<String>,
    /// How often idle rooms are swept, in seconds
    pub idle_sweep_secs: u64,
    /// Countdown tick length in milliseconds
    pub countdown_tick_ms: u64,
    /// Prefix for room keys in the store
    pub key_prefix: String,
    /// Default tracing filter; `RUST_LOG` wins when set
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 7878)),
            rules_dir: None,
            idle_sweep_secs: 60,
            countdown_tick_ms: 1000,
            key_prefix: "room:".to_string(),
            log_filter: "tradewinds_server=info,tradewinds_core=info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `TRADEWINDS_CONFIG` or the first CLI argument, else defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match config_path(std::env::var(CONFIG_ENV).ok(), std::env::args().skip(1)) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn room_key(&self, code: &str) -> String {
        format!("{}{}", self.key_prefix, code)
    }

    /// Pattern matching every room key.
    pub fn room_pattern(&self) -> String {
        format!("{}*", self.key_prefix)
    }

    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idle_sweep_secs.max(1))
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms.max(1))
    }
}

/// The environment variable takes precedence over the command line.
pub fn config_path(
    env_value: Option<String>,
    mut args: impl Iterator<Item = String>,
) -> Option<PathBuf> {
    env_value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| args.next())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yaml");
        std::fs::write(&path, "bind_address: 127.0.0.1:9000\nkey_prefix: \"tw:\"\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.room_key("ABC"), "tw:ABC");
        assert_eq!(config.room_pattern(), "tw:*");
        assert_eq!(config.idle_sweep_secs, 60);
        assert_eq!(config.countdown_tick(), Duration::from_secs(1));
    }

    #[test]
    fn bad_yaml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "idle_sweep_secs: [nope").unwrap();

        let err = ServerConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn env_beats_arguments() {
        let args = vec!["cli.yaml".to_string()];
        assert_eq!(
            config_path(Some("env.yaml".into()), args.clone().into_iter()),
            Some(PathBuf::from("env.yaml"))
        );
        assert_eq!(
            config_path(None, args.into_iter()),
            Some(PathBuf::from("cli.yaml"))
        );
        assert_eq!(config_path(Some(" ".into()), std::iter::empty()), None);
    }
}
