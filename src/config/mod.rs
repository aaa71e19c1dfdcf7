use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

/// Top-level daemon configuration, read from `boltd.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub idmap: IdmapConfig,
    pub containers: BTreeMap<String, ContainerSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8443,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind_address, self.port);
        addr.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidBindAddress {
                address: addr,
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Directory for daily-rolling log files; console only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

/// Where the uid/gid allocation for unprivileged containers comes from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdmapConfig {
    pub user: String,
    pub subuid_path: PathBuf,
    pub subgid_path: PathBuf,
    pub kernel_uid_map: PathBuf,
    pub kernel_gid_map: PathBuf,
}

impl Default for IdmapConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            subuid_path: PathBuf::from("/etc/subuid"),
            subgid_path: PathBuf::from("/etc/subgid"),
            kernel_uid_map: PathBuf::from("/proc/self/uid_map"),
            kernel_gid_map: PathBuf::from("/proc/self/gid_map"),
        }
    }
}

/// A process-backed container managed by the daemon.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContainerSpec {
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl DaemonConfig {
    /// Default config location: `<config_dir>/boltd/boltd.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("boltd")
            .join("boltd.toml")
    }

    /// Load configuration from `path`, or from the default location when `path` is `None`.
    ///
    /// An explicit path must exist. A missing file at the default location yields the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::parse(&content)?;
        info!(
            "Loaded config from {} ({} containers)",
            path.display(),
            config.containers.len()
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, spec) in &self.containers {
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::InvalidFormat {
                    reason: format!("invalid container name '{}'", name),
                }
                .into());
            }
            if spec.command.is_empty() {
                return Err(ConfigError::InvalidFormat {
                    reason: format!("container '{}' has an empty command", name),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoltdError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config = DaemonConfig::parse(
            r#"
[server]
bind_address = "0.0.0.0"
port = 9000

[logging]
level = "debug"
json = true

[idmap]
user = "boltd"

[containers.web]
command = ["sleep", "3600"]
env = { MODE = "test" }
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.idmap.user, "boltd");
        assert_eq!(config.idmap.subuid_path, PathBuf::from("/etc/subuid"));
        assert_eq!(config.containers["web"].command, vec!["sleep", "3600"]);
        assert_eq!(config.containers["web"].env["MODE"], "test");
        assert_eq!(
            config.server.socket_addr().unwrap().to_string(),
            "0.0.0.0:9000"
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DaemonConfig::parse("").unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.port, 8443);
        assert!(config.containers.is_empty());
    }

    #[test]
    fn test_empty_command_rejected() {
        let err = DaemonConfig::parse("[containers.web]\ncommand = []\n").unwrap_err();
        assert!(matches!(
            err,
            BoltdError::Config(ConfigError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = DaemonConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, BoltdError::Config(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("boltd.toml");
        std::fs::write(&path, "[server]\nport = 7000\n").unwrap();

        let config = DaemonConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn test_bad_bind_address() {
        let server = ServerConfig {
            bind_address: "not an address".to_string(),
            port: 1,
        };
        assert!(server.socket_addr().is_err());
    }
}
