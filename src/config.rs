// Service configuration - TOML file with defaults for every field

use crate::error::{PriceError, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// How `GET /api/v0/prices` produces its body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Build the whole archive before sending headers. A failure yields a clean 500.
    #[default]
    Buffered,
    /// Send the archive as it is written. A late failure truncates the body.
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            filter: "price_archive=info,tower_http=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: PathBuf,
    pub bind: String,
    pub max_upload_bytes: usize,
    pub export_mode: ExportMode,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("prices.db"),
            bind: "0.0.0.0:8080".to_string(),
            max_upload_bytes: 32 * 1024 * 1024,
            export_mode: ExportMode::Buffered,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Read `path` if given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| PriceError::Config {
                    message: format!("cannot read {}: {}", path.display(), e),
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PriceError::Config {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if self.max_upload_bytes == 0 {
            return Err(PriceError::Config {
                message: "max_upload_bytes must be greater than zero".to_string(),
            });
        }

        if self.database.as_os_str().is_empty() {
            return Err(PriceError::Config {
                message: "database path is empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind.parse().map_err(|e| PriceError::Config {
            message: format!("invalid bind address {:?}: {}", self.bind, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::load(None).unwrap();

        assert_eq!(config.bind_addr().unwrap().port(), 8080);
        assert_eq!(config.export_mode, ExportMode::Buffered);
        assert_eq!(config.log.format, LogFormat::Compact);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            database = "/var/lib/prices/prices.db"
            export_mode = "streaming"

            [log]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.database, PathBuf::from("/var/lib/prices/prices.db"));
        assert_eq!(config.export_mode, ExportMode::Streaming);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.filter, LogConfig::default().filter);
        assert_eq!(config.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"127.0.0.1:9000\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = Config {
            bind: "not an address".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(PriceError::Config { .. })));

        let config = Config {
            max_upload_bytes: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(PriceError::Config { .. })));

        assert!(Config::from_toml_str("export_mode = \"sometimes\"").is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/prices.toml"))).unwrap_err();

        assert!(matches!(err, PriceError::Config { .. }));
    }
}
