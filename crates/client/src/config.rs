//! Credential and settings loading.

use crate::logging::LoggingConfig;
use mt5_trading_brokers_metatrader::BridgeConfig;
use mt5_trading_core::Credentials;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Default credentials file name, looked up next to the project.
pub const DEFAULT_CREDENTIALS_FILE: &str = "credential.json";

/// Matches the terminal's own default initialization timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const REQUIRED_CREDENTIAL_FIELDS: [&str; 3] = ["login_id", "password", "server"];

/// Errors raised while loading credentials or settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Credentials file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed file {path}: {message}")]
    Malformed { path: PathBuf, message: String },
    #[error("Credentials file {path} is missing field '{field}'")]
    MissingField { path: PathBuf, field: &'static str },
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Load `{"login_id", "password", "server"}` from a JSON file.
pub fn load_credentials(path: &Path) -> Result<Credentials, ConfigError> {
    info!(path = %path.display(), "Loading credentials");

    let result = read_file(path).and_then(|raw| {
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let object = value.as_object().ok_or_else(|| ConfigError::Malformed {
            path: path.to_path_buf(),
            message: "expected a JSON object".to_string(),
        })?;
        if let Some(field) = REQUIRED_CREDENTIAL_FIELDS
            .into_iter()
            .find(|f| !object.contains_key(*f))
        {
            return Err(ConfigError::MissingField {
                path: path.to_path_buf(),
                field,
            });
        }

        serde_json::from_value(value).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    });

    match &result {
        Ok(_) => info!("Credentials loaded"),
        Err(e) => error!(error = %e, "Failed to load credentials"),
    }
    result
}

/// Everything a connection needs, built once and handed to it.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub credentials: Credentials,
    /// Upper bound for any single terminal request.
    pub request_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Client settings, usually read from `mt5.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Relative paths resolve against the settings file's directory.
    pub credentials_file: PathBuf,
    pub request_timeout_secs: u64,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            credentials_file: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            bridge: BridgeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = read_file(path)?;
        let mut settings: ClientSettings =
            toml::from_str(&raw).map_err(|e| ConfigError::Malformed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if settings.credentials_file.is_relative() {
            if let Some(dir) = path.parent() {
                settings.credentials_file = dir.join(&settings.credentials_file);
            }
        }
        Ok(settings)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Load the credentials file and combine it with these settings.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let credentials = load_credentials(&self.credentials_file)?;
        Ok(ConnectionConfig::new(credentials).with_request_timeout(self.request_timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            DEFAULT_CREDENTIALS_FILE,
            r#"{"login_id": "5012345", "password": "pw", "server": "MetaQuotes-Demo"}"#,
        );
        let creds = load_credentials(&path).unwrap();
        assert_eq!(creds.login_id, "5012345");
        assert_eq!(creds.server, "MetaQuotes-Demo");
    }

    #[test]
    fn test_missing_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_credentials(&dir.path().join(DEFAULT_CREDENTIALS_FILE)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_malformed_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "credential.json", "{ login_id: ");
        assert!(matches!(
            load_credentials(&path),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_credentials_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "credential.json",
            r#"{"login_id": "1", "password": "pw"}"#,
        );
        match load_credentials(&path) {
            Err(ConfigError::MissingField { field, .. }) => assert_eq!(field, "server"),
            other => panic!("Expected missing field, got {:?}", other),
        }
    }

    #[test]
    fn test_settings_defaults_and_relative_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "mt5.toml",
            "request_timeout_secs = 5\n\n[bridge]\nport = 6000\n",
        );
        let settings = ClientSettings::load(&path).unwrap();
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.bridge.port, 6000);
        assert_eq!(settings.bridge.host, "127.0.0.1");
        assert_eq!(settings.logging.level, "info");
        assert_eq!(
            settings.credentials_file,
            dir.path().join(DEFAULT_CREDENTIALS_FILE)
        );

        write(
            dir.path(),
            DEFAULT_CREDENTIALS_FILE,
            r#"{"login_id": 77, "password": "pw", "server": "Demo"}"#,
        );
        let config = settings.connection_config().unwrap();
        assert_eq!(config.credentials.login_id, "77");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
