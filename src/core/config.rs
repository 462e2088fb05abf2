use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize, Serializer};
use std::env;
use std::path::Path;

/// Credentials and endpoint overrides for a Backpack session
///
/// The JSON form is `{"api_key", "secret_key", "other_config"}` with optional
/// `base_url` and `ws_url`. `secret_key` is the base64 Ed25519 private key.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    #[serde(default)]
    pub other_config: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub ws_url: Option<String>,
}

/// What `ExchangeConfig` looks like when written out: credentials masked
#[derive(Serialize)]
struct RedactedConfig<'a> {
    api_key: &'static str,
    secret_key: &'static str,
    other_config: Option<&'a str>,
    base_url: Option<&'a str>,
    ws_url: Option<&'a str>,
}

const REDACTED: &str = "[REDACTED]";

impl Serialize for ExchangeConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RedactedConfig {
            api_key: REDACTED,
            secret_key: REDACTED,
            other_config: self.other_config.as_deref(),
            base_url: self.base_url.as_deref(),
            ws_url: self.ws_url.as_deref(),
        }
        .serialize(serializer)
    }
}

fn required_var(name: String) -> Result<String, ConfigError> {
    env::var(&name).map_err(|_| ConfigError::MissingEnvironmentVariable(name))
}

fn optional_var(name: String) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl ExchangeConfig {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            other_config: None,
            base_url: None,
            ws_url: None,
        }
    }

    /// Read a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

        serde_json::from_str(&contents).map_err(|e| {
            ConfigError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })
    }

    /// Read `{PREFIX}_API_KEY` and `{PREFIX}_SECRET_KEY`, plus the optional
    /// `{PREFIX}_BASE_URL` and `{PREFIX}_WS_URL` overrides
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let mut config = Self::new(
            required_var(format!("{}_API_KEY", prefix))?,
            required_var(format!("{}_SECRET_KEY", prefix))?,
        );
        config.base_url = optional_var(format!("{}_BASE_URL", prefix));
        config.ws_url = optional_var(format!("{}_WS_URL", prefix));
        Ok(config)
    }

    /// `from_env` after loading `./.env` if present
    ///
    /// Keep `.env` files out of version control.
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// `from_env` after loading `env_file_path` if present
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        if let Err(e) = dotenv::from_path(env_file_path) {
            let missing = matches!(
                &e,
                dotenv::Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound
            );
            if !missing {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "{}: {}",
                    env_file_path, e
                )));
            }
        }
        Self::from_env(prefix)
    }

    /// No credentials: public endpoints and streams only
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key().is_empty() && !self.secret_key().is_empty()
    }

    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn ws_url(mut self, ws_url: String) -> Self {
        self.ws_url = Some(ws_url);
        self
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Exposes the private key; only the signer should need this
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cannot read config file {0}")]
    Io(String),
}
