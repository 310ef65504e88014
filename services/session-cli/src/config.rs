//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tokens never live in the TOML; they are kept in the credential file named
//! by `session.credentials_path`.

use common::Error;
use serde::Deserialize;
use session_auth::DEFAULT_LOGIN_PATH;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Credential persistence and login redirect settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            login_path: default_login_path(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(".authfetch/credentials.json")
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `API_BASE_URL` replaces `api.base_url` before validation.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&contents).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.api.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(Error::invalid(
                "api.base_url",
                format!("must start with http:// or https://, got: {}", self.api.base_url),
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(Error::invalid("api.timeout_secs", "must be greater than 0"));
        }

        if !self.session.login_path.starts_with('/') {
            return Err(Error::invalid(
                "session.login_path",
                format!("must start with '/', got: {}", self.session.login_path),
            ));
        }

        if self.session.credentials_path.as_os_str().is_empty() {
            return Err(Error::invalid("session.credentials_path", "must not be empty"));
        }

        Ok(())
    }

    /// Absolute URL of the login page, for the "sign in again" hint.
    pub fn login_url(&self) -> String {
        format!(
            "{}{}",
            self.api.base_url.trim_end_matches('/'),
            self.session.login_path
        )
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("authfetch.toml")
    }
}
