//! Configuration error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the client's TOML configuration
#[derive(Error, Debug)]
pub enum Error {
    /// A setting parsed but holds an unusable value
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Error {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
