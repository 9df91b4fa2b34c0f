//! Server configuration from environment variables.
//!
//! | Variable                  | Default          |
//! |---------------------------|------------------|
//! | `FLATPG_LISTEN`           | `127.0.0.1:5432` |
//! | `FLATPG_DATA_DIR`         | `data`           |
//! | `FLATPG_DATABASE`         | unset            |
//! | `FLATPG_USER`             | unset            |
//! | `FLATPG_PASSWORD`         | unset            |
//! | `FLATPG_MAX_MESSAGE_SIZE` | `16777216`       |
//!
//! Empty values count as unset.

use std::net::{AddrParseError, SocketAddr};
use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::codec::DEFAULT_MAX_MESSAGE_SIZE;

pub const LISTEN_VAR: &str = "FLATPG_LISTEN";
pub const DATA_DIR_VAR: &str = "FLATPG_DATA_DIR";
pub const DATABASE_VAR: &str = "FLATPG_DATABASE";
pub const USER_VAR: &str = "FLATPG_USER";
pub const PASSWORD_VAR: &str = "FLATPG_PASSWORD";
pub const MAX_MESSAGE_SIZE_VAR: &str = "FLATPG_MAX_MESSAGE_SIZE";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5432";
pub const DEFAULT_DATA_DIR: &str = "data";

/// Smallest usable frame limit: a startup packet header.
const MIN_MESSAGE_SIZE: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid listen address {value:?}: {source}")]
    InvalidListenAddr {
        var: &'static str,
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("{var}: invalid size {value:?}: {source}")]
    InvalidSize {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("{var}: {value} is below the minimum of {MIN_MESSAGE_SIZE} bytes")]
    SizeTooSmall { var: &'static str, value: usize },
}

/// Required username and password for the cleartext auth gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Database used when the client does not name one.
    pub default_database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5432)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            default_database: None,
            user: None,
            password: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable
    /// name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get(LISTEN_VAR) {
            config.listen_addr =
                value
                    .trim()
                    .parse()
                    .map_err(|source| ConfigError::InvalidListenAddr {
                        var: LISTEN_VAR,
                        value: value.clone(),
                        source,
                    })?;
        }
        if let Some(value) = get(DATA_DIR_VAR) {
            config.data_dir = PathBuf::from(value);
        }
        config.default_database = get(DATABASE_VAR);
        config.user = get(USER_VAR);
        config.password = get(PASSWORD_VAR);

        if let Some(value) = get(MAX_MESSAGE_SIZE_VAR) {
            let size: usize = value
                .trim()
                .parse()
                .map_err(|source| ConfigError::InvalidSize {
                    var: MAX_MESSAGE_SIZE_VAR,
                    value: value.clone(),
                    source,
                })?;
            if size < MIN_MESSAGE_SIZE {
                return Err(ConfigError::SizeTooSmall {
                    var: MAX_MESSAGE_SIZE_VAR,
                    value: size,
                });
            }
            config.max_message_size = size;
        }

        Ok(config)
    }

    /// Credentials clients must present. The auth gate is active only when
    /// both a user and a password are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some(Credentials {
                user: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}
