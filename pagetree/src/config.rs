//! Command-line tool configuration.
//!
//! # Environment Variables
//!
//! - `PAGETREE_PATH`: File backing the tree (default: `./btree.bin`)
//! - `PAGETREE_SYNC`: Whether to sync the file after each `put` (default: `true`)

use std::path::PathBuf;

/// Tree configuration for the command-line tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// File holding the tree. Created if it does not exist.
    pub path: PathBuf,
    /// Call `sync` after every successful `put`.
    pub sync: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl TreeConfig {
    /// Default backing file.
    pub const DEFAULT_PATH: &'static str = "./btree.bin";
    /// Default sync behavior.
    pub const DEFAULT_SYNC: bool = true;

    const PATH_VAR: &'static str = "PAGETREE_PATH";
    const SYNC_VAR: &'static str = "PAGETREE_SYNC";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PAGETREE_SYNC` is set but is not a boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(Self::PATH_VAR)
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from(Self::DEFAULT_PATH), PathBuf::from);

        let sync = match lookup(Self::SYNC_VAR) {
            Some(value) => Self::parse_bool(Self::SYNC_VAR, &value)?,
            None => Self::DEFAULT_SYNC,
        };

        Ok(Self { path, sync })
    }

    fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}' is not a boolean (expected true or false)"),
            }),
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(Self::DEFAULT_PATH),
            sync: Self::DEFAULT_SYNC,
        }
    }
}
