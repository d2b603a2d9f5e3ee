use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("remote API error: {0}")]
    Remote(String),

    #[error("failed to read cache entry {path}: {reason}")]
    CacheRead { path: PathBuf, reason: String },

    #[error("failed to write cache entry {path}: {reason}")]
    CacheWrite { path: PathBuf, reason: String },

    #[error("store error for {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("select an anime and an episode first ({missing} missing)")]
    SelectionIncomplete { missing: &'static str },

    #[error("failed to launch '{program}': {reason}")]
    Launch { program: String, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Remote(err.to_string())
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
