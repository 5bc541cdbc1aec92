//! Error types shared by the server and the client.

use crate::config::ConfigError;
use std::path::PathBuf;

/// Top-level error for startup and run failures.
#[derive(Debug)]
pub enum Error {
    /// Configuration could not be loaded.
    Config(ConfigError),
    /// The source file could not be opened, mapped or indexed.
    Load(PathBuf, std::io::Error),
    /// The output file could not be created or written.
    Output(PathBuf, std::io::Error),
    /// Socket or runtime failure outside a single connection.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "{}", e),
            Error::Load(path, e) => {
                write!(f, "Failed to load source file '{}': {}", path.display(), e)
            }
            Error::Output(path, e) => {
                write!(f, "Failed to write output file '{}': {}", path.display(), e)
            }
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Load(_, e) | Error::Output(_, e) | Error::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
