//! Common error types for iprep

use thiserror::Error;

/// Common result type for iprep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across iprep crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML syntax or schema error in a configuration file
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
