use thiserror::Error;

use crate::classify::{ErrorClass, classify};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("No such file: {0}")]
    NotFound(String),

    #[error("Bad reference: {0}")]
    BadReference(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("SFTP error: {0}")]
    SftpError(String),

    #[error("SSH connection failed: {0}")]
    SshConnectionError(String),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Russh error: {0}")]
    RusshError(#[from] russh::Error),

    #[error("Russh Sftp error: {0}")]
    RusshSftpError(#[from] russh_sftp::client::error::Error),
}

impl AppError {
    /// Classification of this error, see [`classify`].
    pub fn class(&self) -> ErrorClass {
        classify(self)
    }

    /// True when the remote target does not exist.
    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;
