//! Error types for pluginhooks operations.

use crate::config::ConfigError;

/// Alias for `Result<T, pluginhooks::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop a plugin process from serving.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Required handshake environment is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The process was not launched by a host that knows the magic cookie.
    #[error(
        "this binary is a plugin and is not meant to be executed directly; \
         run the host application that loads it instead \
         (environment variable {key:?} does not carry the expected magic cookie)"
    )]
    CookieMismatch {
        /// Name of the cookie environment variable that was checked.
        key: String,
    },

    /// An I/O error from the transport.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
