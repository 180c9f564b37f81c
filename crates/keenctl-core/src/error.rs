//! Error types for the keenctl system
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for keenctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the keenctl system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors, fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// SSH dial or handshake failure, recoverable via reconnect backoff
    #[error("connection to router failed: {0}")]
    Connect(String),

    /// A route references a resolver that is not registered
    #[error("address resolver not found: {0}")]
    ResolverNotFound(String),

    /// A route references a filter that is not registered
    #[error("address filter not found: {0}")]
    FilterNotFound(String),

    /// A target or prefix could not be parsed as an address
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The router returned a route table in an unexpected format
    #[error("invalid format of routes: {0}")]
    ParseRoutes(String),

    /// An upstream HTTP API answered with a non-success status
    #[error("http returned error status code {code}: {body}")]
    HttpStatus {
        /// The HTTP status code
        code: u16,
        /// The response body, captured for diagnostics
        body: String,
    },

    /// An upstream response body could not be decoded
    #[error("error decoding response body: {0}")]
    Unmarshal(String),

    /// A resolver failed to produce addresses for its target
    #[error("resolution failed: {0}")]
    Resolve(String),

    /// A router command failed; fails the current sync and triggers reconnect
    #[error("{command}: {message}")]
    Command {
        /// The command that was issued
        command: String,
        /// The underlying failure
        message: String,
    },

    /// Sentinel for cancelled operations; never logged at error level
    #[error("operation cancelled")]
    Cancelled,

    /// I/O errors not covered by other categories
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Create a resolver-not-found error
    pub fn resolver_not_found(name: impl Into<String>) -> Self {
        Self::ResolverNotFound(name.into())
    }

    /// Create a filter-not-found error
    pub fn filter_not_found(name: impl Into<String>) -> Self {
        Self::FilterNotFound(name.into())
    }

    /// Create an invalid address error
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create a route parsing error
    pub fn parse_routes(output: impl Into<String>) -> Self {
        Self::ParseRoutes(output.into())
    }

    /// Create an HTTP status error with the captured body
    pub fn http_status(code: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            code,
            body: body.into(),
        }
    }

    /// Create a response decoding error
    pub fn unmarshal(msg: impl Into<String>) -> Self {
        Self::Unmarshal(msg.into())
    }

    /// Create a resolution error
    pub fn resolve(msg: impl Into<String>) -> Self {
        Self::Resolve(msg.into())
    }

    /// Create a command failure error
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Check whether this error is the cancellation sentinel
    ///
    /// Callers must distinguish "cancelled" from other failures and return
    /// success on cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
