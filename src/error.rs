//! Error types for the demo broadcast server.

use std::io;
use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, DemoServerError>;

/// Errors that can occur while running the demo server or a viewer session.
#[derive(Debug, Error)]
pub enum DemoServerError {
    /// I/O error occurred on a socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The listening socket could not be bound.
    #[error("failed to bind demo server on port {port}: {source}")]
    BindFailed {
        /// The port that was requested.
        port: u16,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A [`crate::config::ServerConfig`] was constructed with invalid
    /// values (e.g. an empty viewer token, which could never authenticate
    /// a viewer).
    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),

    /// A viewer violated the protocol (wrong security type, wrong auth type,
    /// unknown running-state message, malformed record, ...).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A viewer presented an empty or incorrect token.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A blocking read timed out or returned fewer bytes than required.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Bytes that were required to complete the record.
        expected: usize,
        /// Bytes actually read before the timeout elapsed.
        got: usize,
    },

    /// Pixel codec failed to encode a rectangle.
    #[error("codec error: {0}")]
    Codec(String),

    /// The upstream screen source disconnected.
    #[error("upstream disconnected")]
    UpstreamDisconnected,

    /// The viewer's connection has already been closed.
    #[error("connection closed")]
    ConnectionClosed,
}
