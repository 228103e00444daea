//! Configuration for the demo broadcast server.
//!
//! This is a plain data struct, not a file-format loader: the embedding
//! application is responsible for sourcing these values (CLI flags,
//! environment, a config file in whatever format it prefers) and handing
//! them to [`crate::DemoServer::bind`].

use crate::error::{DemoServerError, Result};

/// Default interval hint, in milliseconds, at which the upstream source is
/// asked to refresh the framebuffer. Matches Veyon's demo-server default.
pub const DEFAULT_UPDATE_INTERVAL_MS: u32 = 100;

/// Configuration required to start a [`crate::DemoServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port the demo server listens on for viewer connections.
    pub listen_port: u16,
    /// Hostname or address of the upstream screen source.
    pub upstream_host: String,
    /// TCP port of the upstream screen source.
    pub upstream_port: u16,
    /// Token the server presents to the upstream source when connecting.
    pub upstream_token: String,
    /// Token every viewer must present during the handshake.
    pub viewer_token: String,
    /// Update interval hint passed through to the upstream source.
    pub update_interval_ms: u32,
}

impl ServerConfig {
    /// Creates a configuration with the default update interval.
    ///
    /// # Errors
    ///
    /// Returns [`DemoServerError::InvalidConfig`] if `viewer_token` is
    /// empty, since an empty token can never be presented successfully
    /// (the protocol rejects empty tokens outright) and a server
    /// configured this way could never admit a viewer.
    pub fn new(
        listen_port: u16,
        upstream_host: impl Into<String>,
        upstream_port: u16,
        upstream_token: impl Into<String>,
        viewer_token: impl Into<String>,
    ) -> Result<Self> {
        let viewer_token = viewer_token.into();
        if viewer_token.is_empty() {
            return Err(DemoServerError::InvalidConfig(
                "viewer_token must not be empty: no viewer could ever authenticate".to_owned(),
            ));
        }

        Ok(Self {
            listen_port,
            upstream_host: upstream_host.into(),
            upstream_port,
            upstream_token: upstream_token.into(),
            viewer_token,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
        })
    }

    /// Overrides the upstream update interval hint.
    #[must_use]
    pub fn with_update_interval_ms(mut self, interval_ms: u32) -> Self {
        self.update_interval_ms = interval_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_update_interval_matches_veyon() {
        let cfg = ServerConfig::new(5950, "127.0.0.1", 11100, "up-secret", "view-secret").unwrap();
        assert_eq!(cfg.update_interval_ms, 100);
    }

    #[test]
    fn with_update_interval_overrides_default() {
        let cfg = ServerConfig::new(5950, "127.0.0.1", 11100, "up-secret", "view-secret")
            .unwrap()
            .with_update_interval_ms(250);
        assert_eq!(cfg.update_interval_ms, 250);
    }

    #[test]
    fn empty_viewer_token_is_rejected() {
        let err = ServerConfig::new(5950, "127.0.0.1", 11100, "up-secret", "").unwrap_err();
        assert!(matches!(err, DemoServerError::InvalidConfig(_)));
    }
}
