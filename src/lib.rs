// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # rfb-demoserver
//!
//! A read-only RFB (Remote Framebuffer) demo broadcast server: one
//! upstream screen source is fanned out to any number of viewers, each
//! with its own dirty-rectangle bookkeeping and its own socket.
//!
//! Unlike a general-purpose VNC server, this crate speaks a narrow
//! protocol variant on purpose: exactly one security type (a
//! vendor-specific token scheme, see [`protocol::SECURITY_TYPE_VEYON`]),
//! no input forwarding, and exactly one pixel-rectangle encoding
//! ([`protocol::ENCODING_RLE_LZ`], implemented in [`codec`]) negotiated
//! with nobody — viewers' `SetEncodings` lists are accepted and ignored.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rfb_demoserver::{DemoServer, ServerConfig, TestPatternUpstream, Upstream};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let upstream: Arc<dyn Upstream> = Arc::new(TestPatternUpstream::new(1920, 1080));
//!     let config =
//!         ServerConfig::new(5900, "127.0.0.1", 11100, "upstream-token", "viewer-token")?;
//!
//!     let server = DemoServer::bind(config, upstream).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐   change events    ┌─────────────────────┐
//! │  Upstream Adapter  │ ──────────────────▶│     DemoServer      │
//! │ (trait, §6; a real │   (image, cursor)   │  accept loop, one   │
//! │  screen-source     │◀─────────────────── │  task per viewer    │
//! │  client)           │  shared framebuffer  └──────────┬──────────┘
//! └───────────────────┘                                  │
//!                                        ┌────────────────┼────────────────┐
//!                                        ▼                ▼                ▼
//!                                 ┌─────────────┐  ┌─────────────┐  ┌─────────────┐
//!                                 │ViewerSession│  │ViewerSession│  │ViewerSession│
//!                                 │  (own dirty │  │  (own dirty │  │  (own dirty │
//!                                 │   state)    │  │   state)    │  │   state)    │
//!                                 └─────────────┘  └─────────────┘  └─────────────┘
//! ```
//!
//! Each [`session::ViewerSession`] owns its socket and codec scratch
//! buffers exclusively; the only thing sessions share is read-only access
//! to the upstream [`framebuffer::Framebuffer`] and independent
//! subscriptions to the upstream's broadcast channel of
//! [`events::UpstreamEvent`]s.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod framebuffer;
pub mod framing;
pub mod protocol;
pub mod region;
pub mod server;
pub mod upstream;
pub mod variant;

mod session;

// Re-exports: the surface an embedding application actually needs.
pub use config::ServerConfig;
pub use error::{DemoServerError, Result};
pub use events::UpstreamEvent;
pub use framebuffer::{Framebuffer, SharedFramebuffer};
pub use protocol::PixelFormat;
pub use server::DemoServer;
pub use upstream::{TestPatternUpstream, Upstream};

/// RFB protocol version string this server advertises during handshake.
pub const PROTOCOL_VERSION: &str = protocol::PROTOCOL_VERSION;

/// Default listening port for demo broadcast servers (matches the
/// upstream source's own convention of offsetting from the standard VNC
/// port range).
pub const DEFAULT_PORT: u16 = 5950;
