//! The upstream screen-source adapter contract.
//!
//! Capturing an actual remote desktop (connecting out to a real Veyon-style
//! demo source, negotiating its own token auth, decoding its own RLE+LZ
//! stream back into pixels) is outside what this crate implements: that is
//! a platform- and deployment-specific integration left to the embedding
//! application. What this crate does own is the *shape* of that
//! integration, so [`DemoServer`](crate::server::DemoServer) can be built
//! and tested against any adapter that satisfies it.

use crate::events::UpstreamEvent;
use crate::framebuffer::SharedFramebuffer;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// A connected upstream screen source.
///
/// Implementations own the actual network connection (or local capture
/// mechanism) to the screen source and publish [`UpstreamEvent`]s on the
/// returned broadcast channel as the image changes. The framebuffer handed
/// back by [`Upstream::framebuffer`] is the single shared image every
/// viewer session reads from; the adapter is responsible for keeping it
/// up to date as events fire.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// The framebuffer this adapter keeps in sync with the upstream
    /// source.
    fn framebuffer(&self) -> SharedFramebuffer;

    /// Subscribes to this adapter's change-event stream. Each call
    /// returns an independent receiver (broadcast semantics): a slow
    /// subscriber can miss events but never blocks another.
    fn subscribe(&self) -> broadcast::Receiver<UpstreamEvent>;

    /// Requests the upstream source begin, or continue, producing
    /// updates, optionally with a hint about how often. Implementations
    /// that poll rather than push may use this to drive their own timer.
    async fn request_updates(&self, interval_hint_ms: u32);
}

/// A trivial in-process [`Upstream`] that paints a fixed test pattern once
/// and otherwise never changes. Useful for examples and integration tests
/// that need a working adapter without a real screen-capture backend.
pub struct TestPatternUpstream {
    framebuffer: SharedFramebuffer,
    sender: broadcast::Sender<UpstreamEvent>,
}

impl TestPatternUpstream {
    /// Builds a test-pattern adapter with the given framebuffer
    /// dimensions, painting a simple horizontal gradient.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        let mut fb = crate::framebuffer::Framebuffer::new(width, height);
        let pattern: Vec<u32> = (0..u32::from(width) * u32::from(height))
            .map(|i| {
                let x = i % u32::from(width);
                let shade = (x * 255 / u32::from(width.max(1))) & 0xFF;
                (shade << 16) | (shade << 8) | shade
            })
            .collect();
        fb.write_rect(0, 0, width, height, &pattern);

        let (sender, _) = broadcast::channel(16);
        Self {
            framebuffer: crate::framebuffer::shared(fb),
            sender,
        }
    }

    /// Publishes a change-region event and lets callers (tests) mutate
    /// the framebuffer directly beforehand via [`Self::framebuffer`].
    pub fn announce_change(&self, x: u16, y: u16, width: u16, height: u16) {
        let _ = self.sender.send(UpstreamEvent::ImageChanged {
            x,
            y,
            width,
            height,
        });
    }
}

#[async_trait]
impl Upstream for TestPatternUpstream {
    fn framebuffer(&self) -> SharedFramebuffer {
        self.framebuffer.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<UpstreamEvent> {
        self.sender.subscribe()
    }

    async fn request_updates(&self, _interval_hint_ms: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_paints_a_gradient() {
        let upstream = TestPatternUpstream::new(16, 16);
        let fb = upstream.framebuffer();
        let guard = fb.read().await;
        assert_ne!(guard.pixels()[0], guard.pixels()[15]);
    }

    #[tokio::test]
    async fn announce_change_is_observed_by_subscribers() {
        let upstream = TestPatternUpstream::new(4, 4);
        let mut rx = upstream.subscribe();
        upstream.announce_change(0, 0, 4, 4);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, UpstreamEvent::ImageChanged { .. }));
    }
}
