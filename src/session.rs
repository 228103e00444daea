//! A single viewer connection: handshake state machine, running-message
//! handler, and the dirty-rectangle update-send path.
//!
//! Each accepted viewer gets its own [`ViewerSession`], owning its socket
//! and codec scratch buffer exclusively — no `Arc`/lock is needed around
//! either, since nothing outside this task ever touches them. The only
//! state shared with the rest of the server is the upstream framebuffer
//! (read-only, behind [`crate::framebuffer::SharedFramebuffer`]) and the
//! broadcast receiver for upstream change events.

use crate::config::ServerConfig;
use crate::error::{DemoServerError, Result};
use crate::events::UpstreamEvent;
use crate::framebuffer::SharedFramebuffer;
use crate::framing::read_exact_timeout;
use crate::protocol::{
    self, PixelFormat, RectHeader, ServerInit, AUTH_TYPE_TOKEN, CLIENT_MSG_CLIENT_CUT_TEXT,
    CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST, CLIENT_MSG_SET_ENCODINGS, CLIENT_MSG_SET_PIXEL_FORMAT,
    SECURITY_RESULT_OK, SECURITY_TYPE_VEYON, SERVER_MSG_FRAMEBUFFER_UPDATE,
};
use crate::region::{coalesce, Rect};
use crate::variant::{Variant, VariantArray};
use bytes::{Buf, BufMut, BytesMut};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

/// Caps how many distinct dirty rectangles a session accumulates before
/// collapsing to a single full-framebuffer rectangle. A tuning constant,
/// not a protocol invariant, chosen to match the source this protocol is
/// modeled on.
pub const MAX_RECTS: usize = 100;

/// Client message type: Veyon-specific toggle for local input on the
/// server side. Always ignored by this read-only server; the wire layout
/// (1 flag byte + 2 padding bytes after the message type) is this crate's
/// own choice, documented in `DESIGN.md`.
const CLIENT_MSG_SET_SERVER_INPUT: u8 = 109;

const DEFER_UPDATE: Duration = Duration::from_millis(50);
const KEEPALIVE_UPDATE: Duration = Duration::from_secs(1);

/// The cursor shape most recently reported by the upstream adapter,
/// pending delivery to a viewer.
#[derive(Debug, Clone)]
struct CursorShape {
    image: Arc<Vec<u8>>,
    width: u16,
    height: u16,
    hotspot_x: u16,
    hotspot_y: u16,
}

/// Mutable state touched by both the event-delivery path and the
/// update-send path; guarded by a single non-reentrant
/// [`tokio::sync::Mutex`]. Lock scopes are kept short and never held
/// across the socket write (see module docs and `DESIGN.md`).
#[derive(Debug, Default)]
struct DirtyState {
    rects: Vec<Rect>,
    full_update_pending: bool,
    update_requested: bool,
    cursor: Option<CursorShape>,
}

impl DirtyState {
    fn push_rect(&mut self, rect: Rect) {
        if self.full_update_pending {
            return;
        }
        if self.rects.len() >= MAX_RECTS {
            self.full_update_pending = true;
            self.rects.clear();
        } else {
            self.rects.push(rect);
        }
    }
}

/// A single viewer's connection.
pub struct ViewerSession {
    id: u64,
    stream: TcpStream,
    config: Arc<ServerConfig>,
    framebuffer: SharedFramebuffer,
    events: broadcast::Receiver<UpstreamEvent>,
    dirty: Mutex<DirtyState>,
    other_endianness: bool,
    fb_width: u16,
    fb_height: u16,
    codec_buffers: crate::codec::CodecBuffers,
}

impl ViewerSession {
    /// Creates a session for a freshly accepted socket. The handshake has
    /// not run yet; call [`ViewerSession::run`] to drive it to completion
    /// and then serve the viewer until disconnect.
    #[must_use]
    pub fn new(
        id: u64,
        stream: TcpStream,
        config: Arc<ServerConfig>,
        framebuffer: SharedFramebuffer,
        events: broadcast::Receiver<UpstreamEvent>,
    ) -> Self {
        Self {
            id,
            stream,
            config,
            framebuffer,
            events,
            dirty: Mutex::new(DirtyState::default()),
            other_endianness: false,
            fb_width: 0,
            fb_height: 0,
            codec_buffers: crate::codec::CodecBuffers::new(),
        }
    }

    /// Runs the handshake, then serves the viewer until it disconnects or
    /// violates the protocol. Always fatal to this session only; the
    /// caller logs and drops the session on any `Err`.
    pub async fn run(mut self) -> Result<()> {
        self.handshake().await?;
        info!("viewer {} entered running state", self.id);

        {
            let (w, h) = (self.fb_width, self.fb_height);
            let mut dirty = self.dirty.lock().await;
            dirty.push_rect(Rect::new(0, 0, w, h));
        }

        let mut read_buf = BytesMut::with_capacity(4096);
        let mut next_timer: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                event = self.events.recv() => {
                    match event {
                        Ok(ev) => self.handle_upstream_event(ev).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("viewer {} lagged {skipped} upstream events, forcing full update", self.id);
                            self.dirty.lock().await.full_update_pending = true;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(DemoServerError::UpstreamDisconnected);
                        }
                    }
                    self.maybe_send_update(&mut next_timer).await?;
                }

                result = self.stream.read_buf(&mut read_buf) => {
                    let n = result?;
                    if n == 0 {
                        return Err(DemoServerError::ConnectionClosed);
                    }
                    let (update_requested, full_update_requested) =
                        self.drain_running_messages(&mut read_buf)?;
                    if update_requested {
                        let mut dirty = self.dirty.lock().await;
                        dirty.update_requested = true;
                        if full_update_requested {
                            dirty.full_update_pending = true;
                            dirty.rects.clear();
                        }
                    }
                    self.maybe_send_update(&mut next_timer).await?;
                }

                () = wait_until(next_timer) => {
                    next_timer = None;
                    self.maybe_send_update(&mut next_timer).await?;
                }
            }
        }
    }

    // --- Handshake (§4.3) ---

    async fn handshake(&mut self) -> Result<()> {
        // The server writes its version string first, immediately on
        // connect, then reads the client's reply; a real viewer sits
        // waiting for these bytes before sending its own.
        self.stream
            .write_all(protocol::PROTOCOL_VERSION.as_bytes())
            .await?;
        let mut version = [0u8; protocol::PROTOCOL_VERSION_LEN];
        read_exact_timeout(&mut self.stream, &mut version).await?;

        // SecurityType: offer exactly {Veyon}.
        self.stream.write_all(&[1u8, SECURITY_TYPE_VEYON]).await?;
        let mut chosen = [0u8; 1];
        read_exact_timeout(&mut self.stream, &mut chosen).await?;
        if chosen[0] != SECURITY_TYPE_VEYON {
            warn!(
                "viewer {} chose unsupported security type {}",
                self.id, chosen[0]
            );
            return Err(DemoServerError::Protocol(format!(
                "unsupported security type {}",
                chosen[0]
            )));
        }

        // AuthTypes: offer exactly {Token}.
        self.write_variant_array(&VariantArray::auth_types(&[AUTH_TYPE_TOKEN]))
            .await?;
        let selection = self.read_variant_array().await?;
        let (auth_type, username) = match selection.values.as_slice() {
            [Variant::UInt32(t), Variant::Str(u)] => (*t, u.clone()),
            _ => {
                return Err(DemoServerError::Protocol(
                    "malformed auth-type selection".to_owned(),
                ))
            }
        };
        if auth_type != AUTH_TYPE_TOKEN {
            warn!("viewer {} chose unsupported auth type {auth_type}", self.id);
            return Err(DemoServerError::Protocol(format!(
                "unsupported auth type {auth_type}"
            )));
        }
        debug!("viewer {} presented username {username:?}", self.id);
        self.write_variant_array(&VariantArray::default()).await?;

        // Token.
        let token_msg = self.read_variant_array().await?;
        let token = token_msg
            .as_token()
            .map_err(|_| DemoServerError::Protocol("malformed token message".to_owned()))?;
        if token.is_empty() || token != self.config.viewer_token {
            warn!("viewer {} failed token authentication", self.id);
            return Err(DemoServerError::AuthenticationFailed);
        }

        let mut result_buf = BytesMut::with_capacity(4);
        result_buf.put_u32(SECURITY_RESULT_OK);
        self.stream.write_all(&result_buf).await?;

        // ClientInit: one shared-flag byte, ignored.
        let mut shared_flag = [0u8; 1];
        read_exact_timeout(&mut self.stream, &mut shared_flag).await?;

        let (width, height) = {
            let fb = self.framebuffer.read().await;
            (fb.width(), fb.height())
        };
        self.fb_width = width;
        self.fb_height = height;

        let init = ServerInit {
            framebuffer_width: width,
            framebuffer_height: height,
            pixel_format: PixelFormat::demo_normalized(),
        };
        let mut buf = BytesMut::new();
        init.write_to(&mut buf);
        self.stream.write_all(&buf).await?;

        Ok(())
    }

    async fn write_variant_array(&mut self, array: &VariantArray) -> Result<()> {
        let mut buf = BytesMut::new();
        array.write_to(&mut buf);
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    async fn read_variant_array(&mut self) -> Result<VariantArray> {
        let count = self.read_u32().await?;
        let mut values = Vec::with_capacity((count as usize).min(64));
        for _ in 0..count {
            values.push(self.read_variant().await?);
        }
        Ok(VariantArray::new(values))
    }

    async fn read_variant(&mut self) -> Result<Variant> {
        const TAG_UINT32: u8 = 0;
        const TAG_STR: u8 = 1;
        const TAG_BYTE_ARRAY: u8 = 2;

        let tag = self.read_u8().await?;
        match tag {
            TAG_UINT32 => Ok(Variant::UInt32(self.read_u32().await?)),
            TAG_STR => {
                let len = self.read_u32().await? as usize;
                let bytes = self.read_exact_vec(len).await?;
                let s = String::from_utf8(bytes)
                    .map_err(|e| DemoServerError::Protocol(format!("invalid utf8 variant: {e}")))?;
                Ok(Variant::Str(s))
            }
            TAG_BYTE_ARRAY => {
                let len = self.read_u32().await? as usize;
                Ok(Variant::ByteArray(self.read_exact_vec(len).await?))
            }
            other => Err(DemoServerError::Protocol(format!(
                "unknown variant tag {other}"
            ))),
        }
    }

    async fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        read_exact_timeout(&mut self.stream, &mut b).await?;
        Ok(b[0])
    }

    async fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        read_exact_timeout(&mut self.stream, &mut b).await?;
        Ok(u32::from_be_bytes(b))
    }

    async fn read_exact_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut v = vec![0u8; len];
        read_exact_timeout(&mut self.stream, &mut v).await?;
        Ok(v)
    }

    // --- Running message handler (§4.4) ---

    /// Drains every complete message currently buffered. Returns
    /// `(update_requested, full_update_requested)`: the latter is set when
    /// a viewer's `FramebufferUpdateRequest` declared `incremental = 0`,
    /// which per §3 forces a full-framebuffer resend rather than just the
    /// accumulated dirty rectangles.
    fn drain_running_messages(&mut self, buf: &mut BytesMut) -> Result<(bool, bool)> {
        let mut update_requested = false;
        let mut full_update_requested = false;
        loop {
            if buf.is_empty() {
                return Ok((update_requested, full_update_requested));
            }
            let msg_type = buf[0];

            match msg_type {
                CLIENT_MSG_SET_PIXEL_FORMAT => {
                    if buf.len() < 20 {
                        return Ok((update_requested, full_update_requested));
                    }
                    buf.advance(1);
                    buf.advance(3); // padding
                    let viewer_format = PixelFormat::from_bytes(buf)?;
                    self.other_endianness = PixelFormat::demo_normalized()
                        .has_opposite_endianness(&viewer_format);
                }
                CLIENT_MSG_SET_ENCODINGS => {
                    if buf.len() < 4 {
                        return Ok((update_requested, full_update_requested));
                    }
                    let count = u16::from_be_bytes([buf[2], buf[3]]) as usize;
                    let total = 4 + count * 4;
                    if buf.len() < total {
                        return Ok((update_requested, full_update_requested));
                    }
                    buf.advance(4);
                    for _ in 0..count {
                        let _encoding = buf.get_i32();
                    }
                }
                CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST => {
                    if buf.len() < 10 {
                        return Ok((update_requested, full_update_requested));
                    }
                    buf.advance(1);
                    let incremental = buf.get_u8() != 0;
                    let _x = buf.get_u16();
                    let _y = buf.get_u16();
                    let _w = buf.get_u16();
                    let _h = buf.get_u16();
                    update_requested = true;
                    if !incremental {
                        full_update_requested = true;
                    }
                }
                CLIENT_MSG_SET_SERVER_INPUT => {
                    if buf.len() < 4 {
                        return Ok((update_requested, full_update_requested));
                    }
                    buf.advance(1);
                    let _enable = buf.get_u8() != 0;
                    buf.advance(2); // padding
                }
                CLIENT_MSG_CLIENT_CUT_TEXT => {
                    if buf.len() < 8 {
                        return Ok((update_requested, full_update_requested));
                    }
                    let length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
                    let total = 8 + length;
                    if buf.len() < total {
                        return Ok((update_requested, full_update_requested));
                    }
                    buf.advance(total);
                }
                other => {
                    error!("viewer {} sent unknown message type {other}", self.id);
                    return Err(DemoServerError::Protocol(format!(
                        "unknown running-state message type {other}"
                    )));
                }
            }
        }
    }


    async fn handle_upstream_event(&self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::ImageChanged {
                x,
                y,
                width,
                height,
            } => {
                self.dirty
                    .lock()
                    .await
                    .push_rect(Rect::new(x, y, width, height));
            }
            UpstreamEvent::CursorShapeChanged {
                image,
                width,
                height,
                hotspot_x,
                hotspot_y,
            } => {
                self.dirty.lock().await.cursor = Some(CursorShape {
                    image,
                    width,
                    height,
                    hotspot_x,
                    hotspot_y,
                });
            }
            UpstreamEvent::FramebufferResized { width, height } => {
                warn!(
                    "viewer {} upstream resized to {width}x{height} mid-session; ignoring (ServerInit already sent)",
                    self.id
                );
            }
            UpstreamEvent::Disconnected => {
                warn!("viewer {}: upstream disconnected", self.id);
            }
        }
    }

    // --- Update send (§4.5) ---

    async fn maybe_send_update(&mut self, next_timer: &mut Option<Instant>) -> Result<()> {
        let (rects, cursor) = {
            let mut dirty = self.dirty.lock().await;
            if !dirty.full_update_pending && dirty.rects.is_empty() {
                if dirty.update_requested {
                    *next_timer = Some(Instant::now() + DEFER_UPDATE);
                }
                return Ok(());
            }

            let rects = if dirty.full_update_pending {
                vec![Rect::new(0, 0, self.fb_width, self.fb_height)]
            } else {
                coalesce(&dirty.rects)
            };
            let cursor = dirty.cursor.take();

            dirty.rects.clear();
            dirty.full_update_pending = false;
            let was_requested = dirty.update_requested;
            dirty.update_requested = false;

            if was_requested {
                *next_timer = Some(Instant::now() + KEEPALIVE_UPDATE);
            }

            (rects, cursor)
        };

        self.write_update(&rects, cursor.as_ref()).await
    }

    async fn write_update(&mut self, rects: &[Rect], cursor: Option<&CursorShape>) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_u8(SERVER_MSG_FRAMEBUFFER_UPDATE);
        buf.put_u8(0); // padding
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u16((rects.len() + usize::from(cursor.is_some())) as u16);

        for rect in rects {
            let pixels = {
                let fb = self.framebuffer.read().await;
                fb.copy_rect(rect.x, rect.y, rect.width, rect.height)
            };
            RectHeader {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                encoding: protocol::ENCODING_RLE_LZ,
            }
            .write_to(&mut buf);
            let payload =
                crate::codec::encode(&pixels, self.other_endianness, &mut self.codec_buffers)?;
            buf.put_slice(payload);
        }

        if let Some(cursor) = cursor {
            RectHeader {
                x: cursor.hotspot_x,
                y: cursor.hotspot_y,
                width: cursor.width,
                height: cursor.height,
                encoding: protocol::ENCODING_VEYON_CURSOR,
            }
            .write_to(&mut buf);
            let cursor_variant = VariantArray::new(vec![Variant::ByteArray((*cursor.image).clone())]);
            cursor_variant.write_to(&mut buf);
        }

        self.stream.write_all(&buf).await?;
        Ok(())
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::{shared, Framebuffer};
    use crate::variant::{Variant, VariantArray};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn max_rects_collapses_to_a_single_full_update() {
        let mut dirty = DirtyState::default();
        for i in 0..MAX_RECTS as u16 {
            dirty.push_rect(Rect::new(i, 0, 1, 1));
        }
        assert!(!dirty.full_update_pending);
        assert_eq!(dirty.rects.len(), MAX_RECTS);

        dirty.push_rect(Rect::new(200, 0, 1, 1));
        assert!(dirty.full_update_pending);
        assert!(dirty.rects.is_empty());
    }

    #[tokio::test]
    async fn non_incremental_update_request_forces_a_full_update() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let fb = shared(Framebuffer::new(4, 4));
        let (tx, rx) = broadcast::channel(16);
        let addr = listener.local_addr().unwrap();
        let (_client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (server_stream, _) = accepted.unwrap();
        let mut session = ViewerSession::new(1, server_stream, test_config("abc"), fb, rx);
        session.fb_width = 4;
        session.fb_height = 4;
        session.dirty.lock().await.push_rect(Rect::new(0, 0, 1, 1));

        let mut req = BytesMut::new();
        req.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
        req.put_u8(0); // incremental = false: full update requested
        req.put_u16(0);
        req.put_u16(0);
        req.put_u16(4);
        req.put_u16(4);

        let (update_requested, full_update_requested) =
            session.drain_running_messages(&mut req).unwrap();
        assert!(update_requested);
        assert!(full_update_requested);
        drop(tx);
    }

    fn test_config(viewer_token: &str) -> Arc<ServerConfig> {
        Arc::new(
            ServerConfig::new(0, "127.0.0.1", 11100, "upstream-token", viewer_token).unwrap(),
        )
    }

    /// Spawns a session for the next accepted connection. Returns the
    /// task handle alongside the event-channel sender: the caller must
    /// keep the sender alive for as long as the session should stay up,
    /// since a dropped sender closes the broadcast channel and the
    /// session treats that as `UpstreamDisconnected`.
    async fn spawn_one_session(
        listener: TcpListener,
        config: Arc<ServerConfig>,
        fb: SharedFramebuffer,
    ) -> (
        tokio::task::JoinHandle<Result<()>>,
        broadcast::Sender<UpstreamEvent>,
    ) {
        let (tx, rx) = broadcast::channel(16);
        let handle = tokio::spawn(async move {
            let (stream, _addr) = listener.accept().await?;
            ViewerSession::new(1, stream, config, fb, rx).run().await
        });
        (handle, tx)
    }

    async fn read_n(stream: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();
        buf
    }

    async fn connect_and_exchange_version(addr: std::net::SocketAddr) -> TcpStream {
        let mut client = TcpStream::connect(addr).await.unwrap();
        // The server writes its version first; a real viewer waits for it
        // before replying with its own.
        let server_version = read_n(&mut client, protocol::PROTOCOL_VERSION_LEN).await;
        assert_eq!(server_version, protocol::PROTOCOL_VERSION.as_bytes());
        client
            .write_all(protocol::PROTOCOL_VERSION.as_bytes())
            .await
            .unwrap();
        client
    }

    async fn write_variant_array(stream: &mut TcpStream, array: &VariantArray) {
        let mut buf = BytesMut::new();
        array.write_to(&mut buf);
        stream.write_all(&buf).await.unwrap();
    }

    #[tokio::test]
    async fn full_handshake_then_update_request_yields_one_full_screen_rect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let fb = shared(Framebuffer::new(8, 6));
        let (server, _events_tx) = spawn_one_session(listener, test_config("abc"), fb).await;

        let mut client = connect_and_exchange_version(addr).await;

        // SecurityType: count=1, type=Veyon.
        let sec = read_n(&mut client, 2).await;
        assert_eq!(sec, vec![1, SECURITY_TYPE_VEYON]);
        client.write_all(&[SECURITY_TYPE_VEYON]).await.unwrap();

        // AuthTypes: one-element variant array naming Token.
        let count = u32::from_be_bytes(read_n(&mut client, 4).await.try_into().unwrap());
        assert_eq!(count, 1);
        let tag = read_n(&mut client, 1).await;
        assert_eq!(tag, vec![0]); // UInt32 tag
        let auth_type = u32::from_be_bytes(read_n(&mut client, 4).await.try_into().unwrap());
        assert_eq!(auth_type, AUTH_TYPE_TOKEN);

        let selection =
            VariantArray::new(vec![Variant::UInt32(auth_type), Variant::Str("tester".into())]);
        write_variant_array(&mut client, &selection).await;

        // Ack: empty variant array.
        let ack_count = u32::from_be_bytes(read_n(&mut client, 4).await.try_into().unwrap());
        assert_eq!(ack_count, 0);

        write_variant_array(&mut client, &VariantArray::token("abc")).await;

        // Security result: 0 == OK.
        let result = u32::from_be_bytes(read_n(&mut client, 4).await.try_into().unwrap());
        assert_eq!(result, SECURITY_RESULT_OK);

        // ClientInit: shared flag, ignored.
        client.write_all(&[0]).await.unwrap();

        // ServerInit.
        let width = u16::from_be_bytes(read_n(&mut client, 2).await.try_into().unwrap());
        let height = u16::from_be_bytes(read_n(&mut client, 2).await.try_into().unwrap());
        assert_eq!((width, height), (8, 6));
        let _pixel_format = read_n(&mut client, 16).await;
        let name_len = u32::from_be_bytes(read_n(&mut client, 4).await.try_into().unwrap());
        let name = read_n(&mut client, name_len as usize).await;
        assert_eq!(name, protocol::DESKTOP_NAME.as_bytes());

        // Request an update; the full-screen rect queued at ClientInit
        // should come back as exactly one rectangle.
        let mut req = vec![CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST, 0];
        req.extend_from_slice(&0u16.to_be_bytes());
        req.extend_from_slice(&0u16.to_be_bytes());
        req.extend_from_slice(&8u16.to_be_bytes());
        req.extend_from_slice(&6u16.to_be_bytes());
        client.write_all(&req).await.unwrap();

        let header = read_n(&mut client, 4).await;
        assert_eq!(header[0], SERVER_MSG_FRAMEBUFFER_UPDATE);
        let rect_count = u16::from_be_bytes([header[2], header[3]]);
        assert_eq!(rect_count, 1);

        let rect_header = read_n(&mut client, 12).await;
        let rx = u16::from_be_bytes([rect_header[0], rect_header[1]]);
        let ry = u16::from_be_bytes([rect_header[2], rect_header[3]]);
        let rw = u16::from_be_bytes([rect_header[4], rect_header[5]]);
        let rh = u16::from_be_bytes([rect_header[6], rect_header[7]]);
        let encoding = i32::from_be_bytes([
            rect_header[8],
            rect_header[9],
            rect_header[10],
            rect_header[11],
        ]);
        assert_eq!((rx, ry, rw, rh), (0, 0, 8, 6));
        assert_eq!(encoding, protocol::ENCODING_RLE_LZ);

        server.abort();
    }

    #[tokio::test]
    async fn empty_token_is_rejected_with_no_auth_ok_written() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let fb = shared(Framebuffer::new(4, 4));
        let (server, _events_tx) = spawn_one_session(listener, test_config("abc"), fb).await;

        let mut client = connect_and_exchange_version(addr).await;
        let _sec = read_n(&mut client, 2).await;
        client.write_all(&[SECURITY_TYPE_VEYON]).await.unwrap();
        let _auth_types = read_n(&mut client, 9).await;

        let selection =
            VariantArray::new(vec![Variant::UInt32(AUTH_TYPE_TOKEN), Variant::Str("x".into())]);
        write_variant_array(&mut client, &selection).await;
        let _ack = read_n(&mut client, 4).await;

        write_variant_array(&mut client, &VariantArray::token("")).await;

        // The server must close without ever writing the 4-byte auth
        // result: any further read hits EOF, not a successful 4 bytes.
        let mut buf = [0u8; 4];
        let err = client.read_exact(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

        let outcome = server.await.unwrap();
        assert!(matches!(outcome, Err(DemoServerError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn wrong_security_type_closes_the_socket_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let fb = shared(Framebuffer::new(4, 4));
        let (server, _events_tx) = spawn_one_session(listener, test_config("abc"), fb).await;

        let mut client = connect_and_exchange_version(addr).await;
        let _sec = read_n(&mut client, 2).await;
        client.write_all(&[SECURITY_TYPE_VEYON + 1]).await.unwrap();

        let mut buf = [0u8; 1];
        let err = client.read_exact(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

        let outcome = server.await.unwrap();
        assert!(matches!(outcome, Err(DemoServerError::Protocol(_))));
    }
}
