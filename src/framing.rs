//! Timed, exact-length reads from an async byte stream.
//!
//! Every handshake record in this protocol is fixed-length or
//! length-prefixed, and a stalled viewer must not be allowed to wedge a
//! session open forever. [`read_exact_timeout`] mirrors the reference
//! server's five-second read timeout: a partial read past the deadline is
//! reported as a [`DemoServerError::ShortRead`], distinguishing it from a
//! clean EOF or a hard I/O error.

use crate::error::{DemoServerError, Result};
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// How long a single handshake read may block before giving up.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads exactly `buf.len()` bytes from `stream`, failing if the read
/// takes longer than [`READ_TIMEOUT`].
///
/// # Errors
///
/// Returns [`DemoServerError::ShortRead`] if the timeout elapses before
/// the buffer fills, or [`DemoServerError::Io`] if the stream itself
/// fails or closes early.
pub async fn read_exact_timeout<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: tokio::io::AsyncRead + Unpin,
{
    match tokio::time::timeout(READ_TIMEOUT, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(DemoServerError::ConnectionClosed)
        }
        Ok(Err(e)) => Err(DemoServerError::Io(e)),
        Err(_elapsed) => Err(DemoServerError::ShortRead {
            expected: buf.len(),
            got: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_exact_bytes_when_available() {
        let (mut client, mut server) = duplex(64);
        client.write_all(b"hello!!!").await.unwrap();

        let mut buf = [0u8; 8];
        read_exact_timeout(&mut server, &mut buf).await.unwrap();
        assert_eq!(&buf, b"hello!!!");
    }

    #[tokio::test]
    async fn reports_clean_close_as_connection_closed() {
        let (client, mut server) = duplex(64);
        drop(client);

        let mut buf = [0u8; 4];
        let err = read_exact_timeout(&mut server, &mut buf).await.unwrap_err();
        assert!(matches!(err, DemoServerError::ConnectionClosed));
    }
}
