//! Transport abstraction for plain and encrypted sockets.
//!
//! [`Transport`] lets the connection pump treat plain TCP and TLS streams
//! uniformly. [`LoanedTcp`] keeps the raw TCP stream in a shared slot while
//! the TLS layer drives the handshake: if the handshake fails or is
//! cancelled, the untouched stream is reclaimed from the slot and handed
//! back to the pump.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// The owned byte stream underneath a connection.
pub enum Transport {
    Tcp(TcpStream),
    Tls(tokio_boring::SslStream<LoanedTcp>),
}

impl Transport {
    /// True for the TLS variant.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Lightweight liveness probe: checks that the socket still has a
    /// peer. Does not consume any buffered bytes.
    pub fn is_connected(&self) -> bool {
        match self {
            Transport::Tcp(s) => s.peer_addr().is_ok(),
            Transport::Tls(s) => s.get_ref().is_connected(),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp(_) => f.write_str("Transport::Tcp"),
            Transport::Tls(_) => f.write_str("Transport::Tls"),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A TCP stream on loan to the TLS layer.
///
/// The stream lives in a shared slot; every I/O poll borrows it for the
/// duration of the poll only. [`LoanedTcp::reclaim`] empties the slot,
/// after which further I/O fails with `NotConnected` — by then the only
/// holders are a dropped handshake future, so nothing observes it.
#[derive(Clone, Debug)]
pub struct LoanedTcp {
    slot: Arc<Mutex<Option<TcpStream>>>,
}

impl LoanedTcp {
    pub(crate) fn new(stream: TcpStream) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(stream))),
        }
    }

    /// Take the stream back out of the slot.
    pub(crate) fn reclaim(&self) -> Option<TcpStream> {
        self.slot.lock().unwrap().take()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.peer_addr().is_ok())
            .unwrap_or(false)
    }

    fn with_stream<R>(
        &self,
        f: impl FnOnce(Pin<&mut TcpStream>) -> Poll<io::Result<R>>,
    ) -> Poll<io::Result<R>> {
        let mut slot = self.slot.lock().unwrap();
        match slot.as_mut() {
            Some(stream) => f(Pin::new(stream)),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream was reclaimed",
            ))),
        }
    }
}

impl AsyncRead for LoanedTcp {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.with_stream(|s| s.poll_read(cx, buf))
    }
}

impl AsyncWrite for LoanedTcp {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.with_stream(|s| s.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.with_stream(|s| s.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.with_stream(|s| s.poll_shutdown(cx))
    }
}
