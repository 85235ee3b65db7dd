//! The evented duplex connection.
//!
//! A [`Connection`] is a handle; the transport itself is owned by a pump
//! task that flushes queued writes, reads inbound bytes in bounded chunks,
//! and dispatches `data`/`end`/`close`/`error` events to registered
//! listeners. Control messages (write, pause, resume, close, detach,
//! attach) travel over an unbounded channel, so every handle method is
//! non-blocking.
//!
//! Event ordering: `data` chunks arrive in byte order; `end` precedes
//! `close` on EOF; `error` precedes `close` on failure; after `close` no
//! further events are emitted. A panicking listener is caught and
//! reported on the `error` channel rather than taking down the pump.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Poll;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, oneshot};

use crate::base::neterror::NetError;
use crate::socket::stream::Transport;

/// Upper bound on a single `data` chunk.
const READ_CHUNK: usize = 8 * 1024;

type DataListener = Box<dyn FnMut(&Bytes) + Send>;
type EventListener = Box<dyn FnMut() + Send>;
type ErrorListener = Box<dyn FnMut(&NetError) + Send>;

#[derive(Default)]
struct Listeners {
    data: Vec<DataListener>,
    end: Vec<EventListener>,
    close: Vec<EventListener>,
    error: Vec<ErrorListener>,
}

pub(crate) enum Ctrl {
    Write(Bytes),
    Pause,
    Resume,
    Close,
    Detach(oneshot::Sender<Transport>),
    Attach(Transport, bool),
}

/// An established, evented duplex byte stream.
///
/// Created by a connector with an already-connected transport. Dropping
/// the handle shuts the pump down and releases the stream.
pub struct Connection {
    ctrl: mpsc::UnboundedSender<Ctrl>,
    shared: Arc<Shared>,
    peer_addr: SocketAddr,
    server_name: Option<String>,
}

impl Connection {
    pub(crate) fn new(
        transport: Transport,
        peer_addr: SocketAddr,
        server_name: Option<String>,
    ) -> Self {
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            listeners: Mutex::new(Listeners::default()),
            encryption_enabled: AtomicBool::new(transport.is_encrypted()),
            closed: AtomicBool::new(false),
        });

        let pump = Pump {
            transport: Some(transport),
            ctrl: ctrl_rx,
            shared: shared.clone(),
            paused: false,
            outbound: VecDeque::new(),
        };
        tokio::spawn(pump.run());

        Self {
            ctrl: ctrl_tx,
            shared,
            peer_addr,
            server_name,
        }
    }

    /// Adopt an already-connected TCP stream — typically one accepted by
    /// a listener — turning it into an evented connection. The server side
    /// of a TLS upgrade starts here.
    pub fn from_tcp(stream: tokio::net::TcpStream) -> Result<Self, NetError> {
        let peer_addr = stream.peer_addr().map_err(NetError::from)?;
        Ok(Self::new(Transport::Tcp(stream), peer_addr, None))
    }

    /// Register a listener for inbound data chunks.
    pub fn on_data(&self, listener: impl FnMut(&Bytes) + Send + 'static) {
        self.shared.listeners.lock().unwrap().data.push(Box::new(listener));
    }

    /// Register a listener for the remote end-of-stream.
    pub fn on_end(&self, listener: impl FnMut() + Send + 'static) {
        self.shared.listeners.lock().unwrap().end.push(Box::new(listener));
    }

    /// Register a listener invoked exactly once when the connection closes.
    pub fn on_close(&self, listener: impl FnMut() + Send + 'static) {
        self.shared.listeners.lock().unwrap().close.push(Box::new(listener));
    }

    /// Register a listener for stream errors.
    pub fn on_error(&self, listener: impl FnMut(&NetError) + Send + 'static) {
        self.shared.listeners.lock().unwrap().error.push(Box::new(listener));
    }

    /// Queue `data` for transmission. The pump flushes the outbound buffer
    /// as the stream accepts bytes. Returns the number of bytes accepted;
    /// zero once the connection is closed.
    pub fn write(&self, data: impl Into<Bytes>) -> usize {
        if self.is_closed() {
            return 0;
        }
        let data = data.into();
        let len = data.len();
        match self.ctrl.send(Ctrl::Write(data)) {
            Ok(()) => len,
            Err(_) => 0,
        }
    }

    /// Stop delivering `data` events. Inbound bytes stay in the kernel
    /// buffer, preserving backpressure.
    pub fn pause(&self) {
        let _ = self.ctrl.send(Ctrl::Pause);
    }

    /// Resume delivering `data` events.
    pub fn resume(&self) {
        let _ = self.ctrl.send(Ctrl::Resume);
    }

    /// Close the connection. Idempotent; `close` is emitted exactly once.
    pub fn close(&self) {
        let _ = self.ctrl.send(Ctrl::Close);
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The hostname this connection was dialled for, recovered from the
    /// attempt URI's `hostname` query parameter. Used as the SNI name by
    /// the TLS upgrade layer.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// True once a TLS handshake has completed on this connection.
    pub fn encryption_enabled(&self) -> bool {
        self.shared.encryption_enabled.load(Ordering::SeqCst)
    }

    /// True once `close` has been emitted.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Take the transport away from the pump. While detached, no `data`
    /// events are delivered; queued writes accumulate until reattach.
    pub(crate) async fn detach_transport(&self) -> Result<Transport, NetError> {
        let (tx, rx) = oneshot::channel();
        self.ctrl
            .send(Ctrl::Detach(tx))
            .map_err(|_| NetError::SocketNotConnected)?;
        rx.await.map_err(|_| NetError::SocketNotConnected)
    }

    /// Hand a transport back to the pump. `encrypted` marks the connection
    /// as TLS-enabled from this point on.
    pub(crate) fn attach_transport(&self, transport: Transport, encrypted: bool) {
        let _ = self.ctrl.send(Ctrl::Attach(transport, encrypted));
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("server_name", &self.server_name)
            .field("encryption_enabled", &self.encryption_enabled())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct Shared {
    listeners: Mutex<Listeners>,
    encryption_enabled: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn emit_data(&self, chunk: &Bytes) {
        if self.is_closed() {
            return;
        }
        let mut current = std::mem::take(&mut self.listeners.lock().unwrap().data);
        let mut panicked = false;
        for listener in current.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| listener(chunk))).is_err() {
                panicked = true;
            }
        }
        self.restore_data(current);
        if panicked {
            self.emit_error(&NetError::ListenerPanicked { event: "data" });
        }
    }

    fn emit_end(&self) {
        if self.is_closed() {
            return;
        }
        let mut current = std::mem::take(&mut self.listeners.lock().unwrap().end);
        let mut panicked = false;
        for listener in current.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                panicked = true;
            }
        }
        let mut guard = self.listeners.lock().unwrap();
        let added = std::mem::replace(&mut guard.end, current);
        guard.end.extend(added);
        drop(guard);
        if panicked {
            self.emit_error(&NetError::ListenerPanicked { event: "end" });
        }
    }

    fn emit_error(&self, error: &NetError) {
        if self.is_closed() {
            return;
        }
        let mut current = std::mem::take(&mut self.listeners.lock().unwrap().error);
        for listener in current.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| listener(error))).is_err() {
                tracing::warn!("error listener panicked");
            }
        }
        let mut guard = self.listeners.lock().unwrap();
        let added = std::mem::replace(&mut guard.error, current);
        guard.error.extend(added);
    }

    fn emit_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut current = std::mem::take(&mut self.listeners.lock().unwrap().close);
        for listener in current.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                tracing::warn!("close listener panicked");
            }
        }
    }

    fn restore_data(&self, current: Vec<DataListener>) {
        let mut guard = self.listeners.lock().unwrap();
        let added = std::mem::replace(&mut guard.data, current);
        guard.data.extend(added);
    }
}

enum Step {
    Ctrl(Ctrl),
    Data(Bytes),
    Eof,
    Failed(io::Error),
    Hangup,
}

struct Pump {
    transport: Option<Transport>,
    ctrl: mpsc::UnboundedReceiver<Ctrl>,
    shared: Arc<Shared>,
    paused: bool,
    outbound: VecDeque<Bytes>,
}

impl Pump {
    async fn run(mut self) {
        loop {
            let step = if self.transport.is_some() {
                self.drive_io().await
            } else {
                // Detached: the TLS layer owns the stream. Park on control
                // traffic until it comes back.
                match self.ctrl.recv().await {
                    Some(ctrl) => Step::Ctrl(ctrl),
                    None => Step::Hangup,
                }
            };

            match step {
                Step::Ctrl(Ctrl::Write(data)) => self.outbound.push_back(data),
                Step::Ctrl(Ctrl::Pause) => self.paused = true,
                Step::Ctrl(Ctrl::Resume) => self.paused = false,
                Step::Ctrl(Ctrl::Close) => {
                    self.shutdown_transport().await;
                    self.shared.emit_close();
                    break;
                }
                Step::Ctrl(Ctrl::Detach(reply)) => match self.transport.take() {
                    Some(transport) => {
                        if let Err(transport) = reply.send(transport) {
                            // Requester vanished before taking the stream.
                            self.transport = Some(transport);
                        }
                    }
                    None => drop(reply),
                },
                Step::Ctrl(Ctrl::Attach(transport, encrypted)) => {
                    if encrypted {
                        self.shared.encryption_enabled.store(true, Ordering::SeqCst);
                    }
                    self.transport = Some(transport);
                }
                Step::Data(chunk) => self.shared.emit_data(&chunk),
                Step::Eof => {
                    tracing::trace!("remote end of stream");
                    self.transport = None;
                    self.shared.emit_end();
                    self.shared.emit_close();
                    break;
                }
                Step::Failed(err) => {
                    tracing::debug!(error = %err, "stream failed");
                    self.shutdown_transport().await;
                    self.shared.emit_error(&NetError::from(err));
                    self.shared.emit_close();
                    break;
                }
                Step::Hangup => {
                    // Every handle is gone; release the stream.
                    self.shutdown_transport().await;
                    self.shared.emit_close();
                    break;
                }
            }
        }
    }

    /// One step of transport I/O: control messages first, then a flush of
    /// the outbound buffer, then (unless paused) a bounded read.
    async fn drive_io(&mut self) -> Step {
        std::future::poll_fn(|cx| {
            match self.ctrl.poll_recv(cx) {
                Poll::Ready(Some(ctrl)) => return Poll::Ready(Step::Ctrl(ctrl)),
                Poll::Ready(None) => return Poll::Ready(Step::Hangup),
                Poll::Pending => {}
            }

            let transport = self
                .transport
                .as_mut()
                .expect("drive_io requires an attached transport");

            while let Some(front) = self.outbound.front_mut() {
                match Pin::new(&mut *transport).poll_write(cx, front) {
                    Poll::Ready(Ok(0)) => {
                        return Poll::Ready(Step::Failed(io::ErrorKind::WriteZero.into()));
                    }
                    Poll::Ready(Ok(n)) => {
                        front.advance(n);
                        if front.is_empty() {
                            self.outbound.pop_front();
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Step::Failed(e)),
                    Poll::Pending => break,
                }
            }

            if !self.paused {
                let mut chunk = [0u8; READ_CHUNK];
                let mut buf = ReadBuf::new(&mut chunk);
                match Pin::new(&mut *transport).poll_read(cx, &mut buf) {
                    Poll::Ready(Ok(())) => {
                        let filled = buf.filled();
                        return if filled.is_empty() {
                            Poll::Ready(Step::Eof)
                        } else {
                            Poll::Ready(Step::Data(Bytes::copy_from_slice(filled)))
                        };
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Step::Failed(e)),
                    Poll::Pending => {}
                }
            }

            Poll::Pending
        })
        .await
    }

    async fn shutdown_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut transport).await;
        }
    }
}
