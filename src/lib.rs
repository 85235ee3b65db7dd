//! # netdial
//!
//! An asynchronous socket connection library for Rust.
//!
//! `netdial` turns a URI into an established, evented byte stream. Hostnames
//! are resolved over both address families in parallel and connection
//! attempts are raced according to Happy Eyeballs v2 (RFC 8305); `tls://`
//! URIs are upgraded in place once the TCP stream is established.
//!
//! ## Features
//!
//! - **Happy Eyeballs v2**: parallel AAAA/A resolution, 50 ms resolution
//!   delay, interleaved dual-stack candidates, 250 ms staggered attempts
//! - **Evented connections**: `data`/`end`/`close`/`error` listeners over a
//!   pump-driven duplex stream with pause/resume backpressure
//! - **In-place TLS upgrade**: BoringSSL handshake on an already-connected
//!   stream, client or server role, cancellable without losing the socket
//! - **Cooperative cancellation**: every connect returns a [`Pending`]
//!   handle tied to a [`CancelToken`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use netdial::Connector;
//!
//! #[tokio::main]
//! async fn main() {
//!     let connector = Connector::new();
//!     let conn = connector.connect("tls://example.com:443").await.unwrap();
//!     conn.on_data(|chunk| println!("{} bytes", chunk.len()));
//!     conn.write(&b"hello"[..]);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Errors, cancellation, and the pending-result handle
//! - [`dns`] - Per-family DNS resolution (`Resolve` trait + implementations)
//! - [`socket`] - Connections, connectors, Happy Eyeballs, and TLS upgrade

pub mod base;
pub mod dns;
pub mod socket;

pub use base::cancel::CancelToken;
pub use base::neterror::NetError;
pub use base::pending::Pending;
pub use socket::connection::Connection;
pub use socket::connector::{Connector, ConnectorBuilder, ConnectorOptions};
pub use socket::happy_eyeballs::HappyEyeballs;
pub use socket::tcp::{Dial, TcpConnector};
pub use socket::tls::{StreamEncryption, TlsConfig, TlsIdentity, TlsRole, TlsVersion};
