//! Connections and connectors.
//!
//! The connection machinery, bottom up:
//! - [`stream`]: the owned transport (plain TCP or TLS) and the loanable
//!   stream slot used during handshakes
//! - [`connection`]: the evented duplex [`connection::Connection`]
//! - [`tcp`]: the base connector — IP-literal URI to connected socket
//! - [`happy_eyeballs`]: RFC 8305 dual-stack connection racing
//! - [`tls`]: in-place TLS upgrade of an established connection
//! - [`connector`]: the facade dispatching on scheme and host form

pub mod connection;
pub mod connector;
pub mod happy_eyeballs;
pub mod stream;
pub mod tcp;
pub mod tls;
