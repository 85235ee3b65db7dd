//! The base TCP connector.
//!
//! [`TcpConnector`] is the lowest rung of the connect pipeline: it accepts
//! only URIs whose host is already an IP literal, performs a non-blocking
//! connect bounded by its timeout, and hands back a [`Connection`]. DNS
//! names never reach this layer — resolution and racing happen above it.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use url::{Host, Url};

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::connection::Connection;
use crate::socket::stream::Transport;

/// Default bound on a single TCP connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Alias for the `Future` type returned by a dialer.
pub type Dialing = Pin<Box<dyn Future<Output = Result<Connection, NetError>> + Send>>;

/// Trait for establishing a single connection to a literal address.
///
/// Mirrors the shape of [`crate::dns::Resolve`]: `&self`, boxed future,
/// usable behind an `Arc`. Dropping the returned future aborts the
/// in-flight connect and closes the half-open socket.
pub trait Dial: Send + Sync {
    fn dial(&self, url: Url) -> Dialing;
}

/// Blanket implementation for Arc-wrapped dialers.
impl<D: Dial + ?Sized> Dial for Arc<D> {
    fn dial(&self, url: Url) -> Dialing {
        (**self).dial(url)
    }
}

/// Connects `tcp://` URIs with an IP-literal host.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Dial for TcpConnector {
    fn dial(&self, url: Url) -> Dialing {
        let timeout = self.connect_timeout;
        Box::pin(async move {
            if url.scheme() != "tcp" {
                return Err(NetError::DisallowedUrlScheme);
            }
            let addr = literal_addr(&url)?;
            let server_name = url
                .query_pairs()
                .find(|(key, _)| key == "hostname")
                .map(|(_, value)| value.into_owned());

            tracing::debug!(%addr, "starting TCP connect");
            let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .unwrap_or_else(|_| {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "connect timed out",
                    ))
                })
                .connection_context(addr)?;

            let peer_addr = stream.peer_addr().map_err(NetError::from)?;
            tracing::debug!(%peer_addr, "TCP connect complete");
            Ok(Connection::new(
                Transport::Tcp(stream),
                peer_addr,
                server_name,
            ))
        })
    }
}

/// Extract the socket address from a URI whose host must already be an
/// IP literal. Hostnames are rejected — they belong to the layers above.
fn literal_addr(url: &Url) -> Result<SocketAddr, NetError> {
    let ip: IpAddr = match url.host() {
        Some(Host::Ipv4(ip)) => ip.into(),
        Some(Host::Ipv6(ip)) => ip.into(),
        Some(Host::Domain(_)) => return Err(NetError::AddressInvalid),
        None => return Err(NetError::InvalidUrl),
    };
    let port = url.port().ok_or(NetError::InvalidUrl)?;
    Ok(SocketAddr::new(ip, port))
}
