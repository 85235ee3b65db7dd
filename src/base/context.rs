//! Ergonomic error context helpers.
//!
//! Extension trait turning bare `io::Result`s into context-rich
//! [`NetError`] values at the point where the address or domain is still
//! known.

use crate::base::neterror::NetError;
use std::io;
use std::net::SocketAddr;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Attach the dialled address to a connect error.
    ///
    /// # Example
    /// ```ignore
    /// use netdial::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await.connection_context(addr)?;
    /// // Error: "Connection to 93.184.216.34:443 failed: connection refused"
    /// ```
    fn connection_context(self, addr: SocketAddr) -> Result<T, NetError>;

    /// Attach the looked-up domain to a resolution error.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, addr: SocketAddr) -> Result<T, NetError> {
        self.map_err(|e| NetError::connection_failed_to(addr.ip().to_string(), addr.port(), e))
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::dns_failed(domain, e))
    }
}
