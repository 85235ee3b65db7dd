use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Network error type covering connection, DNS, and TLS failures.
///
/// Variants carrying context (`ConnectionFailedTo`, `NameNotResolvedFor`,
/// `DnsLookupFailed`, `AllAttemptsFailed`) render the user-visible failure
/// messages; the bare variants classify low-level socket conditions.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    // Connection errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("Address invalid")]
    AddressInvalid,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Address in use")]
    AddressInUse,

    // URI errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Disallowed URL scheme")]
    DisallowedUrlScheme,

    // DNS errors
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("DNS resolution disabled")]
    DnsDisabled,

    // TLS errors
    #[error("TLS protocol error")]
    TlsProtocolError,
    #[error("Connection lost during TLS handshake")]
    HandshakeEof,

    // Cancellation
    #[error("Operation cancelled")]
    Cancelled,

    // Listener isolation
    #[error("Listener panicked while handling {event} event")]
    ListenerPanicked { event: &'static str },

    // Context-rich errors
    #[error("Connection to {host}:{port} failed: {source}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("DNS resolution for {domain} failed: {source}")]
    NameNotResolvedFor {
        domain: String,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("TLS handshake with {host} failed: {reason}")]
    TlsHandshakeFailedWith { host: String, reason: String },
    #[error("Connection to {uri} failed during DNS lookup: {detail}")]
    DnsLookupFailed { uri: String, detail: String },
    #[error("Connection to {uri} failed: {detail}")]
    AllAttemptsFailed { uri: String, detail: String },
}

impl NetError {
    // Helper constructors for context-rich errors

    /// Create a connection-failed error with host and port context.
    pub fn connection_failed_to(host: impl Into<String>, port: u16, source: io::Error) -> Self {
        Self::ConnectionFailedTo {
            host: host.into(),
            port,
            source: Arc::new(source),
        }
    }

    /// Create a DNS resolution error with domain context.
    pub fn dns_failed(domain: impl Into<String>, source: io::Error) -> Self {
        Self::NameNotResolvedFor {
            domain: domain.into(),
            source: Arc::new(source),
        }
    }

    /// Create a TLS handshake error with host context.
    pub fn tls_handshake_failed(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TlsHandshakeFailedWith {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Create the aggregate error for a connect where every DNS lookup
    /// settled without producing a single address candidate.
    pub fn dns_lookup_failed(uri: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DnsLookupFailed {
            uri: uri.into(),
            detail: detail.into(),
        }
    }

    /// Create the aggregate error for a connect where every launched
    /// attempt failed.
    pub fn all_attempts_failed(uri: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::AllAttemptsFailed {
            uri: uri.into(),
            detail: detail.into(),
        }
    }

    /// True if this error is the terminal cancellation marker.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NetError::Cancelled)
    }
}

impl From<io::Error> for NetError {
    fn from(e: io::Error) -> Self {
        use io::ErrorKind;
        match e.kind() {
            ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            ErrorKind::ConnectionReset => Self::ConnectionReset,
            ErrorKind::ConnectionAborted => Self::ConnectionAborted,
            ErrorKind::NotConnected => Self::SocketNotConnected,
            ErrorKind::AddrInUse => Self::AddressInUse,
            ErrorKind::AddrNotAvailable => Self::AddressUnreachable,
            ErrorKind::TimedOut => Self::ConnectionTimedOut,
            ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::ConnectionFailed,
        }
    }
}

impl From<url::ParseError> for NetError {
    fn from(_: url::ParseError) -> Self {
        Self::InvalidUrl
    }
}
