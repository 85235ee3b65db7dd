//! In-place TLS upgrade of an established connection.
//!
//! [`StreamEncryption`] borrows a [`Connection`] for the duration of the
//! handshake: the transport is detached from the pump (so no `data` events
//! can reach user code mid-handshake), BoringSSL drives the exchange, and
//! the upgraded — or, on failure and cancellation, the original — stream
//! is handed back before the caller observes the outcome. A cancelled
//! handshake therefore leaves the raw socket open and reusable.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use boring::pkey::PKey;
use boring::ssl::{SslAcceptor, SslConnector, SslMethod, SslVerifyMode};
use boring::x509::X509;

use crate::base::cancel::CancelToken;
use crate::base::neterror::NetError;
use crate::socket::connection::Connection;
use crate::socket::stream::{LoanedTcp, Transport};

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsVersion(pub(crate) boring::ssl::SslVersion);

impl TlsVersion {
    /// TLS 1.0
    pub const TLS_1_0: TlsVersion = TlsVersion(boring::ssl::SslVersion::TLS1);
    /// TLS 1.1
    pub const TLS_1_1: TlsVersion = TlsVersion(boring::ssl::SslVersion::TLS1_1);
    /// TLS 1.2
    pub const TLS_1_2: TlsVersion = TlsVersion(boring::ssl::SslVersion::TLS1_2);
    /// TLS 1.3
    pub const TLS_1_3: TlsVersion = TlsVersion(boring::ssl::SslVersion::TLS1_3);
}

/// A server identity: certificate chain and private key, both PEM.
#[derive(Clone)]
pub struct TlsIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl TlsIdentity {
    pub fn from_pem(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &format_args!("<redacted>"))
            .finish()
    }
}

/// TLS upgrade configuration.
///
/// The protocol bounds are the "crypto method": leaving them at their
/// defaults negotiates the newest version both sides support.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub min_version: Option<TlsVersion>,
    pub max_version: Option<TlsVersion>,
    pub alpn_protos: Vec<String>,
    pub verify_peer: bool,
    /// Override for the SNI name; defaults to the connection's
    /// `server_name` recovered from the attempt URI.
    pub sni_hostname: Option<String>,
    pub ca_file: Option<PathBuf>,
    /// Required for the server role.
    pub identity: Option<TlsIdentity>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: Some(TlsVersion::TLS_1_2),
            max_version: None,
            alpn_protos: Vec::new(),
            verify_peer: true,
            sni_hostname: None,
            ca_file: None,
            identity: None,
        }
    }
}

impl TlsConfig {
    fn client_connector(&self) -> Result<SslConnector, NetError> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|_| NetError::TlsProtocolError)?;

        if let Some(min) = self.min_version {
            builder
                .set_min_proto_version(Some(min.0))
                .map_err(|_| NetError::TlsProtocolError)?;
        }
        if let Some(max) = self.max_version {
            builder
                .set_max_proto_version(Some(max.0))
                .map_err(|_| NetError::TlsProtocolError)?;
        }

        if !self.alpn_protos.is_empty() {
            builder
                .set_alpn_protos(&alpn_wire_format(&self.alpn_protos)?)
                .map_err(|_| NetError::TlsProtocolError)?;
        }

        if let Some(ca_file) = &self.ca_file {
            builder
                .set_ca_file(ca_file)
                .map_err(|_| NetError::TlsProtocolError)?;
        }

        if self.verify_peer {
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(builder.build())
    }

    fn server_acceptor(&self) -> Result<SslAcceptor, NetError> {
        let identity = self.identity.as_ref().ok_or(NetError::TlsProtocolError)?;

        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())
            .map_err(|_| NetError::TlsProtocolError)?;

        if let Some(min) = self.min_version {
            builder
                .set_min_proto_version(Some(min.0))
                .map_err(|_| NetError::TlsProtocolError)?;
        }
        if let Some(max) = self.max_version {
            builder
                .set_max_proto_version(Some(max.0))
                .map_err(|_| NetError::TlsProtocolError)?;
        }

        let cert = X509::from_pem(&identity.cert_pem).map_err(|_| NetError::TlsProtocolError)?;
        let key = PKey::private_key_from_pem(&identity.key_pem)
            .map_err(|_| NetError::TlsProtocolError)?;
        builder
            .set_certificate(&cert)
            .map_err(|_| NetError::TlsProtocolError)?;
        builder
            .set_private_key(&key)
            .map_err(|_| NetError::TlsProtocolError)?;
        builder
            .check_private_key()
            .map_err(|_| NetError::TlsProtocolError)?;

        Ok(builder.build())
    }
}

/// Encode ALPN protocol names into the TLS wire format.
fn alpn_wire_format(protos: &[String]) -> Result<Vec<u8>, NetError> {
    let mut wire = Vec::new();
    for proto in protos {
        if proto.len() > 255 {
            return Err(NetError::TlsProtocolError);
        }
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }
    Ok(wire)
}

/// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
fn should_set_sni(host: &str) -> bool {
    host.parse::<IpAddr>().is_err()
}

/// Handshake role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    Client,
    Server,
}

/// Drives a TLS handshake over an established [`Connection`].
///
/// The role is fixed at construction; the crypto method is read from the
/// config once per `enable` call.
#[derive(Debug, Clone)]
pub struct StreamEncryption {
    role: TlsRole,
    config: TlsConfig,
}

impl StreamEncryption {
    pub fn client(config: TlsConfig) -> Self {
        Self {
            role: TlsRole::Client,
            config,
        }
    }

    pub fn server(config: TlsConfig) -> Self {
        Self {
            role: TlsRole::Server,
            config,
        }
    }

    pub fn role(&self) -> TlsRole {
        self.role
    }

    /// Upgrade `conn` to TLS. On success the connection's transport is the
    /// encrypted stream and `encryption_enabled` reads true. On failure or
    /// cancellation the original TCP stream is reattached unchanged, so
    /// close/error remain observable and the socket stays reusable.
    pub async fn enable(&self, conn: &Connection, token: &CancelToken) -> Result<(), NetError> {
        if conn.encryption_enabled() {
            return Ok(());
        }

        let transport = conn.detach_transport().await?;
        let tcp = match transport {
            Transport::Tcp(tcp) => tcp,
            other @ Transport::Tls(_) => {
                conn.attach_transport(other, true);
                return Ok(());
            }
        };

        let loan = LoanedTcp::new(tcp);
        let mut guard = ReattachGuard {
            conn,
            loan: loan.clone(),
            armed: true,
        };

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(NetError::Cancelled),
            result = self.handshake(conn, loan.clone()) => result,
        };

        match outcome {
            Ok(stream) => {
                guard.armed = false;
                conn.attach_transport(Transport::Tls(stream), true);
                tracing::debug!(peer = %conn.peer_addr(), "TLS handshake complete");
                Ok(())
            }
            Err(err) => {
                // The guard reclaims the raw stream and hands it back.
                drop(guard);
                tracing::debug!(peer = %conn.peer_addr(), error = %err, "TLS handshake did not complete");
                Err(err)
            }
        }
    }

    async fn handshake(
        &self,
        conn: &Connection,
        stream: LoanedTcp,
    ) -> Result<tokio_boring::SslStream<LoanedTcp>, NetError> {
        match self.role {
            TlsRole::Client => {
                let connector = self.config.client_connector()?;
                let server_name = self
                    .config
                    .sni_hostname
                    .clone()
                    .or_else(|| conn.server_name().map(str::to_owned))
                    .unwrap_or_else(|| conn.peer_addr().ip().to_string());

                let mut configuration = connector
                    .configure()
                    .map_err(|_| NetError::TlsProtocolError)?;
                if !should_set_sni(&server_name) {
                    configuration.set_use_server_name_indication(false);
                    configuration.set_verify_hostname(false);
                }
                if !self.config.verify_peer {
                    configuration.set_verify_hostname(false);
                }

                tracing::debug!(server_name = %server_name, "starting TLS client handshake");
                tokio_boring::connect(configuration, &server_name, stream)
                    .await
                    .map_err(|e| classify_handshake_failure(&server_name, e))
            }
            TlsRole::Server => {
                let acceptor = self.config.server_acceptor()?;
                tracing::debug!(peer = %conn.peer_addr(), "starting TLS server handshake");
                tokio_boring::accept(&acceptor, stream)
                    .await
                    .map_err(|e| classify_handshake_failure(&conn.peer_addr().to_string(), e))
            }
        }
    }
}

/// Reattaches the raw TCP stream to the connection unless disarmed.
///
/// Runs on every non-success path, including the enclosing future being
/// dropped mid-handshake, which is what keeps the socket alive through a
/// cancellation.
struct ReattachGuard<'a> {
    conn: &'a Connection,
    loan: LoanedTcp,
    armed: bool,
}

impl Drop for ReattachGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(tcp) = self.loan.reclaim() {
            self.conn.attach_transport(Transport::Tcp(tcp), false);
        }
    }
}

/// Map a handshake error to the crate error model. A peer that goes away
/// mid-handshake (EOF, reset, broken pipe) is reported as a lost
/// connection; everything else keeps the underlying reason.
fn classify_handshake_failure<S: fmt::Debug>(
    host: &str,
    err: tokio_boring::HandshakeError<S>,
) -> NetError {
    let reason = err.to_string();
    let lower = reason.to_ascii_lowercase();
    if lower.contains("eof")
        || lower.contains("connection reset")
        || lower.contains("broken pipe")
        || lower.contains("connection closed")
    {
        NetError::HandshakeEof
    } else {
        NetError::tls_handshake_failed(host, reason)
    }
}
