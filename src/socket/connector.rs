//! The connector facade.
//!
//! Dispatches on scheme and host form: a bare IP literal goes straight to
//! the TCP connector, a DNS name goes through Happy Eyeballs (or, when
//! disabled, a sequential single attempt), and `tls://` chains the TLS
//! upgrade after the stream is established. `connect` hands back a
//! [`Pending`] tied to a cancellation token that reaches every stage of
//! the pipeline.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use url::{Host, Url};

use crate::base::cancel::CancelToken;
use crate::base::neterror::NetError;
use crate::base::pending::Pending;
use crate::dns::{HickoryResolver, RecordFamily, Resolve};
use crate::socket::connection::Connection;
use crate::socket::happy_eyeballs::{attempt_url, HappyEyeballs};
use crate::socket::tcp::{Dial, TcpConnector, DEFAULT_CONNECT_TIMEOUT};
use crate::socket::tls::{StreamEncryption, TlsConfig};

/// Connector configuration.
#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    /// Resolve DNS names. When false, only IP-literal URIs connect.
    pub dns: bool,
    /// Race dual-stack candidates per RFC 8305. When false, hostname
    /// connects fall back to sequential resolution and a single attempt.
    pub happy_eyeballs: bool,
    /// Skip the AAAA lookup when the host has no usable IPv6 route.
    pub ipv6_precheck: bool,
    /// Bound on each TCP connect attempt.
    pub connect_timeout: Duration,
    /// TLS options used for `tls://` targets.
    pub tls: TlsConfig,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            dns: true,
            happy_eyeballs: true,
            ipv6_precheck: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tls: TlsConfig::default(),
        }
    }
}

/// Connects `tcp://` and `tls://` URIs.
pub struct Connector {
    resolver: Arc<dyn Resolve>,
    options: ConnectorOptions,
}

impl Connector {
    /// A connector with default options and the hickory-dns resolver.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder {
            resolver: None,
            options: ConnectorOptions::default(),
        }
    }

    pub fn options(&self) -> &ConnectorOptions {
        &self.options
    }

    /// Connect to `uri`. Syntactically invalid URIs reject immediately;
    /// everything else runs on the runtime behind the returned handle.
    pub fn connect(&self, uri: &str) -> Pending<Connection> {
        let target = match Target::parse(uri) {
            Ok(target) => target,
            Err(e) => return Pending::ready(Err(e)),
        };

        let token = CancelToken::new();
        let resolver = self.resolver.clone();
        let options = self.options.clone();
        let pipeline_token = token.clone();
        Pending::spawn(token, async move {
            connect_pipeline(resolver, options, target, pipeline_token).await
        })
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Connector`].
#[must_use]
pub struct ConnectorBuilder {
    resolver: Option<Arc<dyn Resolve>>,
    options: ConnectorOptions,
}

impl ConnectorBuilder {
    pub fn resolver(mut self, resolver: impl Resolve + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn dns(mut self, enabled: bool) -> Self {
        self.options.dns = enabled;
        self
    }

    pub fn happy_eyeballs(mut self, enabled: bool) -> Self {
        self.options.happy_eyeballs = enabled;
        self
    }

    pub fn ipv6_precheck(mut self, enabled: bool) -> Self {
        self.options.ipv6_precheck = enabled;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.options.tls = tls;
        self
    }

    pub fn build(self) -> Connector {
        Connector {
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(HickoryResolver::new())),
            options: self.options,
        }
    }
}

async fn connect_pipeline(
    resolver: Arc<dyn Resolve>,
    options: ConnectorOptions,
    target: Target,
    token: CancelToken,
) -> Result<Connection, NetError> {
    let dialer: Arc<dyn Dial> = Arc::new(TcpConnector::with_timeout(options.connect_timeout));

    let conn = match &target.host {
        HostKind::Literal(addr) => {
            tracing::debug!(%addr, "host is an IP literal, dialling directly");
            dialer.dial(target.dial_parts.clone()).await?
        }
        HostKind::Name(hostname) => {
            if !options.dns {
                return Err(NetError::DnsDisabled);
            }
            if options.happy_eyeballs {
                let ipv6 = !options.ipv6_precheck || ipv6_route_available();
                if !ipv6 {
                    tracing::debug!(host = %hostname, "no usable IPv6 route, skipping AAAA lookup");
                }
                HappyEyeballs::new(
                    resolver,
                    dialer,
                    target.original.clone(),
                    hostname.clone(),
                    target.dial_parts.clone(),
                )
                .ipv6_enabled(ipv6)
                .connect()
                .await?
            } else {
                sequential_connect(&resolver, &dialer, &target, hostname).await?
            }
        }
    };

    if target.tls {
        StreamEncryption::client(options.tls.clone())
            .enable(&conn, &token)
            .await?;
    }

    Ok(conn)
}

/// The non-racing fallback: resolve A, then AAAA only if A produced
/// nothing, and make a single attempt on the first address found.
async fn sequential_connect(
    resolver: &Arc<dyn Resolve>,
    dialer: &Arc<dyn Dial>,
    target: &Target,
    hostname: &str,
) -> Result<Connection, NetError> {
    let mut failures: Vec<String> = Vec::new();
    for family in [RecordFamily::Ipv4, RecordFamily::Ipv6] {
        match resolver.resolve(hostname, family).await {
            Ok(addrs) => {
                if let Some(addr) = addrs.first() {
                    let url = attempt_url(&target.dial_parts, *addr, hostname)?;
                    return dialer.dial(url).await;
                }
            }
            Err(e) => failures.push(format!("{family}: {e}")),
        }
    }
    let detail = if failures.is_empty() {
        "no addresses found".to_string()
    } else {
        failures.join("; ")
    };
    Err(NetError::dns_lookup_failed(&target.original, detail))
}

/// Probe for a usable IPv6 route by asking the kernel to pick one for a
/// well-known global address. No packets are sent.
fn ipv6_route_available() -> bool {
    use std::net::UdpSocket;
    match UdpSocket::bind(("::", 0)) {
        Ok(socket) => socket.connect(("2001:4860:4860::8888", 53)).is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
struct Target {
    original: String,
    /// The parsed URI with the scheme normalized to `tcp` for dialling.
    dial_parts: Url,
    tls: bool,
    host: HostKind,
}

#[derive(Debug, Clone)]
enum HostKind {
    Literal(IpAddr),
    Name(String),
}

impl Target {
    fn parse(uri: &str) -> Result<Self, NetError> {
        let url = Url::parse(uri)?;
        let tls = match url.scheme() {
            "tcp" => false,
            "tls" => true,
            _ => return Err(NetError::DisallowedUrlScheme),
        };
        if url.port().is_none() {
            return Err(NetError::InvalidUrl);
        }
        let host = match url.host() {
            Some(Host::Ipv4(ip)) => HostKind::Literal(ip.into()),
            Some(Host::Ipv6(ip)) => HostKind::Literal(ip.into()),
            Some(Host::Domain(name)) => HostKind::Name(name.to_ascii_lowercase()),
            None => return Err(NetError::InvalidUrl),
        };
        let mut dial_parts = url.clone();
        if tls {
            dial_parts
                .set_scheme("tcp")
                .map_err(|_| NetError::InvalidUrl)?;
        }
        Ok(Self {
            original: uri.to_string(),
            dial_parts,
            tls,
            host,
        })
    }
}
