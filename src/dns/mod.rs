//! Per-family DNS resolution.
//!
//! The [`Resolve`] trait is the resolver contract used by the connection
//! machinery: one lookup per record family (A or AAAA), independent and
//! free to run concurrently. An empty answer is a valid result and is
//! distinct from a record-not-found failure — Happy Eyeballs treats the
//! two differently.
//!
//! Implementations:
//! - [`HickoryResolver`]: fully async, issues true per-record-type queries
//! - [`GaiResolver`]: getaddrinfo in a blocking task, filtered per family
//! - [`StaticResolver`]: a fixed hostname→address map, useful for tests
//!   and local development

mod gai;
mod hickory;

pub use gai::GaiResolver;
pub use hickory::HickoryResolver;

use crate::base::neterror::NetError;
use std::collections::HashMap;
use std::{fmt, future::Future, net::IpAddr, pin::Pin, sync::Arc};

/// DNS record family for a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordFamily {
    /// AAAA records (IPv6).
    Ipv6,
    /// A records (IPv4).
    Ipv4,
}

impl RecordFamily {
    /// The DNS record type name for this family.
    pub fn record_type(&self) -> &'static str {
        match self {
            RecordFamily::Ipv6 => "AAAA",
            RecordFamily::Ipv4 => "A",
        }
    }

    /// True if `addr` belongs to this family.
    pub fn matches(&self, addr: &IpAddr) -> bool {
        match self {
            RecordFamily::Ipv6 => addr.is_ipv6(),
            RecordFamily::Ipv4 => addr.is_ipv4(),
        }
    }
}

impl fmt::Display for RecordFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_type())
    }
}

/// Alias for the `Future` type returned by a DNS resolver.
pub type Resolving = Pin<Box<dyn Future<Output = Result<Vec<IpAddr>, NetError>> + Send>>;

/// Trait for per-family DNS resolution.
///
/// Hostnames are plain string slices; the returned future is `'static`,
/// so a resolver that needs the name across an await point clones it.
///
/// # Contract
///
/// - Lookups of different families are independent and may run
///   concurrently; neither blocks the other.
/// - `Ok(vec![])` means the name exists but has no records of the
///   requested family. Record-not-found is an `Err`.
/// - Uses `&self` for concurrent resolution without mutable access.
pub trait Resolve: Send + Sync {
    /// Resolves a hostname to the IP addresses of one record family.
    fn resolve(&self, host: &str, family: RecordFamily) -> Resolving;
}

/// Blanket implementation for Arc-wrapped resolvers.
impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, host: &str, family: RecordFamily) -> Resolving {
        (**self).resolve(host, family)
    }
}

/// Resolver backed by a fixed hostname→address map.
///
/// Lookups split the stored addresses by the requested family, so a host
/// mapped only to IPv4 addresses resolves to an empty (not failed) AAAA
/// answer. Unknown hostnames fail as record-not-found.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    records: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `host` to `addrs`, replacing any previous mapping.
    pub fn insert(&mut self, host: impl Into<String>, addrs: Vec<IpAddr>) {
        self.records.insert(host.into(), addrs);
    }

    /// Returns the number of configured hostnames.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, host: &str, family: RecordFamily) -> Resolving {
        let result = match self.records.get(host) {
            Some(addrs) => Ok(addrs
                .iter()
                .copied()
                .filter(|a| family.matches(a))
                .collect()),
            None => Err(NetError::dns_failed(
                host,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such host"),
            )),
        };
        Box::pin(std::future::ready(result))
    }
}
