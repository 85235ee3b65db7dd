//! Async DNS resolver using hickory-dns.
//!
//! Issues true per-record-type queries (A or AAAA), so the two families of
//! a dual-stack lookup really are independent on the wire — a stalled AAAA
//! answer never delays the A answer.
//!
//! # Performance
//!
//! Unlike `GaiResolver`, this resolver is fully async and doesn't require
//! spawning blocking tasks. It maintains connection pools to DNS servers
//! for better performance under load.

use super::{RecordFamily, Resolve, Resolving};
use crate::base::neterror::NetError;
use hickory_resolver::{
    config::ResolverConfig, name_server::TokioConnectionProvider, TokioResolver,
};
use std::{net::IpAddr, sync::LazyLock};

/// Async DNS resolver backed by hickory-dns.
///
/// This resolver is lazily initialized on first use and shared across
/// all instances via a static `LazyLock`. It automatically configures
/// itself based on the system's DNS settings.
#[derive(Debug, Clone)]
pub struct HickoryResolver {
    resolver: &'static LazyLock<TokioResolver>,
}

impl HickoryResolver {
    /// Creates a new `HickoryResolver`.
    ///
    /// The underlying resolver is lazily initialized on first DNS query.
    /// It will attempt to read system DNS configuration; if that fails,
    /// it falls back to sensible defaults.
    pub fn new() -> Self {
        static RESOLVER: LazyLock<TokioResolver> = LazyLock::new(|| {
            let builder = match TokioResolver::builder_tokio() {
                Ok(builder) => {
                    tracing::debug!("Using system DNS configuration");
                    builder
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to read system DNS config, using defaults"
                    );
                    TokioResolver::builder_with_config(
                        ResolverConfig::default(),
                        TokioConnectionProvider::default(),
                    )
                }
            };

            builder.build()
        });

        Self {
            resolver: &RESOLVER,
        }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for HickoryResolver {
    fn resolve(&self, host: &str, family: RecordFamily) -> Resolving {
        let resolver = self.clone();
        let domain = host.to_string();
        Box::pin(async move {
            tracing::debug!(domain = %domain, record_type = %family, "resolving via hickory-dns");

            let addrs: Vec<IpAddr> = match family {
                RecordFamily::Ipv4 => resolver
                    .resolver
                    .ipv4_lookup(domain.as_str())
                    .await
                    .map_err(|e| lookup_error(&domain, family, e))?
                    .iter()
                    .map(|a| IpAddr::V4(a.0))
                    .collect(),
                RecordFamily::Ipv6 => resolver
                    .resolver
                    .ipv6_lookup(domain.as_str())
                    .await
                    .map_err(|e| lookup_error(&domain, family, e))?
                    .iter()
                    .map(|aaaa| IpAddr::V6(aaaa.0))
                    .collect(),
            };

            tracing::debug!(
                domain = %domain,
                record_type = %family,
                count = addrs.len(),
                "hickory-dns resolution complete"
            );
            Ok(addrs)
        })
    }
}

fn lookup_error(domain: &str, family: RecordFamily, e: impl std::fmt::Display) -> NetError {
    tracing::debug!(domain = %domain, record_type = %family, error = %e, "hickory-dns lookup failed");
    NetError::dns_failed(
        domain,
        std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
    )
}
