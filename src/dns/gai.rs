//! System DNS resolver using getaddrinfo.
//!
//! This resolver uses the operating system's native DNS resolution via
//! `getaddrinfo`, executed in a thread pool to avoid blocking the async
//! runtime. getaddrinfo has no notion of per-record-type queries, so one
//! dual-stack lookup is performed and the answer filtered to the family
//! that was asked for — an answer with no addresses of that family is an
//! empty result, not a failure.
//!
//! # When to Use
//!
//! - When you need to respect system DNS configuration (/etc/resolv.conf,
//!   nsswitch, hosts file, etc.)
//! - As a fallback when hickory-dns is not available

use super::{RecordFamily, Resolve, Resolving};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::net::{IpAddr, ToSocketAddrs};

/// System DNS resolver using `getaddrinfo` in a thread pool.
///
/// Each resolution spawns a blocking task. For high-throughput scenarios,
/// consider using `HickoryResolver` which is fully async.
#[derive(Clone, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    /// Creates a new `GaiResolver`.
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, host: &str, family: RecordFamily) -> Resolving {
        let host = host.to_string();
        Box::pin(async move {
            let domain = host.clone();

            let result = tokio::task::spawn_blocking(move || {
                tracing::debug!(host = %host, "resolving via getaddrinfo");
                (host.as_str(), 0u16)
                    .to_socket_addrs()
                    .map(|iter| iter.map(|sa| sa.ip()).collect::<Vec<_>>())
            })
            .await;

            // Handle task join error (cancellation, panic)
            let addrs = result
                .map_err(|e| {
                    tracing::error!(error = %e, "DNS resolution task failed");
                    NetError::NameNotResolved
                })?
                .dns_context(&domain)?;

            let filtered: Vec<IpAddr> =
                addrs.into_iter().filter(|a| family.matches(a)).collect();

            tracing::debug!(
                domain = %domain,
                record_type = %family,
                count = filtered.len(),
                "DNS resolution complete"
            );
            Ok(filtered)
        })
    }
}
