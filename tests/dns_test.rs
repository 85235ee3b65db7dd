//! DNS Module Tests
//!
//! Covers:
//! - `RecordFamily`
//! - `StaticResolver` family splitting and failure semantics
//! - `GaiResolver` (basic system resolver)

use std::net::{IpAddr, Ipv4Addr};

use netdial::dns::{GaiResolver, RecordFamily, Resolve, StaticResolver};
use netdial::NetError;

#[test]
fn record_family_api() {
    assert_eq!(RecordFamily::Ipv6.record_type(), "AAAA");
    assert_eq!(RecordFamily::Ipv4.record_type(), "A");
    assert_eq!(RecordFamily::Ipv4.to_string(), "A");
}

#[tokio::test]
async fn static_resolver_answers_per_family() {
    let mut resolver = StaticResolver::new();
    resolver.insert(
        "dual.test",
        vec![
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            "2001:db8::1".parse().unwrap(),
        ],
    );

    let v4 = resolver
        .resolve("dual.test", RecordFamily::Ipv4)
        .await
        .unwrap();
    assert_eq!(v4, vec![IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))]);

    let v6 = resolver
        .resolve("dual.test", RecordFamily::Ipv6)
        .await
        .unwrap();
    assert!(v6.iter().all(|a| a.is_ipv6()));
}

#[tokio::test]
async fn static_resolver_distinguishes_empty_from_missing() {
    let mut resolver = StaticResolver::new();
    resolver.insert("v4only.test", vec![IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))]);

    // Known host, no records of the family: empty, not an error.
    let v6 = resolver
        .resolve("v4only.test", RecordFamily::Ipv6)
        .await
        .unwrap();
    assert!(v6.is_empty());

    // Unknown host: record-not-found.
    let err = resolver
        .resolve("unknown.test", RecordFamily::Ipv4)
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::NameNotResolvedFor { .. }));
}

#[tokio::test]
async fn gai_resolver_localhost() {
    let resolver = GaiResolver::new();
    // localhost should always resolve; either family may be empty
    // depending on the host configuration, but neither errors.
    let v4 = resolver
        .resolve("localhost", RecordFamily::Ipv4)
        .await;
    let v6 = resolver
        .resolve("localhost", RecordFamily::Ipv6)
        .await;

    assert!(v4.is_ok());
    assert!(v6.is_ok());
    let all: Vec<_> = v4.unwrap().into_iter().chain(v6.unwrap()).collect();
    assert!(!all.is_empty());
}
