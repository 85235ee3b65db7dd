//! Connector facade tests.
//!
//! Covers dispatch on scheme and host form, option handling, the
//! sequential (non-racing) fallback, and cancellation through the
//! returned `Pending` handle.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;

use netdial::dns::{RecordFamily, Resolve, Resolving, StaticResolver};
use netdial::{Connector, NetError};

/// A resolver whose lookups never settle.
struct HangingResolver;

impl Resolve for HangingResolver {
    fn resolve(&self, _host: &str, _family: RecordFamily) -> Resolving {
        Box::pin(std::future::pending())
    }
}

async fn spawn_listener() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _stream = stream;
                std::future::pending::<()>().await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn rejects_syntactically_invalid_uris() {
    let connector = Connector::builder().resolver(StaticResolver::new()).build();
    let err = connector.connect("not a uri").await.unwrap_err();
    assert!(matches!(err, NetError::InvalidUrl));
}

#[tokio::test]
async fn rejects_unknown_schemes() {
    let connector = Connector::builder().resolver(StaticResolver::new()).build();
    let err = connector.connect("http://example.com:80").await.unwrap_err();
    assert!(matches!(err, NetError::DisallowedUrlScheme));
}

#[tokio::test]
async fn ip_literals_bypass_the_resolver() {
    let addr = spawn_listener().await;

    // A hanging resolver proves no lookup is ever made for literals.
    let connector = Connector::builder().resolver(HangingResolver).build();
    let conn = connector.connect(&format!("tcp://{addr}")).await.unwrap();
    assert_eq!(conn.peer_addr(), addr);
}

#[tokio::test]
async fn hostnames_fail_when_dns_is_disabled() {
    let connector = Connector::builder()
        .resolver(StaticResolver::new())
        .dns(false)
        .build();
    let err = connector.connect("tcp://example.com:80").await.unwrap_err();
    assert!(matches!(err, NetError::DnsDisabled));
}

#[tokio::test]
async fn resolves_hostnames_through_happy_eyeballs() {
    let addr = spawn_listener().await;

    let mut resolver = StaticResolver::new();
    resolver.insert("service.test", vec![addr.ip()]);

    let connector = Connector::builder().resolver(resolver).build();
    let conn = connector
        .connect(&format!("tcp://service.test:{}", addr.port()))
        .await
        .unwrap();

    assert_eq!(conn.peer_addr(), addr);
    assert_eq!(conn.server_name(), Some("service.test"));
}

#[tokio::test]
async fn sequential_fallback_makes_a_single_attempt() {
    let addr = spawn_listener().await;

    let mut resolver = StaticResolver::new();
    resolver.insert(
        "service.test",
        vec![
            addr.ip(),
            IpAddr::V4(Ipv4Addr::new(192, 0, 2, 99)), // never dialled
        ],
    );

    let connector = Connector::builder()
        .resolver(resolver)
        .happy_eyeballs(false)
        .build();
    let conn = connector
        .connect(&format!("tcp://service.test:{}", addr.port()))
        .await
        .unwrap();
    assert_eq!(conn.peer_addr(), addr);
}

#[tokio::test]
async fn sequential_fallback_reports_dns_failures() {
    let connector = Connector::builder()
        .resolver(StaticResolver::new())
        .happy_eyeballs(false)
        .build();
    let err = connector.connect("tcp://missing.test:80").await.unwrap_err();
    assert!(err.to_string().contains("failed during DNS lookup"));
}

#[tokio::test]
async fn cancellation_settles_the_pending_handle() {
    let connector = Connector::builder().resolver(HangingResolver).build();
    let pending = connector.connect("tcp://stalled.test:80");

    tokio::task::yield_now().await;
    pending.cancel();
    assert!(pending.is_cancelled());

    let result = pending.await;
    assert!(matches!(result, Err(NetError::Cancelled)));
}

#[tokio::test]
async fn dropping_the_handle_aborts_the_connect() {
    // A hanging resolver keeps the pipeline alive; dropping the handle
    // must tear it down without panicking the runtime.
    let connector = Connector::builder().resolver(HangingResolver).build();
    let pending = connector.connect("tcp://stalled.test:80");
    tokio::task::yield_now().await;
    drop(pending);
    tokio::task::yield_now().await;
}

#[tokio::test]
async fn events_flow_through_a_facade_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut resolver = StaticResolver::new();
    resolver.insert("echo.test", vec![addr.ip()]);
    let connector = Connector::builder().resolver(resolver).build();

    let connect = connector.connect(&format!("tcp://echo.test:{}", addr.port()));
    let (conn, accepted) = tokio::join!(connect, listener.accept());
    let conn = conn.unwrap();
    let (mut server, _) = accepted.unwrap();

    let received = Arc::new(Mutex::new(Vec::<u8>::new()));
    let sink = received.clone();
    conn.on_data(move |chunk| sink.lock().unwrap().extend_from_slice(chunk));

    use tokio::io::AsyncWriteExt;
    server.write_all(b"hello from the peer").await.unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while received.lock().unwrap().len() < 19 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(received.lock().unwrap().as_slice(), b"hello from the peer");
}
