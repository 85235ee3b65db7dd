//! TLS upgrade tests.
//!
//! Covers:
//! - Full client/server handshake over an established connection
//! - Data isolation during the handshake (no plaintext leaks to listeners)
//! - Peer loss mid-handshake (`Connection lost during TLS handshake`)
//! - Cancellation leaving the raw stream open and reusable

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use netdial::base::cancel::CancelToken;
use netdial::socket::tcp::{Dial, TcpConnector};
use netdial::{Connection, NetError, StreamEncryption, TlsConfig, TlsIdentity};

/// A freshly generated self-signed identity for `localhost`.
fn self_signed_identity() -> TlsIdentity {
    use boring::asn1::Asn1Time;
    use boring::bn::BigNum;
    use boring::hash::MessageDigest;
    use boring::pkey::PKey;
    use boring::rsa::Rsa;
    use boring::x509::extension::SubjectAlternativeName;
    use boring::x509::{X509NameBuilder, X509};

    let rsa = Rsa::generate(2048).unwrap();
    let key = PKey::from_rsa(rsa).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "localhost").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    TlsIdentity::from_pem(
        cert.to_pem().unwrap(),
        key.private_key_to_pem_pkcs8().unwrap(),
    )
}

fn server_config() -> TlsConfig {
    TlsConfig {
        identity: Some(self_signed_identity()),
        ..TlsConfig::default()
    }
}

fn insecure_client_config() -> TlsConfig {
    TlsConfig {
        verify_peer: false,
        ..TlsConfig::default()
    }
}

/// An established client connection plus the server end of the pair.
async fn connection_pair() -> (Connection, Connection) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let url = Url::parse(&format!("tcp://{addr}")).unwrap();
    let dial = TcpConnector::new().dial(url);
    let (client, accepted) = tokio::join!(dial, listener.accept());
    let (server_stream, _) = accepted.unwrap();

    (client.unwrap(), Connection::from_tcp(server_stream).unwrap())
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn upgrades_both_ends_and_carries_data() {
    let (client, server) = connection_pair().await;

    // Registered before the handshake: must only ever observe plaintext.
    let received = Arc::new(Mutex::new(Vec::<u8>::new()));
    let sink = received.clone();
    server.on_data(move |chunk| sink.lock().unwrap().extend_from_slice(chunk));

    let client_tls = StreamEncryption::client(insecure_client_config());
    let server_tls = StreamEncryption::server(server_config());
    let token = CancelToken::new();

    let (client_result, server_result) = tokio::join!(
        client_tls.enable(&client, &token),
        server_tls.enable(&server, &token),
    );
    client_result.unwrap();
    server_result.unwrap();

    assert!(client.encryption_enabled());
    assert!(server.encryption_enabled());

    client.write(&b"over tls"[..]);
    let sink = received.clone();
    wait_for(move || !sink.lock().unwrap().is_empty()).await;

    // Exactly the plaintext: no handshake bytes ever reached the listener.
    assert_eq!(received.lock().unwrap().as_slice(), b"over tls");
}

#[tokio::test]
async fn enable_is_a_noop_on_an_already_encrypted_connection() {
    let (client, server) = connection_pair().await;

    let client_tls = StreamEncryption::client(insecure_client_config());
    let server_tls = StreamEncryption::server(server_config());
    let token = CancelToken::new();

    let (client_result, server_result) = tokio::join!(
        client_tls.enable(&client, &token),
        server_tls.enable(&server, &token),
    );
    client_result.unwrap();
    server_result.unwrap();

    client_tls.enable(&client, &token).await.unwrap();
    assert!(client.encryption_enabled());
}

#[tokio::test]
async fn peer_loss_mid_handshake_is_reported_as_a_lost_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = TcpStream::connect(addr).await.unwrap();
    let (server_stream, _) = listener.accept().await.unwrap();
    let server = Connection::from_tcp(server_stream).unwrap();

    let closed = Arc::new(Mutex::new(false));
    let flag = closed.clone();
    server.on_close(move || *flag.lock().unwrap() = true);

    // The peer goes away shortly after connecting, without speaking TLS.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(client);
    });

    let err = StreamEncryption::server(server_config())
        .enable(&server, &CancelToken::new())
        .await
        .unwrap_err();

    assert!(
        err.to_string()
            .contains("Connection lost during TLS handshake"),
        "unexpected error: {err}"
    );
    assert!(!server.encryption_enabled());

    // The raw stream was handed back: the pump observes the EOF and the
    // close event still fires for user code.
    let flag = closed.clone();
    wait_for(move || *flag.lock().unwrap()).await;
}

#[tokio::test]
async fn cancellation_leaves_the_raw_stream_open_and_usable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let url = Url::parse(&format!("tcp://{addr}")).unwrap();
    let dial = TcpConnector::new().dial(url);
    let (client, accepted) = tokio::join!(dial, listener.accept());
    let client = client.unwrap();
    let (mut server_stream, _) = accepted.unwrap();

    let token = CancelToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    // The server never speaks TLS, so the handshake hangs until cancelled.
    let err = StreamEncryption::client(insecure_client_config())
        .enable(&client, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::Cancelled));
    assert!(!client.encryption_enabled());
    assert!(!client.is_closed());

    // The raw TCP stream is back in place and still works: bytes written
    // after the cancellation reach the peer (after the ClientHello the
    // aborted handshake already sent).
    client.write(&b"plain again"[..]);

    let mut seen = Vec::new();
    let mut buf = [0u8; 1024];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !seen.windows(11).any(|w| w == b"plain again") {
        let n = tokio::time::timeout_at(deadline, server_stream.read(&mut buf))
            .await
            .expect("timed out waiting for post-cancel bytes")
            .unwrap();
        assert!(n > 0, "peer saw EOF instead of post-cancel bytes");
        seen.extend_from_slice(&buf[..n]);
    }
}
