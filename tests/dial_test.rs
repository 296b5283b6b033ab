//! End-to-end dial tests against a scripted SOCKS5 proxy

mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use common::{expect_bytes, expect_closed, reply_success, spawn_proxy};
use socks5_dialer::{Client, ClientConfig, Socks5Error};

fn client_for(addr: std::net::SocketAddr) -> Client {
    Client::new(ClientConfig::new(addr.to_string()))
}

#[tokio::test]
async fn test_tcp_connect_without_auth() {
    let (addr, proxy) = spawn_proxy(1, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x01, 0x00]).await;
        stream.write_all(&[0x05, 0x00]).await.unwrap();

        // No auth bytes: the next frame must be the CONNECT request
        expect_bytes(
            &mut stream,
            &[0x05, 0x01, 0x00, 0x01, 93, 184, 216, 34, 0x00, 0x50],
        )
        .await;
        reply_success(&mut stream).await;

        // Relayed bytes arrive unframed
        expect_bytes(&mut stream, b"ping").await;
        stream.write_all(b"pong").await.unwrap();
    })
    .await;

    let client = client_for(addr);
    let mut session = client.dial("tcp", "93.184.216.34:80").await.unwrap();
    assert!(!session.is_udp());
    assert_eq!(session.peer_addr().unwrap(), addr);
    assert_eq!(session.bound_addr().to_string(), "127.0.0.1:1080");

    session.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    let mut read = 0;
    while read < buf.len() {
        read += session.read(&mut buf[read..]).await.unwrap();
    }
    assert_eq!(&buf, b"pong");

    session.close().await.unwrap();
    proxy.await.unwrap();
}

#[tokio::test]
async fn test_udp_associate_frames_writes() {
    let (addr, proxy) = spawn_proxy(1, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x01, 0x00]).await;
        stream.write_all(&[0x05, 0x00]).await.unwrap();

        // UDP ASSOCIATE from the unspecified wildcard endpoint
        expect_bytes(&mut stream, &[0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await;
        reply_success(&mut stream).await;

        let header = [0x00, 0x00, 0x00, 0x01, 0x0a, 0x00, 0x00, 0x05, 0x00, 0x35];
        for payload in [&b"first"[..], &b"second"[..]] {
            expect_bytes(&mut stream, &header).await;
            expect_bytes(&mut stream, payload).await;
        }
    })
    .await;

    let client = client_for(addr);
    let mut session = client.dial("udp", "10.0.0.5:53").await.unwrap();
    assert!(session.is_udp());

    assert_eq!(session.write(b"first").await.unwrap(), 5);
    assert_eq!(session.write(b"second").await.unwrap(), 6);

    proxy.await.unwrap();
}

#[tokio::test]
async fn test_minimal_success_reply() {
    let (addr, proxy) = spawn_proxy(1, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x01, 0x00]).await;
        stream.write_all(&[0x05, 0x00]).await.unwrap();
        expect_bytes(
            &mut stream,
            &[0x05, 0x01, 0x00, 0x01, 93, 184, 216, 34, 0x00, 0x50],
        )
        .await;
        // Status only, no bound address
        stream.write_all(&[0x05, 0x00]).await.unwrap();

        expect_bytes(&mut stream, b"ping").await;
        stream.write_all(b"pong").await.unwrap();
    })
    .await;

    let mut session = client_for(addr).dial("tcp", "93.184.216.34:80").await.unwrap();
    assert_eq!(session.bound_addr().to_string(), "0.0.0.0:0");

    session.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    session.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    proxy.await.unwrap();
}

#[tokio::test]
async fn test_userpass_auth_then_connect_domain() {
    let (addr, proxy) = spawn_proxy(1, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x02, 0x00, 0x02]).await;
        stream.write_all(&[0x05, 0x02]).await.unwrap();

        expect_bytes(&mut stream, &[0x05, 0x05, b'a', b'l', b'i', b'c', b'e', 0x03, b'p', b'w', b'd']).await;
        stream.write_all(&[0x05, 0x00]).await.unwrap();

        let mut request = vec![0x05, 0x01, 0x00, 0x03, 11];
        request.extend_from_slice(b"example.com");
        request.extend_from_slice(&443u16.to_be_bytes());
        expect_bytes(&mut stream, &request).await;
        reply_success(&mut stream).await;
    })
    .await;

    let client = Client::new(ClientConfig::new(addr.to_string()).with_credentials("alice", "pwd"));
    let session = client.dial("tcp", "example.com:443").await.unwrap();
    assert_eq!(session.target().to_string(), "example.com:443");

    proxy.await.unwrap();
}

#[tokio::test]
async fn test_no_acceptable_method_closes_transport() {
    let (addr, proxy) = spawn_proxy(1, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x01, 0x00]).await;
        stream.write_all(&[0x05, 0xFF]).await.unwrap();
        expect_closed(&mut stream).await;
    })
    .await;

    let err = client_for(addr).dial("tcp", "93.184.216.34:80").await.unwrap_err();
    assert!(err.is_server_closed(), "got {:?}", err);

    proxy.await.unwrap();
}

#[tokio::test]
async fn test_rejected_credentials_close_transport() {
    let (addr, proxy) = spawn_proxy(1, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x02, 0x00, 0x02]).await;
        stream.write_all(&[0x05, 0x02]).await.unwrap();
        expect_bytes(&mut stream, &[0x05, 0x03, b'b', b'o', b'b', 0x05, b'w', b'r', b'o', b'n', b'g']).await;
        stream.write_all(&[0x05, 0x01]).await.unwrap();
        expect_closed(&mut stream).await;
    })
    .await;

    let client = Client::new(ClientConfig::new(addr.to_string()).with_credentials("bob", "wrong"));
    let err = client.dial("tcp", "10.1.2.3:22").await.unwrap_err();
    assert!(err.is_auth_failed(), "got {:?}", err);

    proxy.await.unwrap();
}

#[tokio::test]
async fn test_command_failure_is_server_closed() {
    let (addr, proxy) = spawn_proxy(1, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x01, 0x00]).await;
        stream.write_all(&[0x05, 0x00]).await.unwrap();
        let mut request = [0u8; 10];
        stream.read_exact(&mut request).await.unwrap();
        // host unreachable
        stream
            .write_all(&[0x05, 0x04, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();
        expect_closed(&mut stream).await;
    })
    .await;

    let err = client_for(addr).dial("tcp", "192.0.2.1:80").await.unwrap_err();
    assert!(err.is_server_closed());
    assert!(err.to_string().contains("host unreachable"));

    proxy.await.unwrap();
}

#[tokio::test]
async fn test_server_hangs_up_mid_handshake() {
    let (addr, proxy) = spawn_proxy(1, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x01, 0x00]).await;
        // Only one byte of the two byte selection
        stream.write_all(&[0x05]).await.unwrap();
    })
    .await;

    let err = client_for(addr).dial("tcp", "192.0.2.1:80").await.unwrap_err();
    assert!(err.is_server_closed(), "got {:?}", err);

    proxy.await.unwrap();
}

#[tokio::test]
async fn test_read_timeout_during_handshake() {
    let (addr, proxy) = spawn_proxy(1, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x01, 0x00]).await;
        // Never answer
        expect_closed(&mut stream).await;
    })
    .await;

    let mut config = ClientConfig::new(addr.to_string());
    config.read_timeout = Some(Duration::from_millis(100));
    let err = Client::new(config).dial("tcp", "192.0.2.1:80").await.unwrap_err();
    assert!(err.is_timeout(), "got {:?}", err);

    proxy.await.unwrap();
}

#[tokio::test]
async fn test_invalid_network_type() {
    let client = Client::new(ClientConfig::new("127.0.0.1:1"));
    let err = client.dial("unix", "example.com:80").await.unwrap_err();
    assert!(matches!(err, Socks5Error::InvalidNetworkType(ref n) if n == "unix"));
}

#[tokio::test]
async fn test_destination_errors_come_before_credential_checks() {
    let long_name = "u".repeat(256);
    let client = Client::new(ClientConfig::new("127.0.0.1:1").with_credentials(long_name, "pw"));

    let err = client.dial("unix", "example.com:80").await.unwrap_err();
    assert!(matches!(err, Socks5Error::InvalidNetworkType(_)), "got {:?}", err);

    let err = client
        .dial_timeout("tcp", "example.com", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Socks5Error::InvalidAddress(ref m) if !m.contains("username")), "got {:?}", err);
}

#[tokio::test]
async fn test_invalid_address() {
    let client = Client::new(ClientConfig::new("127.0.0.1:1"));
    for address in ["example.com", "example.com:99999", "[::1:80"] {
        let err = client.dial("tcp", address).await.unwrap_err();
        assert!(matches!(err, Socks5Error::InvalidAddress(_)), "{}: {:?}", address, err);
    }
}

#[tokio::test]
async fn test_connect_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client_for(addr)
        .dial_timeout("tcp", "example.com:80", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Socks5Error::ConnectFailed(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_concurrent_dials_share_client() {
    let (addr, proxy) = spawn_proxy(2, |mut stream| async move {
        expect_bytes(&mut stream, &[0x05, 0x01, 0x00]).await;
        stream.write_all(&[0x05, 0x00]).await.unwrap();
        let mut request = [0u8; 10];
        stream.read_exact(&mut request).await.unwrap();
        reply_success(&mut stream).await;
    })
    .await;

    let client = client_for(addr);
    let (a, b) = tokio::join!(
        client.dial("tcp", "10.0.0.1:80"),
        client.dial("udp", "10.0.0.2:53"),
    );
    assert!(!a.unwrap().is_udp());
    assert!(b.unwrap().is_udp());

    // Dialing never writes resolved defaults back into the shared config
    assert_eq!(client.config().read_timeout, None);

    proxy.await.unwrap();
}
