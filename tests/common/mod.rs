//! Mock SOCKS5 proxy used by the integration tests

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Accept `connections` connections and run `handler` on each
pub async fn spawn_proxy<F, Fut>(connections: usize, handler: F) -> (SocketAddr, JoinHandle<()>)
where
    F: Fn(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut tasks = Vec::new();
        for _ in 0..connections {
            let (stream, _) = listener.accept().await.unwrap();
            tasks.push(tokio::spawn(handler(stream)));
        }
        for task in tasks {
            task.await.unwrap();
        }
    });

    (addr, handle)
}

pub async fn expect_bytes(stream: &mut TcpStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, expected);
}

pub async fn expect_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0, "client should have closed the connection");
}

/// Success reply carrying a 127.0.0.1:1080 bound address
pub async fn reply_success(stream: &mut TcpStream) {
    stream
        .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x04, 0x38])
        .await
        .unwrap();
}
