//! Runtime socket transport tests.

use std::time::Duration;

use sentinel_bridge::runtime::socket::RuntimeSocket;
use sentinel_bridge::runtime::RuntimeError;

mod common;

#[tokio::test]
async fn test_send_accumulates_until_eof() {
    let mock = common::start_mock_runtime(|command| {
        assert_eq!(command, "show info");
        "Name: HAProxy\nVersion: 2.9.0\n".to_string()
    })
    .await;

    let socket = RuntimeSocket::new(mock.addr_string());
    let response = socket.send("show info").await.unwrap();

    assert_eq!(response, "Name: HAProxy\nVersion: 2.9.0\n");
    assert_eq!(mock.commands(), vec!["show info"]);
}

/// P5: an unreachable socket is tried exactly 6 times with delays of
/// 2000, 4000, 8000, 16000 and 32000 ms between the attempts.
#[tokio::test(start_paused = true)]
async fn test_retry_ceiling_and_schedule() {
    // Bind and drop a listener so the port actively refuses.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let socket = RuntimeSocket::new(addr.to_string());

    let start = tokio::time::Instant::now();
    let err = socket.send("show info").await.unwrap_err();
    let elapsed = start.elapsed();

    match err {
        RuntimeError::RuntimeUnavailable { attempts, .. } => assert_eq!(attempts, 6),
        other => panic!("unexpected error: {other}"),
    }
    // The five backoff sleeps sum to 62 s of virtual time.
    assert!(elapsed >= Duration::from_millis(62_000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(63_000), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_recovers_once_socket_appears() {
    // Reserve a port, release it, and only start listening after the
    // first attempt has already failed.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();
        use tokio::io::AsyncWriteExt;
        let _ = socket.write_all(b"ok\n").await;
        let _ = socket.shutdown().await;
    });

    let socket = RuntimeSocket::with_retry_policy(addr.to_string(), Duration::from_millis(500), 5);
    let response = socket.send("show info").await.unwrap();
    assert_eq!(response, "ok\n");
}
