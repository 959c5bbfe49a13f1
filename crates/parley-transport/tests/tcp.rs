//! Integration tests for the TCP line transport and callback push.
//!
//! Every test binds to port 0 so the OS picks a free port, and every wait
//! is wrapped in a timeout so a broken transport fails instead of hanging.

use std::time::Duration;

use parley_transport::{
    Connection, TcpConnection, TcpTransport, Transport, TransportError, push,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

async fn bound_transport() -> (TcpTransport, String) {
    let transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("local addr").to_string();
    (transport, addr)
}

#[tokio::test]
async fn test_accept_and_exchange_lines() {
    let (mut transport, addr) = bound_transport().await;

    let server = tokio::spawn(async move {
        let conn = transport.accept().await.expect("should accept");
        let frame = conn.recv().await.expect("recv").expect("frame");
        assert_eq!(frame, b"CREATE lobby\n");
        conn.send(b"CREATE lobby OK\n").await.expect("send");
        conn.close().await.expect("close");
        conn.peer_addr()
    });

    let mut client = TcpStream::connect(&addr).await.expect("connect");
    let client_local = client.local_addr().expect("local addr");
    client.write_all(b"CREATE lobby\n").await.expect("write");

    let mut reply = String::new();
    let mut reader = BufReader::new(&mut client);
    timeout(WAIT, reader.read_line(&mut reply))
        .await
        .expect("reply in time")
        .expect("read");
    assert_eq!(reply, "CREATE lobby OK\n");

    let peer = server.await.expect("server task");
    assert_eq!(peer, client_local);
}

#[tokio::test]
async fn test_recv_returns_frames_in_order_then_none() {
    let (mut transport, addr) = bound_transport().await;

    let mut client = TcpStream::connect(&addr).await.expect("connect");
    client
        .write_all(b"KEEP_ALIVE\nLIST None 0\n")
        .await
        .expect("write");
    client.shutdown().await.expect("shutdown");

    let conn = timeout(WAIT, transport.accept())
        .await
        .expect("accept in time")
        .expect("accept");
    assert_eq!(conn.recv().await.unwrap().unwrap(), b"KEEP_ALIVE\n");
    assert_eq!(conn.recv().await.unwrap().unwrap(), b"LIST None 0\n");
    assert!(conn.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_recv_rejects_oversized_frame() {
    let (transport, addr) = bound_transport().await;
    let mut transport = transport.with_max_frame_len(16);

    let mut client = TcpStream::connect(&addr).await.expect("connect");
    client
        .write_all(b"MSG ann 9 this line is far too long lobby\n")
        .await
        .expect("write");

    let conn = transport.accept().await.expect("accept");
    let err = conn.recv().await.unwrap_err();
    assert!(matches!(err, TransportError::FrameTooLong(16)));
}

#[tokio::test]
async fn test_connect_reports_local_addr() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();

    let conn = TcpConnection::connect(addr).await.expect("connect");
    let (_accepted, remote) = listener.accept().await.expect("accept");

    assert_eq!(conn.local_addr(), Some(remote));
    assert_eq!(conn.peer_addr(), addr);
}

#[tokio::test]
async fn test_push_delivers_frame_and_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();

    let pusher = tokio::spawn(async move {
        push(addr, b"MSG server 1 hi lobby\n", WAIT).await
    });

    let (mut stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("accept in time")
        .expect("accept");
    let mut received = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut received))
        .await
        .expect("read in time")
        .expect("read");

    assert_eq!(received, b"MSG server 1 hi lobby\n");
    pusher.await.expect("task").expect("push should succeed");
}

#[tokio::test]
async fn test_push_to_closed_port_fails() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().unwrap()
    };

    let err = push(addr, b"KEEP_ALIVE\n", WAIT).await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectFailed { .. }));
}

#[tokio::test]
async fn test_bind_failure_is_accept_failed() {
    let (_transport, addr) = bound_transport().await;
    let err = TcpTransport::bind(&addr).await.err().expect("port in use");
    assert!(matches!(err, TransportError::AcceptFailed(_)));
}
