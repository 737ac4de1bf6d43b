// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::net::TcpListener;

#[tokio::test]
async fn client_sees_fin_and_full_response_despite_late_request_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"the whole response").await.unwrap();
        lingering_close(stream).await;
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    // Client still has unread request bytes in flight when the server
    // closes; without the drain this is the RST-truncation case.
    client.write_all(b"trailing request data the server never reads").await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"the whole response");

    // Our FIN lets the drain loop finish promptly.
    drop(client);
    server.await.unwrap();
}

#[tokio::test]
async fn drain_stops_after_idle_window_with_stalled_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let started = std::time::Instant::now();
        lingering_close(stream).await;
        started.elapsed()
    });

    // Client neither sends nor closes; the 2 s idle window must bound the
    // drain rather than the 30 s cap.
    let _client = TcpStream::connect(addr).await.unwrap();
    let elapsed = server.await.unwrap();
    assert!(elapsed >= SECS_TO_LINGER_WINDOW, "drained too eagerly: {elapsed:?}");
    assert!(elapsed < MAX_SECS_TO_LINGER / 2, "idle window did not bound drain: {elapsed:?}");
}
