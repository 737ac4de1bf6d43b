// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hearth_http::DefaultHandler;
use hearth_scoreboard::MemScoreboard;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn test_ctx(config: ServerConfig) -> WorkerContext {
    WorkerContext {
        config,
        slot: 0,
        generation: 1,
        scoreboard: Arc::new(MemScoreboard::new(4)),
        handler: Arc::new(DefaultHandler),
        timeouts: TimeoutPlane::new(),
        die: CancellationToken::new(),
        graceful: CancellationToken::new(),
    }
}

async fn accepted_pair() -> (TcpStream, TcpStream, SocketAddr, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local = listener.local_addr().unwrap();
    let client = TcpStream::connect(local).await.unwrap();
    let (server, peer) = listener.accept().await.unwrap();
    (server, client, peer, local)
}

#[tokio::test]
async fn single_request_is_served_and_counted() {
    let ctx = test_ctx(ServerConfig::default());
    let (server, mut client, peer, local) = accepted_pair().await;

    let task = tokio::spawn(async move {
        let _ = client.write_all(b"GET /hello HTTP/1.0\r\n\r\n").await;
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    });

    let outcome = serve_connection(&ctx, server, peer, local).await.unwrap();
    assert_eq!(outcome.requests, 1);
    assert!(!outcome.aborted);

    let response = task.await.unwrap();
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"), "{response}");
    assert!(response.contains("Connection: close"));

    let slot = ctx.scoreboard.read_slot(0).unwrap();
    assert_eq!(slot.access_count, 1);
    assert!(slot.bytes_served > 0);
    assert_eq!(slot.request, "GET /hello HTTP/1.0");
}

#[tokio::test]
async fn keepalive_serves_sequential_requests() {
    let mut config = ServerConfig::default();
    config.keep_alive_timeout = 5;
    let ctx = test_ctx(config);
    let (server, mut client, peer, local) = accepted_pair().await;

    let task = tokio::spawn(async move {
        client.write_all(b"GET /one HTTP/1.1\r\nHost: h\r\n\r\n").await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = client.read(&mut buf).await.unwrap();
        let first = String::from_utf8_lossy(&buf[..n]).into_owned();

        client.write_all(b"GET /two HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        (first, String::from_utf8_lossy(&rest).into_owned())
    });

    let outcome = serve_connection(&ctx, server, peer, local).await.unwrap();
    assert_eq!(outcome.requests, 2);
    assert!(!outcome.aborted);

    let (first, second) = task.await.unwrap();
    assert!(first.contains("Connection: keep-alive"), "{first}");
    assert!(first.contains("/one"));
    assert!(second.contains("Connection: close"), "{second}");
    assert!(second.contains("/two"));
}

#[tokio::test]
async fn partial_request_times_out_and_aborts() {
    let mut config = ServerConfig::default();
    config.timeout = 1;
    let ctx = test_ctx(config);
    let (server, mut client, peer, local) = accepted_pair().await;

    // Partial headers, then silence.
    client.write_all(b"GET / HTTP/1.0\r\nHost: half").await.unwrap();

    let started = std::time::Instant::now();
    let outcome = serve_connection(&ctx, server, peer, local).await.unwrap();
    assert!(outcome.aborted);
    assert_eq!(outcome.requests, 0);
    let elapsed = started.elapsed();
    assert!(elapsed >= std::time::Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < std::time::Duration::from_secs(5), "{elapsed:?}");
}

#[tokio::test]
async fn generation_bump_closes_keepalive_after_current_request() {
    let mut config = ServerConfig::default();
    config.keep_alive_timeout = 30;
    let ctx = test_ctx(config);
    // Retirement already requested before the request arrives: the one
    // in-flight request still completes, then the connection closes.
    ctx.scoreboard.set_exit_generation(1).unwrap();

    let (server, mut client, peer, local) = accepted_pair().await;
    let task = tokio::spawn(async move {
        client.write_all(b"GET /last HTTP/1.1\r\nHost: h\r\n\r\n").await.unwrap();
        let mut all = Vec::new();
        client.read_to_end(&mut all).await.unwrap();
        String::from_utf8_lossy(&all).into_owned()
    });

    let outcome = serve_connection(&ctx, server, peer, local).await.unwrap();
    assert_eq!(outcome.requests, 1);

    let response = task.await.unwrap();
    assert!(response.contains("/last"), "{response}");
}

#[tokio::test]
async fn graceful_event_ends_the_keepalive_wait() {
    let mut config = ServerConfig::default();
    config.keep_alive_timeout = 30;
    let ctx = test_ctx(config);
    let (server, mut client, peer, local) = accepted_pair().await;

    let graceful = ctx.graceful.clone();
    let task = tokio::spawn(async move {
        client.write_all(b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n").await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = client.read(&mut buf).await.unwrap();
        // Client pauses between requests; retirement arrives meanwhile.
        graceful.cancel();
        let mut rest = Vec::new();
        let n = client.read_to_end(&mut rest).await.unwrap();
        n
    });

    let started = std::time::Instant::now();
    let outcome = serve_connection(&ctx, server, peer, local).await.unwrap();
    assert_eq!(outcome.requests, 1);
    // The 30s keep-alive window was cut short by the graceful event.
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    // Transport closes with no further response bytes.
    assert_eq!(task.await.unwrap(), 0);
}

#[tokio::test]
async fn bad_request_gets_an_error_response() {
    let ctx = test_ctx(ServerConfig::default());
    let (server, mut client, peer, local) = accepted_pair().await;

    let task = tokio::spawn(async move {
        client.write_all(b"GET / HTTP/9.9\r\n\r\n").await.unwrap();
        let mut all = Vec::new();
        client.read_to_end(&mut all).await.unwrap();
        String::from_utf8_lossy(&all).into_owned()
    });

    let outcome = serve_connection(&ctx, server, peer, local).await.unwrap();
    assert_eq!(outcome.requests, 0);
    let response = task.await.unwrap();
    assert!(response.starts_with("HTTP/1.0 505"), "{response}");
}

#[tokio::test]
async fn post_body_is_discarded_between_keepalive_requests() {
    let ctx = test_ctx(ServerConfig::default());
    let (server, mut client, peer, local) = accepted_pair().await;

    let task = tokio::spawn(async move {
        client
            .write_all(
                b"POST /submit HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\nbody\
                  GET /after HTTP/1.1\r\nConnection: close\r\n\r\n",
            )
            .await
            .unwrap();
        let mut all = Vec::new();
        client.read_to_end(&mut all).await.unwrap();
        String::from_utf8_lossy(&all).into_owned()
    });

    let outcome = serve_connection(&ctx, server, peer, local).await.unwrap();
    assert_eq!(outcome.requests, 2);
    let responses = task.await.unwrap();
    assert!(responses.contains("/submit"));
    assert!(responses.contains("/after"));
}
