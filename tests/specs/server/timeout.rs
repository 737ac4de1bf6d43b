// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-deadline specs.

use crate::prelude::*;
use std::time::{Duration, Instant};

#[test]
#[serial]
fn stalled_request_is_timed_out_and_the_worker_lives_on() {
    let server = Server::start(&[
        "start_servers = 1",
        "max_clients = 1",
        "timeout = 2",
    ]);
    let pid_before = server.live_workers().first().map(|(_, record)| record.pid);

    // Partial request headers, then silence.
    let mut client = KeepAliveClient::connect(server.port()).unwrap();
    client.send_raw(b"GET /stalled HTTP/1.0\r\nHost: half").unwrap();

    let started = Instant::now();
    let result = client.read_to_end();
    let elapsed = started.elapsed();

    // The aborted connection yields no response: clean EOF or a reset.
    if let Ok(text) = result {
        assert!(text.is_empty(), "no response expected on a timed-out request: {text}");
    }
    assert!(elapsed >= Duration::from_secs(1), "closed too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(8), "timeout never fired: {elapsed:?}");

    // The worker logged the timeout and kept its pid.
    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || server.error_log().contains("request timed out")),
        "timeout not logged; log:\n{}",
        server.error_log()
    );
    let pid_after = server.live_workers().first().map(|(_, record)| record.pid);
    assert_eq!(pid_before, pid_after, "worker should survive a request timeout");

    // And it still serves the next client.
    assert!(http_get(server.port(), "/next").unwrap().contains("200 OK"));

    server.stop();
}
