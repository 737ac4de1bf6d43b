// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Basic accept/serve/retire specs.

use crate::prelude::*;

#[test]
#[serial]
fn serves_a_basic_request() {
    let server = Server::start(&["start_servers = 1", "max_clients = 2"]);

    let response = http_get(server.port(), "/index.html").unwrap();
    assert!(response.starts_with("HTTP/1.0 200 OK"), "{response}");
    assert!(response.contains("Server: hearth/"));
    assert!(response.contains("/index.html"));

    server.stop();
}

#[test]
#[serial]
fn request_budget_retires_worker_and_supervisor_respawns() {
    let server = Server::start(&[
        "start_servers = 1",
        "max_clients = 1",
        "max_requests_per_child = 1",
    ]);

    let before = server.live_workers();
    assert_eq!(before.len(), 1, "one worker expected");
    let old_pid = before[0].1.pid;

    // The single permitted connection retires the worker.
    http_get(server.port(), "/only").unwrap();

    // Within a maintenance tick or two a replacement occupies the slot.
    let respawned = wait_for(SPEC_WAIT_MAX_MS, || {
        server.live_workers().iter().any(|(_, record)| record.pid != old_pid)
    });
    assert!(respawned, "no replacement worker; log:\n{}", server.error_log());

    // And it serves.
    let response = http_get(server.port(), "/again").unwrap();
    assert!(response.contains("200 OK"));

    server.stop();
}

#[test]
#[serial]
fn serves_from_every_listener() {
    let server = Server::start_with_listeners(2, &["start_servers = 2", "max_clients = 4"]);

    for (i, port) in server.ports.clone().into_iter().enumerate() {
        let response = http_get(port, &format!("/listener-{i}")).unwrap();
        assert!(response.contains("200 OK"), "listener {i}: {response}");
    }

    // Both listeners stay serviceable under interleaved load.
    for round in 0..5 {
        for port in &server.ports {
            let response = http_get(*port, &format!("/round-{round}")).unwrap();
            assert!(response.contains("200 OK"));
        }
    }

    server.stop();
}

#[test]
#[serial]
fn keepalive_connection_carries_sequential_requests() {
    let server = Server::start(&["start_servers = 1", "max_clients = 2"]);

    let mut client = KeepAliveClient::connect(server.port()).unwrap();
    let first = client.get("/one").unwrap();
    assert!(first.contains("Connection: keep-alive"), "{first}");
    let second = client.get("/two").unwrap();
    assert!(second.contains("/two"));

    server.stop();
}
