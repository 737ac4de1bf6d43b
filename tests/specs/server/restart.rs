// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful and hard restart specs.

use crate::prelude::*;
use nix::sys::signal::Signal;

#[test]
#[serial]
fn graceful_restart_finishes_inflight_request_then_closes_the_connection() {
    let server = Server::start(&[
        "start_servers = 1",
        "max_clients = 1",
        "keep_alive_timeout = 30",
    ]);

    let mut client = KeepAliveClient::connect(server.port()).unwrap();
    let first = client.get("/inflight").unwrap();
    assert!(first.contains("/inflight"));

    // Client pauses between requests; the graceful restart arrives now.
    server.signal(Signal::SIGUSR1);

    // The worker closes the parked keep-alive connection instead of
    // serving a second request on it.
    let leftovers = client.read_to_end().unwrap_or_default();
    assert!(
        !leftovers.contains("200 OK"),
        "no new response should arrive on the retired connection: {leftovers}"
    );

    // A new generation comes up and serves fresh connections.
    let new_generation = wait_for(SPEC_WAIT_MAX_MS, || {
        server
            .live_workers()
            .iter()
            .any(|(_, record)| record.generation >= 2 && record.status != WorkerStatus::Graceful)
    });
    assert!(new_generation, "no new-generation worker; log:\n{}", server.error_log());
    assert!(http_get(server.port(), "/fresh").unwrap().contains("200 OK"));

    server.stop();
}

#[test]
#[serial]
fn repeated_graceful_restarts_converge_like_a_single_one() {
    let server = Server::start(&["start_servers = 2", "max_clients = 4"]);

    // Let each restart settle (every live worker on the new generation)
    // before issuing the next, as an operator would.
    for target_generation in [2u32, 3] {
        server.signal(Signal::SIGUSR1);
        let settled = wait_for(SPEC_WAIT_MAX_MS, || {
            let workers = server.live_workers();
            !workers.is_empty()
                && workers.iter().all(|(_, record)| record.generation == target_generation)
        });
        assert!(
            settled,
            "generation {target_generation} never settled; log:\n{}",
            server.error_log()
        );
    }
    assert!(http_get(server.port(), "/converged").unwrap().contains("200 OK"));

    server.stop();
}

#[test]
#[serial]
fn hard_restart_replaces_workers_and_keeps_the_listener() {
    let server = Server::start(&["start_servers = 1", "max_clients = 2"]);
    let before: Vec<u32> =
        server.live_workers().iter().map(|(_, record)| record.pid).collect();

    server.signal(Signal::SIGHUP);

    let replaced = wait_for(SPEC_WAIT_MAX_MS, || {
        let now = server.live_workers();
        !now.is_empty() && now.iter().all(|(_, record)| !before.contains(&record.pid))
    });
    assert!(replaced, "workers survived SIGHUP; log:\n{}", server.error_log());

    // Same port still serves: the listener fd was reused, not rebound.
    assert!(http_get(server.port(), "/after-hup").unwrap().contains("200 OK"));

    server.stop();
}
