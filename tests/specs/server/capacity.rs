// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MaxClients / backlog specs.

use crate::prelude::*;

#[test]
#[serial]
fn full_pool_queues_extra_connections_and_reports_max_clients_once() {
    let server = Server::start(&[
        "start_servers = 2",
        "max_clients = 2",
        "min_spare_servers = 2",
        "keep_alive_timeout = 30",
    ]);

    // Two keep-alive connections park both workers in their keep-alive
    // wait; nobody is left to accept.
    let mut first = KeepAliveClient::connect(server.port()).unwrap();
    assert!(first.get("/hold-1").unwrap().contains("200 OK"));
    let mut second = KeepAliveClient::connect(server.port()).unwrap();
    assert!(second.get("/hold-2").unwrap().contains("200 OK"));

    // Extra connections sit in the listen backlog, unserved but not
    // rejected.
    let mut third = KeepAliveClient::connect(server.port()).unwrap();
    let mut fourth = KeepAliveClient::connect(server.port()).unwrap();

    // The supervisor notices it cannot spawn spares and says so once.
    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || server.error_log().contains("MaxClients")),
        "MaxClients never reported; log:\n{}",
        server.error_log()
    );
    std::thread::sleep(std::time::Duration::from_secs(3));
    assert_eq!(
        server.error_log().matches("reached MaxClients").count(),
        1,
        "MaxClients reported more than once"
    );
    assert!(server.live_workers().len() <= 2, "spawned past max_clients");

    // Releasing the holders lets the queued connections be served.
    drop(first);
    drop(second);
    assert!(third.get("/queued-1").unwrap().contains("200 OK"));
    assert!(fourth.get("/queued-2").unwrap().contains("200 OK"));

    server.stop();
}
