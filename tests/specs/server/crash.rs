// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker crash recovery specs.

use crate::prelude::*;
use nix::sys::signal::Signal;

#[test]
#[serial]
fn crashed_worker_is_reaped_and_replaced_in_the_same_slot() {
    let server = Server::start(&["start_servers = 1", "max_clients = 1"]);

    let before = server.live_workers();
    assert_eq!(before.len(), 1);
    let (slot, record) = (&before[0].0, before[0].1.clone());
    let (old_pid, old_generation) = (record.pid, record.generation);

    // Simulated crash.
    Server::signal_pid(old_pid, Signal::SIGSEGV);

    // Within a maintenance tick the slot holds a fresh pid of the same
    // generation.
    let replaced = wait_for(SPEC_WAIT_MAX_MS, || {
        server
            .live_workers()
            .iter()
            .any(|(s, r)| s == slot && r.pid != old_pid && r.pid != 0)
    });
    assert!(replaced, "no replacement worker; log:\n{}", server.error_log());

    let after = server.live_workers();
    let new_record = &after.iter().find(|(s, _)| s == slot).unwrap().1;
    assert_ne!(new_record.pid, old_pid);
    assert_eq!(new_record.generation, old_generation, "generation must not change");

    assert!(http_get(server.port(), "/recovered").unwrap().contains("200 OK"));

    server.stop();
}

#[test]
#[serial]
fn clean_shutdown_removes_pid_file_and_exits_zero() {
    let server = Server::start(&["start_servers = 1", "max_clients = 2"]);
    let pid_path = server.root_path().join("logs/hearthd.pid");
    assert!(pid_path.exists());

    server.stop();
    assert!(!pid_path.exists(), "pid file should be removed at shutdown");
}
