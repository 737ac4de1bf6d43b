// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the hearthd specs.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use hearth_scoreboard::{FileScoreboard, Scoreboard, WorkerSlot};

pub use hearth_core::WorkerStatus;
pub use serial_test::serial;

/// Upper bound for condition polls. Maintenance runs on 1 s ticks, so
/// give every transition a handful of them.
pub const SPEC_WAIT_MAX_MS: u64 = 15_000;

/// Poll `cond` until it holds or the deadline passes.
pub fn wait_for(max_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(max_ms);
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Grab ephemeral loopback ports by binding and releasing them.
pub fn free_ports(count: usize) -> Vec<u16> {
    let holds: Vec<std::net::TcpListener> = (0..count)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    holds.iter().map(|l| l.local_addr().unwrap().port()).collect()
}

/// One running supervisor in its own temp server root.
pub struct Server {
    root: tempfile::TempDir,
    pub ports: Vec<u16>,
    child: Child,
}

impl Server {
    /// Start `hearthd` with one listener and the given extra directives.
    pub fn start(directives: &[&str]) -> Server {
        Self::start_with_listeners(1, directives)
    }

    /// Start with `listeners` loopback listeners.
    pub fn start_with_listeners(listeners: usize, directives: &[&str]) -> Server {
        let root = tempfile::tempdir().unwrap();
        let ports = free_ports(listeners);
        let listen = ports
            .iter()
            .map(|p| format!("\"127.0.0.1:{p}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let mut command = Command::new(assert_cmd::cargo::cargo_bin("hearthd"));
        command
            .arg("-d")
            .arg(root.path())
            .arg("-c")
            .arg(format!("listen = [{listen}]"))
            .arg("-c")
            .arg("error_log = \"logs/error.log\"")
            .arg("-c")
            .arg("log_filter = \"debug\"");
        for directive in directives {
            command.arg("-c").arg(directive);
        }
        // Pretend the detach already happened so the spec owns the
        // supervisor process directly.
        command.env("HEARTHD_DETACHED", "1");
        command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let child = command.spawn().unwrap();
        let server = Server { root, ports, child };
        assert!(
            wait_for(SPEC_WAIT_MAX_MS, || server.is_serving()),
            "server never came up; log:\n{}",
            server.error_log()
        );
        server
    }

    pub fn port(&self) -> u16 {
        self.ports[0]
    }

    pub fn supervisor_pid(&self) -> u32 {
        self.child.id()
    }

    pub fn root_path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn is_serving(&self) -> bool {
        http_get(self.port(), "/probe").is_ok()
    }

    pub fn error_log(&self) -> String {
        std::fs::read_to_string(self.root.path().join("logs/error.log")).unwrap_or_default()
    }

    /// Non-dead scoreboard slots, as (slot, record) pairs.
    pub fn live_workers(&self) -> Vec<(usize, WorkerSlot)> {
        let path = self.root.path().join("logs/hearthd.scoreboard");
        let Ok(board) = FileScoreboard::open(&path) else {
            return Vec::new();
        };
        (0..board.slot_count())
            .filter_map(|slot| board.read_slot(slot).ok().map(|record| (slot, record)))
            .filter(|(_, record)| record.status != WorkerStatus::Dead && record.pid != 0)
            .collect()
    }

    pub fn signal(&self, signal: nix::sys::signal::Signal) {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(self.supervisor_pid() as i32),
            signal,
        );
    }

    pub fn signal_pid(pid: u32, signal: nix::sys::signal::Signal) {
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), signal);
    }

    /// Orderly shutdown; panics if the supervisor does not exit cleanly.
    pub fn stop(mut self) {
        self.signal(nix::sys::signal::Signal::SIGTERM);
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            match self.child.try_wait().unwrap() {
                Some(status) => {
                    assert!(status.success(), "supervisor exited with {status}");
                    break;
                }
                None if Instant::now() >= deadline => {
                    panic!("supervisor ignored SIGTERM; log:\n{}", self.error_log());
                }
                None => std::thread::sleep(Duration::from_millis(100)),
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Kill the whole group (the supervisor is its session leader), then
        // reap so no zombies outlive the spec.
        let _ = nix::sys::signal::killpg(
            nix::unistd::Pid::from_raw(self.child.id() as i32),
            nix::sys::signal::Signal::SIGKILL,
        );
        let _ = self.child.wait();
    }
}

/// Plain HTTP/1.0 GET, one connection, full response text.
pub fn http_get(port: u16, path: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    stream.set_write_timeout(Some(Duration::from_secs(10)))?;
    stream.write_all(format!("GET {path} HTTP/1.0\r\n\r\n").as_bytes())?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    if response.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "empty response",
        ));
    }
    Ok(response)
}

/// A keep-alive client connection for multi-request specs.
pub struct KeepAliveClient {
    stream: TcpStream,
}

impl KeepAliveClient {
    pub fn connect(port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port))?;
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        Ok(Self { stream })
    }

    /// Send one keep-alive request and read its (length-delimited)
    /// response head + body.
    pub fn get(&mut self, path: &str) -> std::io::Result<String> {
        self.stream
            .write_all(format!("GET {path} HTTP/1.1\r\nHost: spec\r\n\r\n").as_bytes())?;
        self.read_one_response()
    }

    pub fn send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes)
    }

    /// Read until the connection closes.
    pub fn read_to_end(&mut self) -> std::io::Result<String> {
        let mut rest = String::new();
        self.stream.read_to_string(&mut rest)?;
        Ok(rest)
    }

    fn read_one_response(&mut self) -> std::io::Result<String> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        // Read headers byte-wise until the blank line.
        loop {
            let n = self.stream.read(&mut byte)?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-response",
                ));
            }
            buf.push(byte[0]);
            if buf.ends_with(b"\r\n\r\n") {
                break;
            }
        }
        let head = String::from_utf8_lossy(&buf).into_owned();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        let mut body = vec![0u8; content_length];
        self.stream.read_exact(&mut body)?;
        Ok(head + &String::from_utf8_lossy(&body))
    }
}
