// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lingering close.
//!
//! Closing a socket while the client still has unread request bytes in
//! flight makes the kernel answer with RST, which can destroy the response
//! sitting in the client's receive buffer. Instead: flush, send our FIN via
//! a write-half shutdown, then read and discard whatever arrives until the
//! client goes quiet, closes, or the overall deadline passes. Only then is
//! the socket really closed.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use hearth_core::limits::{MAX_SECS_TO_LINGER, SECS_TO_LINGER_WINDOW};

/// Drain-and-close a finished connection.
///
/// Errors are deliberately not logged: most clients abort instead of
/// closing, and there is no portable way to tell a dropped connection from
/// anything worth a log line.
pub async fn lingering_close(mut stream: TcpStream) {
    let deadline = Instant::now() + MAX_SECS_TO_LINGER;

    // Send any leftover response bytes, but never try again on failure.
    if stream.flush().await.is_err() {
        return;
    }

    // Close our half --- the client sees a FIN.
    if stream.shutdown().await.is_err() {
        return;
    }

    // Slurp inbound data until an idle window elapses, the client closes,
    // the socket errors, or the overall deadline caps the drain. The 2 s
    // window only keeps us here for a client actively sending.
    let mut discard = [0u8; 2048];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let window = SECS_TO_LINGER_WINDOW.min(remaining).max(Duration::from_millis(1));
        match tokio::time::timeout(window, stream.read(&mut discard)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => continue,
            Ok(Err(_)) => break,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
#[path = "linger_tests.rs"]
mod tests;
