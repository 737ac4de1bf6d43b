// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal plane: OS signals translated into polled events.
//!
//! Nothing is ever acted on in signal context. The supervisor reads an
//! event stream at its loop checkpoints; workers read cancellation tokens.
//! Because the supervisor signals its own process group during restart and
//! shutdown, it must be able to discard the echo of its own signals
//! ([`SupervisorSignals::drain`]).

use std::task::{Context, Poll, Waker};

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::timeout::TimeoutPlane;

/// Supervisor-level state transition requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// SIGTERM / SIGINT: drain children and exit.
    Shutdown,
    /// SIGHUP: kill children immediately, re-read config, restart.
    RestartHard,
    /// SIGUSR1: let children finish their current request, then restart.
    RestartGraceful,
}

/// The supervisor's signal streams.
pub struct SupervisorSignals {
    term: Signal,
    int: Signal,
    hup: Signal,
    usr1: Signal,
}

impl SupervisorSignals {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
            hup: signal(SignalKind::hangup())?,
            usr1: signal(SignalKind::user_defined1())?,
        })
    }

    /// Wait for the next state-transition request.
    pub async fn recv(&mut self) -> SupervisorEvent {
        tokio::select! {
            _ = self.term.recv() => SupervisorEvent::Shutdown,
            _ = self.int.recv() => SupervisorEvent::Shutdown,
            _ = self.hup.recv() => SupervisorEvent::RestartHard,
            _ = self.usr1.recv() => SupervisorEvent::RestartGraceful,
        }
    }

    /// Discard queued events. Called after the supervisor signals its own
    /// process group, so the echo does not retrigger the transition.
    pub fn drain(&mut self) {
        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);
        for stream in [&mut self.term, &mut self.int, &mut self.hup, &mut self.usr1] {
            while let Poll::Ready(Some(())) = stream.poll_recv(&mut cx) {
                debug!("discarding self-delivered signal");
            }
        }
    }
}

/// Worker-side signal state.
///
/// SIGHUP/SIGTERM request an immediate die at the next checkpoint; SIGUSR1
/// requests a graceful die, acted on between connections and deferred while
/// a connection is in flight.
pub struct WorkerSignals {
    die: CancellationToken,
    graceful: CancellationToken,
}

impl WorkerSignals {
    /// Install streams and the forwarding task.
    ///
    /// Die events also set `exit_after_unblock` on the worker's timeout
    /// plane, so a die landing inside a blocked scope is deferred to the
    /// first checkpoint after the outermost guard drops.
    pub fn install(timeouts: TimeoutPlane) -> std::io::Result<Self> {
        let mut hup = signal(SignalKind::hangup())?;
        let mut term = signal(SignalKind::terminate())?;
        let mut usr1 = signal(SignalKind::user_defined1())?;

        let die = CancellationToken::new();
        let graceful = CancellationToken::new();
        let die_tx = die.clone();
        let graceful_tx = graceful.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = hup.recv() => {
                        timeouts.request_exit();
                        die_tx.cancel();
                    }
                    _ = term.recv() => {
                        timeouts.request_exit();
                        die_tx.cancel();
                    }
                    _ = usr1.recv() => graceful_tx.cancel(),
                }
            }
        });

        Ok(Self { die, graceful })
    }

    /// Test constructor with externally driven tokens.
    pub fn from_tokens(die: CancellationToken, graceful: CancellationToken) -> Self {
        Self { die, graceful }
    }

    pub fn die_requested(&self) -> bool {
        self.die.is_cancelled()
    }

    pub fn graceful_requested(&self) -> bool {
        self.graceful.is_cancelled()
    }

    pub fn die_token(&self) -> CancellationToken {
        self.die.clone()
    }

    pub fn graceful_token(&self) -> CancellationToken {
        self.graceful.clone()
    }
}
