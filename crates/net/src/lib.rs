// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hearth-net: listening sockets and the protocols around them.
//!
//! The supervisor owns the bound listener set (`bind_listeners`) and hands
//! it to spawned workers through the environment (`inherit`). Each worker
//! rebuilds the set as a [`ListenerRing`] and accepts in ring order under
//! the cross-process [`AcceptMutex`]. Connections retire through
//! [`lingering_close`].

mod error;
mod inherit;
mod linger;
mod mutex;
mod ring;

pub use error::NetError;
pub use inherit::{parse_listen_env, LISTEN_FDS_ENV};
pub use linger::lingering_close;
pub use mutex::{
    acquire, attach_mutex, create_lock_file, remove_lock_file, AcceptMutex, FlockMutex,
};
pub use ring::{
    accept_error_is_transient, bind_listeners, BoundListeners, ListenOptions, ListenerRing,
};
