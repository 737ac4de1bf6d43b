// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hearth-http: the minimal HTTP/1.0 + keep-alive wire layer.
//!
//! Wire format: request line, header lines, CRLF; responses are serialized
//! with `Date`/`Server`/`Content-Length`/`Connection` added. Everything
//! beyond the wire contract (content generation, modules) lives behind the
//! [`Handler`] seam.

mod error;
mod handler;
mod request;
mod response;

pub use error::HttpError;
pub use handler::{DefaultHandler, Handler};
pub use request::{discard_body, read_request, Protocol, Request};
pub use response::{write_response, Response};


/// Server token sent in the `Server` header and version banners.
pub const SERVER_STRING: &str = concat!("hearth/", env!("CARGO_PKG_VERSION"));
