// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-layer errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request line or header exceeds the line limit")]
    LineTooLong,

    #[error("connection closed mid-request")]
    UnexpectedEof,

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("too many request headers")]
    TooManyHeaders,

    #[error("unsupported protocol {0:?}")]
    UnsupportedProtocol(String),
}

impl HttpError {
    /// Status the server should answer with before closing, when an answer
    /// is possible at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            HttpError::Io(_) | HttpError::UnexpectedEof => None,
            HttpError::LineTooLong => Some(414),
            HttpError::BadRequest(_) => Some(400),
            HttpError::TooManyHeaders => Some(431),
            HttpError::UnsupportedProtocol(_) => Some(505),
        }
    }
}
