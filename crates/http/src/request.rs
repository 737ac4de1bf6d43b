// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-line and header parsing.

use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use hearth_core::limits::{MAX_HEADER_COUNT, MAX_LINE_LENGTH};

use crate::error::HttpError;

/// Protocol spoken on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Bare `GET <uri>`: no headers, no status line in the reply.
    Http09,
    Http10,
    Http11,
}

impl Protocol {
    fn parse(token: &str) -> Result<Self, HttpError> {
        match token {
            "HTTP/1.0" => Ok(Protocol::Http10),
            "HTTP/1.1" => Ok(Protocol::Http11),
            _ => Err(HttpError::UnsupportedProtocol(token.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Http09 => "HTTP/0.9",
            Protocol::Http10 => "HTTP/1.0",
            Protocol::Http11 => "HTTP/1.1",
        };
        write!(f, "{}", s)
    }
}

/// One parsed request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub protocol: Protocol,
    headers: Vec<(String, String)>,
}

impl Request {
    /// First matching header value, name compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The request line as received, for the scoreboard display field.
    pub fn request_line(&self) -> String {
        match self.protocol {
            Protocol::Http09 => format!("{} {}", self.method, self.uri),
            p => format!("{} {} {}", self.method, self.uri, p),
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// Whether the client asked to keep the connection open.
    pub fn wants_keepalive(&self) -> bool {
        match self.protocol {
            Protocol::Http09 => false,
            Protocol::Http10 => self
                .header("connection")
                .is_some_and(|v| v.eq_ignore_ascii_case("keep-alive")),
            Protocol::Http11 => !self
                .header("connection")
                .is_some_and(|v| v.eq_ignore_ascii_case("close")),
        }
    }
}

/// Read one request off the connection.
///
/// `Ok(None)` means the client closed cleanly before sending anything ---
/// the normal end of a keep-alive connection, not an error.
pub async fn read_request<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Request>, HttpError> {
    // Tolerate stray blank lines before the request line (clients that send
    // an extra CRLF after a previous request body).
    let line = loop {
        match read_line_bounded(reader).await? {
            None => return Ok(None),
            Some(line) if line.is_empty() => continue,
            Some(line) => break line,
        }
    };

    let text = String::from_utf8(line)
        .map_err(|_| HttpError::BadRequest("request line is not UTF-8".to_string()))?;
    let mut parts = text.split_ascii_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| HttpError::BadRequest("empty request line".to_string()))?
        .to_string();
    let uri = parts
        .next()
        .ok_or_else(|| HttpError::BadRequest(format!("no URI in {:?}", text)))?
        .to_string();
    let protocol = match parts.next() {
        Some(token) => Protocol::parse(token)?,
        None => Protocol::Http09,
    };
    if parts.next().is_some() {
        return Err(HttpError::BadRequest(format!("trailing tokens in {:?}", text)));
    }

    let mut headers = Vec::new();
    if protocol != Protocol::Http09 {
        loop {
            let line = match read_line_bounded(reader).await? {
                None => return Err(HttpError::UnexpectedEof),
                Some(line) => line,
            };
            if line.is_empty() {
                break;
            }
            if headers.len() >= MAX_HEADER_COUNT {
                return Err(HttpError::TooManyHeaders);
            }
            let text = String::from_utf8(line)
                .map_err(|_| HttpError::BadRequest("header is not UTF-8".to_string()))?;
            let (name, value) = text
                .split_once(':')
                .ok_or_else(|| HttpError::BadRequest(format!("header without colon: {:?}", text)))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(Some(Request { method, uri, protocol, headers }))
}

/// Read and discard a request body so the next keep-alive request starts at
/// a message boundary.
pub async fn discard_body<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    mut remaining: u64,
) -> Result<(), HttpError> {
    let mut sink = [0u8; 4096];
    while remaining > 0 {
        let want = sink.len().min(remaining as usize);
        let n = reader.read(&mut sink[..want]).await?;
        if n == 0 {
            return Err(HttpError::UnexpectedEof);
        }
        remaining -= n as u64;
    }
    Ok(())
}

/// Read one line, bounded by `MAX_LINE_LENGTH`, stripping the terminator.
///
/// `Ok(None)` only at clean EOF with no bytes read.
async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, HttpError> {
    let mut line: Vec<u8> = Vec::new();
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                if line.is_empty() {
                    return Ok(None);
                }
                return Err(HttpError::UnexpectedEof);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    line.extend_from_slice(&available[..pos]);
                    (pos + 1, true)
                }
                None => {
                    line.extend_from_slice(available);
                    (available.len(), false)
                }
            }
        };
        reader.consume(consumed);
        if line.len() > MAX_LINE_LENGTH {
            return Err(HttpError::LineTooLong);
        }
        if done {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(Some(line));
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
