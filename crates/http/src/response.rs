// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response serialization.

use chrono::Utc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::HttpError;
use crate::request::Protocol;
use crate::SERVER_STRING;

/// One response ready for serialization.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self { status, headers: Vec::new(), body: Vec::new() }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        self.body = body.into();
        self.headers.push(("Content-Type".to_string(), content_type.to_string()));
        self
    }

    /// Canned error page in the classic shape.
    pub fn error(status: u16) -> Self {
        let reason = reason_phrase(status);
        let body = format!(
            "<html><head><title>{status} {reason}</title></head>\
             <body><h1>{reason}</h1></body></html>\n"
        );
        Self::new(status).with_body(body, "text/html")
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Serialize a response for `protocol`, returning the bytes written.
///
/// HTTP/0.9 gets the bare body. Otherwise the status line is followed by
/// `Date`, `Server`, `Content-Length` and `Connection`, any handler headers,
/// then the body.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    protocol: Protocol,
    response: &Response,
    keepalive: bool,
) -> Result<u64, HttpError> {
    if protocol == Protocol::Http09 {
        writer.write_all(&response.body).await?;
        writer.flush().await?;
        return Ok(response.body.len() as u64);
    }

    let mut head = format!(
        "{} {} {}\r\n",
        protocol,
        response.status,
        reason_phrase(response.status)
    );
    head.push_str(&format!("Date: {}\r\n", httpdate(Utc::now())));
    head.push_str(&format!("Server: {}\r\n", SERVER_STRING));
    head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    head.push_str(if keepalive {
        "Connection: keep-alive\r\n"
    } else {
        "Connection: close\r\n"
    });
    for (name, value) in &response.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await?;
    Ok((head.len() + response.body.len()) as u64)
}

/// RFC 7231 fixdate, always GMT.
fn httpdate(now: chrono::DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        414 => "Request-URI Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
