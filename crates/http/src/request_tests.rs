// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::io::BufReader;
use yare::parameterized;

async fn parse(input: &str) -> Result<Option<Request>, HttpError> {
    let mut reader = BufReader::new(input.as_bytes());
    read_request(&mut reader).await
}

#[tokio::test]
async fn parses_simple_http10_request() {
    let req = parse("GET /index.html HTTP/1.0\r\nHost: example.test\r\n\r\n")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(req.method, "GET");
    assert_eq!(req.uri, "/index.html");
    assert_eq!(req.protocol, Protocol::Http10);
    assert_eq!(req.header("host"), Some("example.test"));
    assert_eq!(req.request_line(), "GET /index.html HTTP/1.0");
}

#[tokio::test]
async fn clean_eof_is_none() {
    assert!(parse("").await.unwrap().is_none());
}

#[tokio::test]
async fn leading_blank_lines_tolerated() {
    let req = parse("\r\n\r\nGET / HTTP/1.0\r\n\r\n").await.unwrap().unwrap();
    assert_eq!(req.uri, "/");
}

#[tokio::test]
async fn bare_lf_line_endings_accepted() {
    let req = parse("GET / HTTP/1.1\nHost: h\n\n").await.unwrap().unwrap();
    assert_eq!(req.header("Host"), Some("h"));
}

#[tokio::test]
async fn http09_has_no_headers() {
    let req = parse("GET /plain\r\n").await.unwrap().unwrap();
    assert_eq!(req.protocol, Protocol::Http09);
    assert!(req.headers().is_empty());
    assert!(!req.wants_keepalive());
}

#[tokio::test]
async fn eof_mid_headers_is_an_error() {
    let err = parse("GET / HTTP/1.0\r\nHost: h\r\n").await.unwrap_err();
    assert!(matches!(err, HttpError::UnexpectedEof));
}

#[parameterized(
    bad_proto = { "GET / HTTP/2.0\r\n\r\n" },
    gopher = { "GET / GOPHER\r\n\r\n" },
)]
fn unsupported_protocols_rejected(input: &str) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let err = rt.block_on(parse(input)).unwrap_err();
    assert!(matches!(err, HttpError::UnsupportedProtocol(_)));
}

#[tokio::test]
async fn header_without_colon_rejected() {
    let err = parse("GET / HTTP/1.0\r\nbogus header\r\n\r\n").await.unwrap_err();
    assert!(matches!(err, HttpError::BadRequest(_)));
}

#[tokio::test]
async fn over_long_request_line_rejected() {
    let input = format!("GET /{} HTTP/1.0\r\n\r\n", "a".repeat(9000));
    let err = parse(&input).await.unwrap_err();
    assert!(matches!(err, HttpError::LineTooLong));
}

#[tokio::test]
async fn keepalive_rules_by_protocol() {
    let req = parse("GET / HTTP/1.0\r\n\r\n").await.unwrap().unwrap();
    assert!(!req.wants_keepalive());

    let req = parse("GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n").await.unwrap().unwrap();
    assert!(req.wants_keepalive());

    let req = parse("GET / HTTP/1.1\r\n\r\n").await.unwrap().unwrap();
    assert!(req.wants_keepalive());

    let req = parse("GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap().unwrap();
    assert!(!req.wants_keepalive());
}

#[tokio::test]
async fn discard_body_advances_to_message_boundary() {
    let input = "POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET /next HTTP/1.1\r\n\r\n";
    let mut reader = BufReader::new(input.as_bytes());

    let first = read_request(&mut reader).await.unwrap().unwrap();
    assert_eq!(first.content_length(), Some(5));
    discard_body(&mut reader, 5).await.unwrap();

    let second = read_request(&mut reader).await.unwrap().unwrap();
    assert_eq!(second.uri, "/next");
}
