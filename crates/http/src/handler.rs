// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request-processing seam.
//!
//! The dispatch engine drives connections; what a request *means* is
//! somebody else's job, reached through this trait.

use async_trait::async_trait;

use crate::request::Request;
use crate::response::Response;

#[async_trait]
pub trait Handler: Send + Sync {
    /// Short name, shown by the module listing flag.
    fn name(&self) -> &'static str;

    async fn handle(&self, request: &Request) -> Response;
}

/// Built-in handler: answers every request with a small status page.
#[derive(Debug, Default)]
pub struct DefaultHandler;

#[async_trait]
impl Handler for DefaultHandler {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn handle(&self, request: &Request) -> Response {
        let body = format!(
            "<html><head><title>hearth</title></head>\
             <body><h1>It works</h1><p>{} {}</p></body></html>\n",
            request.method, request.uri
        );
        Response::ok().with_body(body, "text/html")
    }
}
