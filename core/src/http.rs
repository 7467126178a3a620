//! HTTP request and response types shared by the builders, transports, and
//! the parser.
//!
//! # Design
//! Requests are plain data: the builders produce an `HttpRequest` without
//! touching the network and a `Transport` executes it. Responses are the
//! one place where a live resource crosses the boundary, so `RawResponse`
//! carries its body as a `ResponseBody` that must be released exactly once
//! (see `response::parse_response`).

use std::fmt;
use std::io::{self, Read};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// POST and PUT enclose an entity; GET and DELETE never carry a body.
    pub fn is_entity_enclosing(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }

    /// Methods that may be replayed when the server answers 503.
    pub fn is_retryable(self) -> bool {
        matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-formed outgoing request.
///
/// Built by the functions in `builder`. `body` is `Some` exactly when
/// `method.is_entity_enclosing()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// First header value matching `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response body that holds a transport resource until released.
pub trait ResponseBody: Read + Send {
    /// Give the underlying resource back to the transport.
    ///
    /// Called exactly once by the parser, after which the body is never read
    /// again.
    fn release(&mut self) -> io::Result<()>;
}

/// A response as handed over by a `Transport`, body not yet consumed.
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn ResponseBody>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Declared `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
