//! Turns a raw response into a JSON document and releases its resource.
//!
//! # Design
//! The body is moved into a `ReleaseGuard` before the first read. The guard
//! releases it on drop, so early returns on read or parse failure cannot leak
//! the resource. On the success path the release is done explicitly so a
//! failure can be logged; it never replaces the parsed document.

use std::io::{self, Read};

use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::http::{RawResponse, ResponseBody};

/// Read and parse `response`, releasing its body exactly once.
///
/// A zero-length (or whitespace-only) body yields an empty JSON object.
/// HTTP status codes are not interpreted: error statuses from API servers
/// carry JSON bodies of their own and are returned like any other document.
pub fn parse_response(response: RawResponse) -> Result<Value, ApiError> {
    let declared_empty = response.content_length() == Some(0);
    tracing::debug!(status = response.status, "parsing response");

    let mut guard = ReleaseGuard::new(response.body);
    let document = read_document(&mut guard, declared_empty)?;

    if let Err(err) = guard.release() {
        tracing::warn!(error = %err, "failed to release response after successful parse");
    }
    Ok(document)
}

fn read_document(body: &mut impl Read, declared_empty: bool) -> Result<Value, ApiError> {
    if declared_empty {
        return Ok(empty_document());
    }

    let mut buf = Vec::new();
    body.read_to_end(&mut buf).map_err(ApiError::response_parse)?;

    if buf.iter().all(u8::is_ascii_whitespace) {
        return Ok(empty_document());
    }
    serde_json::from_slice(&buf).map_err(ApiError::response_parse)
}

fn empty_document() -> Value {
    Value::Object(Map::new())
}

/// Owns a response body and releases it once, at the latest on drop.
pub(crate) struct ReleaseGuard {
    body: Option<Box<dyn ResponseBody>>,
}

impl ReleaseGuard {
    pub(crate) fn new(body: Box<dyn ResponseBody>) -> Self {
        Self { body: Some(body) }
    }

    /// Release now and report the outcome instead of logging it.
    pub(crate) fn release(mut self) -> io::Result<()> {
        match self.body.take() {
            Some(mut body) => body.release(),
            None => Ok(()),
        }
    }
}

impl Read for ReleaseGuard {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.body.as_mut() {
            Some(body) => body.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(mut body) = self.body.take() {
            if let Err(err) = body.release() {
                tracing::warn!(error = %err, "failed to release response");
            }
        }
    }
}
