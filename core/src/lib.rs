//! Authenticated HTTP access layer for REST-style API servers.
//!
//! # Overview
//! Talks to Kubernetes-style API servers, Jenkins, and similar services that
//! need per-request authentication. Builders turn a URL, an auth scheme, and
//! an optional JSON body into an `HttpRequest`; a `Requester` executes it over
//! one pooled connection handle and parses the body into a
//! `serde_json::Value`; `ApiClient` is the façade service clients build on.
//!
//! # Design
//! - Builders are pure: URL validation and header assembly happen before any
//!   I/O.
//! - A `Requester` exclusively owns its handle. Sends on one requester are
//!   serialised; long-lived reads take a clone with its own handle.
//! - Connection policy disables every timeout; closing the requester is the
//!   way to cancel a pending read.
//! - Response bodies are released exactly once, even when parsing fails.

pub mod auth;
pub mod builder;
pub mod client;
pub mod error;
pub mod http;
pub mod jenkins;
pub mod policy;
pub mod requester;
pub mod response;
pub mod transport;

#[cfg(test)]
mod fake;

pub use auth::{AuthScheme, Credential};
pub use builder::{
    build_basic_delete, build_basic_get, build_basic_post, build_basic_put, build_bearer_delete,
    build_bearer_get, build_bearer_post, build_bearer_put, build_request, build_user_token_get,
    encode_basic_credentials, json_body,
};
pub use client::ApiClient;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, RawResponse, ResponseBody};
pub use jenkins::JenkinsClient;
pub use policy::ConnectionPolicy;
pub use requester::{HandleId, Requester};
pub use response::parse_response;
pub use transport::{Connector, Transport, UreqConnector, UreqTransport};
