//! Pure request builders, one per method and auth scheme.
//!
//! # Design
//! Builders only validate and assemble data; nothing here performs I/O or
//! keeps state. The URL is parsed up front so a malformed target fails with
//! `ApiError::MalformedUrl` before a transport ever sees it. POST and PUT
//! always carry a JSON entity (empty when no body is given); GET and DELETE
//! never do.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::Serialize;
use url::Url;

use crate::auth::AuthScheme;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};

pub const AUTHORIZATION: &str = "Authorization";
pub const CONNECTION: &str = "Connection";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const APPLICATION_JSON: &str = "application/json";

/// Build `method url` with `auth` applied and `body` attached when the method
/// encloses an entity.
pub fn build_request(
    method: HttpMethod,
    url: &str,
    auth: &AuthScheme,
    body: Option<&str>,
) -> Result<HttpRequest, ApiError> {
    let mut target = parse_target(url)?;
    let mut headers = Vec::new();

    match auth {
        AuthScheme::Bearer { token } => {
            if let Some(token) = token {
                headers.push(header(AUTHORIZATION, format!("Bearer {token}")));
            }
            headers.push(header(CONNECTION, "keep-alive"));
        }
        AuthScheme::Basic { encoded } => {
            headers.push(header(AUTHORIZATION, format!("Basic {encoded}")));
            headers.push(header(CONNECTION, "keep-alive"));
        }
        AuthScheme::UserTokenInUrl { user, token } => {
            embed_user_token(&mut target, url, user, token)?;
        }
    }

    let body = if method.is_entity_enclosing() {
        headers.push(header(CONTENT_TYPE, APPLICATION_JSON));
        Some(body.unwrap_or_default().to_string())
    } else {
        None
    };

    Ok(HttpRequest {
        method,
        url: target.into(),
        headers,
        body,
    })
}

/// `None` sends the request without an Authorization header.
pub fn build_bearer_get(token: Option<&str>, url: &str) -> Result<HttpRequest, ApiError> {
    build_request(HttpMethod::Get, url, &bearer(token), None)
}

pub fn build_bearer_post(token: Option<&str>, url: &str, body: Option<&str>) -> Result<HttpRequest, ApiError> {
    build_request(HttpMethod::Post, url, &bearer(token), body)
}

pub fn build_bearer_put(token: Option<&str>, url: &str, body: Option<&str>) -> Result<HttpRequest, ApiError> {
    build_request(HttpMethod::Put, url, &bearer(token), body)
}

pub fn build_bearer_delete(token: Option<&str>, url: &str) -> Result<HttpRequest, ApiError> {
    build_request(HttpMethod::Delete, url, &bearer(token), None)
}

/// `encoded` must already be `base64(user:token)`; see
/// [`encode_basic_credentials`].
pub fn build_basic_get(encoded: &str, url: &str) -> Result<HttpRequest, ApiError> {
    build_request(HttpMethod::Get, url, &basic(encoded), None)
}

pub fn build_basic_post(encoded: &str, url: &str, body: Option<&str>) -> Result<HttpRequest, ApiError> {
    build_request(HttpMethod::Post, url, &basic(encoded), body)
}

pub fn build_basic_put(encoded: &str, url: &str, body: Option<&str>) -> Result<HttpRequest, ApiError> {
    build_request(HttpMethod::Put, url, &basic(encoded), body)
}

pub fn build_basic_delete(encoded: &str, url: &str) -> Result<HttpRequest, ApiError> {
    build_request(HttpMethod::Delete, url, &basic(encoded), None)
}

/// GET with `user:token@` embedded in the URL authority.
pub fn build_user_token_get(user: &str, token: &str, url: &str) -> Result<HttpRequest, ApiError> {
    let auth = AuthScheme::UserTokenInUrl {
        user: user.to_string(),
        token: token.to_string(),
    };
    build_request(HttpMethod::Get, url, &auth, None)
}

/// `base64(user:token)`, the value expected by the Basic builders.
pub fn encode_basic_credentials(user: &str, token: &str) -> String {
    BASE64_STANDARD.encode(format!("{user}:{token}"))
}

/// Serialize a payload into the JSON text the POST/PUT builders expect.
pub fn json_body<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    Ok(serde_json::to_string(value)?)
}

fn bearer(token: Option<&str>) -> AuthScheme {
    AuthScheme::Bearer {
        token: token.map(str::to_string),
    }
}

fn basic(encoded: &str) -> AuthScheme {
    AuthScheme::Basic {
        encoded: encoded.to_string(),
    }
}

fn header(name: &str, value: impl Into<String>) -> (String, String) {
    (name.to_string(), value.into())
}

fn parse_target(url: &str) -> Result<Url, ApiError> {
    let parsed = Url::parse(url).map_err(|e| ApiError::malformed_url(url, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ApiError::malformed_url(url, format!("unsupported scheme {other:?}"))),
    }
}

fn embed_user_token(target: &mut Url, url: &str, user: &str, token: &str) -> Result<(), ApiError> {
    target
        .set_username(user)
        .and_then(|()| target.set_password(Some(token)))
        .map_err(|()| ApiError::malformed_url(url, "url cannot carry user info"))
}
