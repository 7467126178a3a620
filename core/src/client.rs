//! Caller-facing façade that service-specific clients build on.
//!
//! # Design
//! `ApiClient` owns exactly one `Requester` and delegates credential state to
//! it, so every accessor and mutator goes through the requester's guarded
//! credential cell and all methods take `&self`. `copy()` is the escape hatch
//! for long-lived reads such as watches: the caller gets a detached requester
//! with its own handle and becomes responsible for closing it.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::auth::Credential;
use crate::builder::{build_bearer_delete, build_bearer_get, build_bearer_post, build_bearer_put};
use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::requester::Requester;

/// Holds one requester plus the credential used to build requests for it.
#[derive(Debug)]
pub struct ApiClient {
    requester: Requester,
}

impl ApiClient {
    /// Connect a new client for `base_url` authenticated with `token`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self::from_requester(Requester::new(base_url, token)?))
    }

    pub fn from_requester(requester: Requester) -> Self {
        Self { requester }
    }

    pub fn base_url(&self) -> String {
        self.requester.credential().base_url().to_string()
    }

    pub fn set_base_url(&self, base_url: impl Into<String>) {
        let base_url = base_url.into();
        self.requester.update_credential(|cred| cred.with_base_url(base_url));
    }

    pub fn token(&self) -> SecretString {
        self.requester.credential().token().clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.requester.update_credential(|cred| cred.with_token(token));
    }

    pub fn credential(&self) -> Arc<Credential> {
        self.requester.credential()
    }

    /// `base_url` followed by `path`.
    pub fn url(&self, path: &str) -> String {
        self.requester.url_for(path)
    }

    /// Detached requester with the current credential and a new handle.
    pub fn copy(&self) -> Result<Requester, ApiError> {
        self.requester.try_clone()
    }

    pub fn get_response(&self, request: &HttpRequest) -> Result<Value, ApiError> {
        self.requester.send(request)
    }

    /// Bearer-authenticated GET of `base_url + path`.
    pub fn get(&self, path: &str) -> Result<Value, ApiError> {
        let cred = self.credential();
        let req = build_bearer_get(Some(cred.token().expose_secret()), &cred.url_for(path))?;
        self.get_response(&req)
    }

    pub fn post(&self, path: &str, body: Option<&str>) -> Result<Value, ApiError> {
        let cred = self.credential();
        let req = build_bearer_post(Some(cred.token().expose_secret()), &cred.url_for(path), body)?;
        self.get_response(&req)
    }

    pub fn put(&self, path: &str, body: Option<&str>) -> Result<Value, ApiError> {
        let cred = self.credential();
        let req = build_bearer_put(Some(cred.token().expose_secret()), &cred.url_for(path), body)?;
        self.get_response(&req)
    }

    pub fn delete(&self, path: &str) -> Result<Value, ApiError> {
        let cred = self.credential();
        let req = build_bearer_delete(Some(cred.token().expose_secret()), &cred.url_for(path))?;
        self.get_response(&req)
    }

    pub fn close(&self) {
        self.requester.close();
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }
}
