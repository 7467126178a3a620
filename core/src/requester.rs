//! The long-lived requester: one credential, one connection handle.
//!
//! # Design
//! Two locks with different jobs:
//! - `exchange` serialises execute + parse + release, so two callers never
//!   read response bodies from the same handle at once. Callers block on it.
//! - `handle` guards only the lifecycle of the transport. `close()` takes it
//!   without waiting for `exchange`, shuts the transport down, and lets a
//!   pending read fail instead of hanging.
//!
//! A 503 replay waits on a shutdown channel rather than sleeping, so
//! `close()` also cuts a pending retry pause short.
//!
//! The credential sits behind a `RwLock<Arc<_>>` and is replaced whole,
//! never edited in place. A clone copies the current credential values and
//! connects a brand-new handle through the same connector.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde_json::Value;

use crate::auth::Credential;
use crate::error::ApiError;
use crate::http::{HttpRequest, RawResponse};
use crate::policy::ConnectionPolicy;
use crate::response::{parse_response, ReleaseGuard};
use crate::transport::{Connector, Transport, UreqConnector};

const SERVICE_UNAVAILABLE: u16 = 503;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// Executes requests over one exclusively owned, pooled connection handle.
pub struct Requester {
    credential: RwLock<Arc<Credential>>,
    policy: ConnectionPolicy,
    connector: Arc<dyn Connector>,
    handle_id: HandleId,
    handle: Mutex<Option<Arc<dyn Transport>>>,
    exchange: Mutex<()>,
    // Dropping the sender wakes every wait on `shutdown_rx`.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
}

impl Requester {
    /// Connect a ureq-backed handle with the default policy.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_policy(base_url, token, ConnectionPolicy::default())
    }

    pub fn with_policy(
        base_url: impl Into<String>,
        token: impl Into<String>,
        policy: ConnectionPolicy,
    ) -> Result<Self, ApiError> {
        Self::with_connector(Credential::new(base_url, token), policy, Arc::new(UreqConnector))
    }

    /// Connect a handle through `connector`. Fails with
    /// `ApiError::ConnectionSetup` if the handle cannot be created.
    pub fn with_connector(
        credential: Credential,
        policy: ConnectionPolicy,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ApiError> {
        let transport = connector.connect(&policy).map_err(|err| match err {
            ApiError::ConnectionSetup(_) => err,
            other => ApiError::ConnectionSetup(other.to_string()),
        })?;
        let handle_id = HandleId::next();
        tracing::debug!(handle = %handle_id, base_url = %credential.base_url(), "connected");
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);

        Ok(Self {
            credential: RwLock::new(Arc::new(credential)),
            policy,
            connector,
            handle_id,
            handle: Mutex::new(Some(Arc::from(transport))),
            exchange: Mutex::new(()),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
        })
    }

    /// Execute `request` and parse the response body.
    ///
    /// Concurrent calls on the same requester run one after another. A GET
    /// answered with 503 is replayed according to the policy.
    pub fn send(&self, request: &HttpRequest) -> Result<Value, ApiError> {
        let _exchange = lock(&self.exchange);
        let transport = self.transport()?;

        let mut retries = 0;
        loop {
            let response = transport
                .execute(request)
                .map_err(|err| self.closed_or(err))?;

            if self.should_retry(request, &response, retries) {
                retries += 1;
                drop(ReleaseGuard::new(response.body));
                tracing::debug!(
                    handle = %self.handle_id,
                    method = %request.method,
                    attempt = retries,
                    "service unavailable, retrying"
                );
                self.pause_before_retry()?;
                continue;
            }

            return parse_response(response).map_err(|err| self.closed_or(err));
        }
    }

    /// Shut the handle down. Idempotent; later sends fail with
    /// `ApiError::ClosedHandle`.
    pub fn close(&self) {
        if let Some(transport) = lock(&self.handle).take() {
            transport.shutdown();
            tracing::debug!(handle = %self.handle_id, "closed");
        }
        lock(&self.shutdown_tx).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.handle).is_none()
    }

    /// A new requester with the current credential values, the same policy,
    /// and its own freshly connected handle.
    pub fn try_clone(&self) -> Result<Requester, ApiError> {
        let credential = Credential::clone(&self.credential());
        Requester::with_connector(credential, self.policy.clone(), Arc::clone(&self.connector))
    }

    /// Snapshot of the current credential.
    pub fn credential(&self) -> Arc<Credential> {
        let guard = self.credential.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the credential. Requests already built and clones already
    /// taken are unaffected.
    pub fn set_credential(&self, credential: Credential) {
        let mut guard = self.credential.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(credential);
    }

    /// Derive the next credential from the current one and store it, all
    /// under one write lock, so concurrent updates of different fields are
    /// never lost.
    pub fn update_credential(&self, f: impl FnOnce(&Credential) -> Credential) {
        let mut guard = self.credential.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(f(&guard));
    }

    pub fn policy(&self) -> &ConnectionPolicy {
        &self.policy
    }

    pub fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    /// `base_url` of the current credential followed by `path`.
    pub fn url_for(&self, path: &str) -> String {
        self.credential().url_for(path)
    }

    fn transport(&self) -> Result<Arc<dyn Transport>, ApiError> {
        lock(&self.handle).as_ref().cloned().ok_or(ApiError::ClosedHandle)
    }

    fn should_retry(&self, request: &HttpRequest, response: &RawResponse, retries: u32) -> bool {
        response.status == SERVICE_UNAVAILABLE
            && request.method.is_retryable()
            && retries < self.policy.max_unavailable_retries
    }

    /// Wait `retry_interval`, or fail as soon as the handle is closed.
    fn pause_before_retry(&self) -> Result<(), ApiError> {
        match self.shutdown_rx.recv_timeout(self.policy.retry_interval) {
            Err(RecvTimeoutError::Timeout) if !self.is_closed() => Ok(()),
            _ => Err(ApiError::ClosedHandle),
        }
    }

    /// Failures caused by a concurrent `close()` surface as `ClosedHandle`.
    fn closed_or(&self, err: ApiError) -> ApiError {
        if self.is_closed() {
            ApiError::ClosedHandle
        } else {
            err
        }
    }
}

impl Drop for Requester {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requester")
            .field("credential", &self.credential())
            .field("handle", &self.handle_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
