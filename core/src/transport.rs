//! Connection handles and the factory that creates them.
//!
//! # Design
//! A `Connector` turns a `ConnectionPolicy` into a fresh, exclusively owned
//! `Transport` (the connection handle). Requesters keep the connector so a
//! clone can build its own handle instead of sharing one. The default
//! implementation wraps one `ureq::Agent` per handle; ureq pools and reuses
//! connections per agent, so two handles never share a socket.
//!
//! ureq blocks inside socket reads and offers no way to abort them. Each
//! exchange therefore runs on its own worker thread that forwards the
//! response head and then body chunks over a channel. The caller waits on
//! that channel and on the handle's shutdown channel at the same time, so
//! `shutdown()` releases a caller stuck on a silent peer. The worker exits
//! on its next send once the caller has gone.

use std::io::{self, Read};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use url::Url;

use crate::builder::{encode_basic_credentials, AUTHORIZATION};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, RawResponse, ResponseBody};
use crate::policy::ConnectionPolicy;

/// Bytes the worker reads from the socket per forwarded chunk.
const CHUNK_SIZE: usize = 8 * 1024;

/// A connection handle able to execute requests.
pub trait Transport: Send + Sync {
    /// Send `request` and return the response with its body unread.
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, ApiError>;

    /// Stop accepting requests and make pending waits and body reads fail.
    /// Idempotent.
    fn shutdown(&self);
}

/// Creates connection handles.
pub trait Connector: Send + Sync {
    fn connect(&self, policy: &ConnectionPolicy) -> Result<Box<dyn Transport>, ApiError>;
}

/// Connector producing [`UreqTransport`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqConnector;

impl Connector for UreqConnector {
    fn connect(&self, policy: &ConnectionPolicy) -> Result<Box<dyn Transport>, ApiError> {
        Ok(Box::new(UreqTransport::new(policy)))
    }
}

/// Blocking transport backed by a dedicated [`ureq::Agent`].
#[derive(Debug)]
pub struct UreqTransport {
    agent: ureq::Agent,
    // Nothing is ever sent; dropping the sender disconnects every receiver.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
}

impl UreqTransport {
    pub fn new(policy: &ConnectionPolicy) -> Self {
        let agent = ureq::Agent::config_builder()
            // Status codes are data here; the parser reads every body.
            .http_status_as_error(false)
            .timeout_global(None)
            .timeout_connect(policy.connect_timeout)
            .timeout_recv_response(policy.read_timeout)
            .timeout_recv_body(policy.read_timeout)
            .max_idle_connections_per_host(policy.idle_connections_per_host())
            .max_idle_age(policy.idle_age())
            .build()
            .new_agent();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        Self {
            agent,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
        }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, ApiError> {
        if is_shut_down(&self.shutdown_rx) {
            return Err(ApiError::ClosedHandle);
        }

        let (url, basic) = strip_user_info(&request.url)?;
        let mut headers = request.headers.clone();
        if let Some(value) = basic {
            if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(AUTHORIZATION)) {
                headers.push((AUTHORIZATION.to_string(), value));
            }
        }

        tracing::debug!(method = %request.method, %url, "executing request");

        let exchange = Exchange {
            agent: self.agent.clone(),
            method: request.method,
            url,
            headers,
            body: request.body.clone().unwrap_or_default(),
        };
        let (head_tx, head_rx) = crossbeam_channel::bounded(1);
        let (chunk_tx, chunk_rx) = crossbeam_channel::bounded(1);
        thread::Builder::new()
            .name("apis-exchange".to_string())
            .spawn(move || exchange.run(head_tx, chunk_tx))
            .map_err(ApiError::transport)?;

        let head = select! {
            recv(self.shutdown_rx) -> _ => return Err(ApiError::ClosedHandle),
            recv(head_rx) -> head => head.map_err(|_| ApiError::transport(io::Error::other("exchange worker exited")))?,
        };
        let head = head.map_err(ApiError::transport)?;
        if is_shut_down(&self.shutdown_rx) {
            return Err(ApiError::ClosedHandle);
        }

        Ok(RawResponse {
            status: head.status,
            headers: head.headers,
            body: Box::new(UreqBody {
                chunks: Some(chunk_rx),
                pending: io::Cursor::default(),
                finished: false,
                shutdown: self.shutdown_rx.clone(),
            }),
        })
    }

    fn shutdown(&self) {
        self.shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn is_shut_down(shutdown: &Receiver<()>) -> bool {
    matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected))
}

/// Status line and headers of a response, sent ahead of its body.
struct Head {
    status: u16,
    headers: Vec<(String, String)>,
}

/// One request, owned so it can run on the worker thread.
struct Exchange {
    agent: ureq::Agent,
    method: HttpMethod,
    url: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Exchange {
    /// Perform the request, send its head, then forward the body chunk by
    /// chunk. An empty chunk marks the end of the body.
    fn run(self, head_tx: Sender<Result<Head, ureq::Error>>, chunk_tx: Sender<io::Result<Vec<u8>>>) {
        let response = match self.dispatch() {
            Ok(response) => response,
            Err(err) => {
                let _ = head_tx.send(Err(err));
                return;
            }
        };

        let (parts, body) = response.into_parts();
        let head = Head {
            status: parts.status.as_u16(),
            headers: parts
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        };
        if head_tx.send(Ok(head)).is_err() {
            return;
        }

        // Dropping a fully read reader returns its connection to the pool;
        // dropping it early discards the connection.
        let mut reader = body.into_reader();
        loop {
            let mut buf = vec![0; CHUNK_SIZE];
            let chunk = match reader.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    Ok(buf)
                }
                Err(err) => Err(err),
            };
            let last = !matches!(&chunk, Ok(data) if !data.is_empty());
            if chunk_tx.send(chunk).is_err() || last {
                return;
            }
        }
    }

    fn dispatch(&self) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let url = self.url.as_str();
        let body = self.body.as_bytes();
        match self.method {
            HttpMethod::Get => with_headers(self.agent.get(url), &self.headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), &self.headers).call(),
            HttpMethod::Post => with_headers(self.agent.post(url), &self.headers).send(body),
            HttpMethod::Put => with_headers(self.agent.put(url), &self.headers).send(body),
        }
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Remove `user:token@` from `raw` and return it as a Basic header value.
fn strip_user_info(raw: &str) -> Result<(String, Option<String>), ApiError> {
    let mut url = Url::parse(raw).map_err(|e| ApiError::malformed_url(raw, e))?;
    if url.username().is_empty() && url.password().is_none() {
        return Ok((raw.to_string(), None));
    }

    let decode = |part: &str| {
        urlencoding::decode(part)
            .map(|s| s.into_owned())
            .map_err(|e| ApiError::malformed_url(raw, e))
    };
    let user = decode(url.username())?;
    let token = match url.password() {
        Some(p) => decode(p)?,
        None => String::new(),
    };

    url.set_username("")
        .and_then(|()| url.set_password(None))
        .map_err(|()| ApiError::malformed_url(raw, "url cannot carry user info"))?;

    let value = format!("Basic {}", encode_basic_credentials(&user, &token));
    Ok((url.into(), Some(value)))
}

/// Response body fed by the exchange worker. Stops yielding data once its
/// handle is shut down.
struct UreqBody {
    chunks: Option<Receiver<io::Result<Vec<u8>>>>,
    pending: io::Cursor<Vec<u8>>,
    finished: bool,
    shutdown: Receiver<()>,
}

fn closed_error() -> io::Error {
    io::Error::other("connection handle is closed")
}

impl Read for UreqBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunks) = self.chunks.as_ref() else {
            return Err(io::Error::other("response body already released"));
        };
        loop {
            if is_shut_down(&self.shutdown) {
                return Err(closed_error());
            }
            let n = self.pending.read(buf)?;
            if n > 0 || buf.is_empty() || self.finished {
                return Ok(n);
            }

            let chunk = select! {
                recv(self.shutdown) -> _ => return Err(closed_error()),
                recv(chunks) -> chunk => chunk.map_err(|_| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "response stream ended early")
                })?,
            };
            let data = chunk?;
            if data.is_empty() {
                self.finished = true;
            }
            self.pending = io::Cursor::new(data);
        }
    }
}

impl ResponseBody for UreqBody {
    fn release(&mut self) -> io::Result<()> {
        // The worker notices the dropped receiver on its next send.
        self.chunks.take();
        self.pending = io::Cursor::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    type ChunkSender = Sender<io::Result<Vec<u8>>>;

    fn body() -> (UreqBody, ChunkSender, Sender<()>) {
        let (chunk_tx, chunk_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        let body = UreqBody {
            chunks: Some(chunk_rx),
            pending: io::Cursor::default(),
            finished: false,
            shutdown: shutdown_rx,
        };
        (body, chunk_tx, shutdown_tx)
    }

    #[test]
    fn body_reassembles_forwarded_chunks() {
        let (mut body, chunk_tx, _shutdown) = body();
        let parts: [&[u8]; 3] = [b"{\"items\"", b":[]}", b""];
        let worker = thread::spawn(move || {
            for part in parts {
                chunk_tx.send(Ok(part.to_vec())).unwrap();
            }
        });

        let mut text = String::new();
        body.read_to_string(&mut text).unwrap();
        assert_eq!(text, r#"{"items":[]}"#);
        assert_eq!(body.read(&mut [0; 4]).unwrap(), 0);
        worker.join().unwrap();
    }

    #[test]
    fn shutdown_fails_a_read_waiting_on_a_silent_peer() {
        let (mut body, _chunk_tx, shutdown_tx) = body();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(shutdown_tx);
        });

        let err = body.read(&mut [0; 16]).unwrap_err();
        assert_eq!(err.to_string(), "connection handle is closed");
        closer.join().unwrap();
    }

    #[test]
    fn worker_exit_mid_body_is_unexpected_eof() {
        let (mut body, chunk_tx, _shutdown) = body();
        chunk_tx.send(Ok(b"{\"a\"".to_vec())).unwrap();
        drop(chunk_tx);

        let mut text = String::new();
        let err = body.read_to_string(&mut text).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn released_body_refuses_reads() {
        let (mut body, chunk_tx, _shutdown) = body();
        body.release().unwrap();
        assert!(body.read(&mut [0; 4]).is_err());
        assert!(chunk_tx.send(Ok(b"late".to_vec())).is_err());
    }

    #[test]
    fn plain_url_passes_through() {
        let (url, auth) = strip_user_info("http://h:8080/api/json").unwrap();
        assert_eq!(url, "http://h:8080/api/json");
        assert!(auth.is_none());
    }

    #[test]
    fn user_info_becomes_basic_header() {
        let (url, auth) = strip_user_info("https://u:t@h/api").unwrap();
        assert_eq!(url, "https://h/api");
        assert_eq!(auth.as_deref(), Some("Basic dTp0"));
    }

    #[test]
    fn escaped_user_info_is_decoded_before_encoding() {
        let (_, auth) = strip_user_info("https://me%40corp:p%3Aw@h/").unwrap();
        let expected = format!("Basic {}", encode_basic_credentials("me@corp", "p:w"));
        assert_eq!(auth, Some(expected));
    }

    #[test]
    fn closed_transport_refuses_requests() {
        let transport = UreqTransport::new(&ConnectionPolicy::default());
        transport.shutdown();
        transport.shutdown();
        let req = crate::builder::build_bearer_get(Some("t"), "http://127.0.0.1:9/").unwrap();
        assert!(matches!(transport.execute(&req).unwrap_err(), ApiError::ClosedHandle));
    }
}
