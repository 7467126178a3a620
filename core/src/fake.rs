//! Scripted in-memory transport for unit tests.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::ApiError;
use crate::http::{HttpRequest, RawResponse, ResponseBody};
use crate::policy::ConnectionPolicy;
use crate::transport::{Connector, Transport};

/// Counters shared by every handle a `FakeConnector` creates.
#[derive(Default)]
pub(crate) struct Stats {
    pub connects: AtomicUsize,
    pub executed: AtomicUsize,
    pub released: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub seen: Mutex<Vec<HttpRequest>>,
}

impl Stats {
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.seen.lock().unwrap().last().cloned()
    }
}

pub(crate) enum Reply {
    Json { status: u16, body: String },
    /// 200 response whose body trickles out a few bytes per `delay`.
    Slow { body: String, delay: Duration },
    /// 200 response whose body never ends until the handle shuts down.
    Endless,
    /// Transport failure before any response.
    Fail,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Reply::Json {
            status,
            body: body.to_string(),
        }
    }

    pub fn slow(body: &str, delay: Duration) -> Self {
        Reply::Slow {
            body: body.to_string(),
            delay,
        }
    }
}

type Script = dyn Fn(usize) -> Reply + Send + Sync;

pub(crate) struct FakeConnector {
    script: Arc<Script>,
    stats: Arc<Stats>,
    fail: bool,
}

impl FakeConnector {
    /// Every handle answers the n-th request (counted across handles) with
    /// `script(n)`.
    pub fn replying(script: impl Fn(usize) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(script),
            stats: Arc::default(),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(|_| Reply::Fail),
            stats: Arc::default(),
            fail: true,
        })
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

impl Connector for FakeConnector {
    fn connect(&self, _policy: &ConnectionPolicy) -> Result<Box<dyn Transport>, ApiError> {
        if self.fail {
            return Err(ApiError::ConnectionSetup("tls init failed".to_string()));
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTransport {
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
            shutdown: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct FakeTransport {
    script: Arc<Script>,
    stats: Arc<Stats>,
    shutdown: Arc<AtomicBool>,
}

impl Transport for FakeTransport {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, ApiError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(ApiError::ClosedHandle);
        }
        self.stats.seen.lock().unwrap().push(request.clone());
        let n = self.stats.executed.fetch_add(1, Ordering::SeqCst);

        let (status, data, delay, endless) = match (self.script)(n) {
            Reply::Json { status, body } => (status, body, None, false),
            Reply::Slow { body, delay } => (200, body, Some(delay), false),
            Reply::Endless => (200, String::new(), None, true),
            Reply::Fail => {
                return Err(ApiError::transport(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )))
            }
        };

        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let mut headers = Vec::new();
        if !endless {
            headers.push(("Content-Length".to_string(), data.len().to_string()));
        }
        Ok(RawResponse {
            status,
            headers,
            body: Box::new(FakeBody {
                data: io::Cursor::new(data.into_bytes()),
                delay,
                endless,
                shutdown: Arc::clone(&self.shutdown),
                stats: Arc::clone(&self.stats),
            }),
        })
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeBody {
    data: io::Cursor<Vec<u8>>,
    delay: Option<Duration>,
    endless: bool,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Stats>,
}

impl Read for FakeBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(io::Error::other("handle shut down"));
        }
        if self.endless {
            thread::sleep(Duration::from_millis(1));
            return match buf.first_mut() {
                Some(b) => {
                    *b = b' ';
                    Ok(1)
                }
                None => Ok(0),
            };
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
            let n = buf.len().min(4);
            return self.data.read(&mut buf[..n]);
        }
        self.data.read(buf)
    }
}

impl ResponseBody for FakeBody {
    fn release(&mut self) -> io::Result<()> {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
