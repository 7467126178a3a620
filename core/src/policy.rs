//! Transport settings applied once when a connection handle is created.
//!
//! # Design
//! The layer targets long-lived control-plane connections (list-and-watch
//! style reads), so no timeout is set anywhere: a watch may legitimately sit
//! idle for hours. Cancellation belongs to the caller, who closes the owning
//! requester. Connections stay pooled until the handle is closed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Idle age given to the pool so pooled connections are never expired.
///
/// ureq needs a finite value; a year is beyond any realistic idle period.
pub const UNBOUNDED_IDLE_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Connection settings for one handle. Not changeable per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPolicy {
    /// Keep connections open between requests and reuse them.
    pub keep_alive: bool,
    /// Upper bound on pooled connections per host.
    pub max_idle_connections_per_host: usize,
    /// `None` disables the connect timeout.
    #[serde(with = "optional_millis")]
    pub connect_timeout: Option<Duration>,
    /// `None` disables the read timeout for headers and body.
    #[serde(with = "optional_millis")]
    pub read_timeout: Option<Duration>,
    /// How often a GET answered with 503 is replayed.
    pub max_unavailable_retries: u32,
    /// Pause between 503 replays.
    #[serde(with = "millis")]
    pub retry_interval: Duration,
    /// `None` keeps connections for the lifetime of the handle.
    #[serde(with = "optional_millis")]
    pub connection_ttl: Option<Duration>,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_idle_connections_per_host: 8,
            connect_timeout: None,
            read_timeout: None,
            max_unavailable_retries: 1,
            retry_interval: Duration::from_secs(1),
            connection_ttl: None,
        }
    }
}

impl ConnectionPolicy {
    /// Idle age handed to the pool: the TTL when set, otherwise unbounded.
    /// Zero when keep-alive is off, so nothing is pooled.
    pub fn idle_age(&self) -> Duration {
        if !self.keep_alive {
            return Duration::ZERO;
        }
        self.connection_ttl.unwrap_or(UNBOUNDED_IDLE_AGE)
    }

    pub fn idle_connections_per_host(&self) -> usize {
        if self.keep_alive {
            self.max_idle_connections_per_host
        } else {
            0
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(to_millis::<S::Error>(value)?)
    }

    /// Whole milliseconds, or an error when they do not fit in a `u64`.
    pub(super) fn to_millis<E: ser::Error>(value: &Duration) -> Result<u64, E> {
        u64::try_from(value.as_millis())
            .map_err(|_| E::custom(format!("duration {value:?} exceeds u64 milliseconds")))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&super::millis::to_millis::<S::Error>(d)?),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
