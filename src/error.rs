//! Error types for the proxy-pool crate.

use thiserror::Error;

/// Error returned when no currently valid proxy is in the pool.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("No proxy available in pool")]
pub struct PoolEmpty;

/// A `host:port` identity that is not a dotted-quad host with a numeric port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid proxy identity {0:?}")]
pub struct InvalidRecord(pub String);

/// Failure of the ordered store backing the pool.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// Errors raised by the read operations of the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Empty(#[from] PoolEmpty),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure to fetch raw content from a source location.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("timed out fetching {0}")]
    Timeout(String),
    /// The server answered with a non-success status.
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    /// Any other transport failure.
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Classify a reqwest error raised while fetching `url`.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Http {
                url: url.to_string(),
                source: err,
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

/// Raw content a source could not make sense of.
#[derive(Debug, Error)]
#[error("cannot decode {source_name} content: {reason}")]
pub struct DecodeError {
    pub source_name: String,
    pub reason: String,
}

/// Outcome of a failed validation probe.
///
/// Everything but [`ProbeError::Unexpected`] means the proxy itself is bad.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("probe timed out")]
    Timeout,
    #[error("proxy refused the request: {0}")]
    Proxy(String),
    #[error("server disconnected: {0}")]
    Disconnected(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("anonymity check failed: {0}")]
    Anonymity(String),
    /// Something outside the known proxy-failure set, most likely a bug in
    /// the validator rather than a bad proxy.
    #[error("unexpected validator error: {0}")]
    Unexpected(#[source] anyhow::Error),
}

impl ProbeError {
    /// Whether this error is a verdict on the proxy (evict) rather than on
    /// the validator (propagate).
    pub fn is_validation_failure(&self) -> bool {
        !matches!(self, ProbeError::Unexpected(_))
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else if err.is_connect() {
            ProbeError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            ProbeError::MalformedResponse(err.to_string())
        } else if err.is_request() {
            ProbeError::Disconnected(err.to_string())
        } else if err.status().is_some() {
            ProbeError::Proxy(err.to_string())
        } else {
            ProbeError::Unexpected(err.into())
        }
    }
}

/// A validation sweep that hit errors outside the known proxy-failure set.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("{count} validation(s) failed unexpectedly, first: {first}")]
    Validator { count: usize, first: ProbeError },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Invalid pool configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be within {min}..={max} seconds, got {value}")]
    CycleOutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("at least one acceptable validation status is required")]
    NoValidStatus,
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
    #[error("unknown source {0:?}")]
    UnknownSource(String),
}
