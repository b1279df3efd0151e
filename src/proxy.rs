//! Proxy record representation and identity parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::InvalidRecord;

/// Lifetime given to freshly discovered proxies, in seconds.
///
/// Scraped lists carry no authoritative TTL, so every candidate gets the same
/// short lease and has to be rediscovered to stay in the pool.
pub const DEFAULT_LIFETIME_SECS: i64 = 60 * 3;

/// A proxy endpoint together with the Unix time at which it expires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyRecord {
    /// Dotted-quad IPv4 address of the proxy.
    pub host: String,
    /// TCP port of the proxy.
    pub port: u16,
    /// Unix timestamp (seconds) after which the record is stale.
    pub expire_at: i64,
}

impl ProxyRecord {
    /// Create a new record.
    pub fn new(host: impl Into<String>, port: u16, expire_at: i64) -> Self {
        Self {
            host: host.into(),
            port,
            expire_at,
        }
    }

    /// Create a record discovered right now, expiring after [`DEFAULT_LIFETIME_SECS`].
    pub fn discovered(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, unix_now() + DEFAULT_LIFETIME_SECS)
    }

    /// The canonical `host:port` identity used as the store key.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the identity of this record is admissible into the pool.
    pub fn is_valid(&self) -> bool {
        is_valid_host(&self.host)
    }

    /// Parse a stored `host:port` identity back into a record carrying `expire_at`.
    pub fn from_identity(identity: &str, expire_at: i64) -> Result<Self, InvalidRecord> {
        let (host, port) = parse_identity(identity)?;
        Ok(Self::new(host, port, expire_at))
    }

    /// The proxy URL used when routing HTTP traffic through this record.
    pub fn http_url(&self) -> String {
        format!("http://{}", self.identity())
    }

    /// Convert the record to a reqwest::Proxy routing all schemes through it.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        reqwest::Proxy::all(self.http_url())
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ProxyRecord {
    type Err = InvalidRecord;

    /// Parse a bare `host:port`, expiring after the default lifetime.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = parse_identity(s)?;
        Ok(Self::discovered(host, port))
    }
}

/// Split and validate a `host:port` identity.
pub fn parse_identity(identity: &str) -> Result<(String, u16), InvalidRecord> {
    let identity = identity.trim();
    let invalid = || InvalidRecord(identity.to_string());

    let (host, port) = identity.split_once(':').ok_or_else(invalid)?;
    if !is_valid_host(host) || !is_valid_port(port) {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

/// Check that `host` is a dotted-quad IPv4 address with octets in 0..=255.
pub fn is_valid_host(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|octet| {
            !octet.is_empty()
                && octet.bytes().all(|b| b.is_ascii_digit())
                && octet.parse::<u16>().is_ok_and(|n| n <= 255)
        })
}

/// Check that `port` is purely numeric and fits a TCP port.
pub fn is_valid_port(port: &str) -> bool {
    !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) && port.parse::<u16>().is_ok()
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trips_through_parse() {
        let record = ProxyRecord::new("10.0.0.1", 8080, 42);
        assert_eq!(record.identity(), "10.0.0.1:8080");
        assert_eq!(ProxyRecord::from_identity("10.0.0.1:8080", 42).unwrap(), record);
    }

    #[test]
    fn rejects_malformed_identities() {
        for bad in [
            "example.com:80",
            "10.0.0:80",
            "10.0.0.256:80",
            "10.0.0.1:http",
            "10.0.0.1:",
            "10.0.0.1:70000",
            "10.0.0.1",
            "10.0.0.-1:80",
            "",
        ] {
            assert!(parse_identity(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn accepts_surrounding_whitespace() {
        let (host, port) = parse_identity(" 1.2.3.4:3128\n").unwrap();
        assert_eq!(host, "1.2.3.4");
        assert_eq!(port, 3128);
    }

    #[test]
    fn host_validation_only_takes_dotted_quads() {
        assert!(is_valid_host("0.0.0.0"));
        assert!(is_valid_host("255.255.255.255"));
        assert!(!is_valid_host("1.2.3.4.5"));
        assert!(!is_valid_host("localhost"));
        assert!(!ProxyRecord::new("proxy.local", 80, 0).is_valid());
    }

    #[test]
    fn discovered_records_expire_in_the_future() {
        let record: ProxyRecord = "8.8.8.8:53".parse().unwrap();
        let now = unix_now();
        assert!(record.expire_at > now);
        assert!(record.expire_at <= now + DEFAULT_LIFETIME_SECS);
    }

    #[test]
    fn http_url_uses_identity() {
        assert_eq!(ProxyRecord::new("1.1.1.1", 80, 0).http_url(), "http://1.1.1.1:80");
    }
}
