//! Configuration for the proxy pool.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::source::FetchSettings;

/// Allowed tester cycle, in seconds.
pub const TESTER_CYCLE_RANGE: RangeInclusive<u64> = 10..=30;
/// Allowed getter cycle, in seconds.
pub const GETTER_CYCLE_RANGE: RangeInclusive<u64> = 30..=180;

/// Configuration for the proxy pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Stop crawling sources once this many valid proxies are pooled.
    pub capacity_threshold: usize,
    /// Period of the fill cycle.
    pub getter_cycle: Duration,
    /// Period of the validation cycle.
    pub tester_cycle: Duration,
    /// Maximum number of validations in flight at once.
    pub max_workers: usize,
    /// Timeout of every validation probe.
    pub test_timeout: Duration,
    /// Timeout of every source fetch.
    pub fetch_timeout: Duration,
    /// Fetch attempts per source location, including the first.
    pub retry_attempts: usize,
    /// Lower bound of the random wait between fetch attempts.
    pub retry_min_wait: Duration,
    /// Upper bound of the random wait between fetch attempts.
    pub retry_max_wait: Duration,
    /// URL probed through each proxy to check liveness.
    pub test_url: String,
    /// Statuses of the liveness probe that keep a proxy.
    pub valid_statuses: BTreeSet<u16>,
    /// Whether proxies must hide the caller's IP.
    pub test_anonymous: bool,
    /// Endpoint answering `{"origin": "<caller ip>"}`.
    pub anonymity_url: String,
    /// Seconds subtracted from a record's expiry when ranking it.
    pub deduction: i64,
    /// Address the read API listens on.
    pub api_addr: SocketAddr,
    /// Run the fill cycle.
    pub enable_getter: bool,
    /// Run the validation cycle.
    pub enable_tester: bool,
    /// Serve the read API.
    pub enable_server: bool,
    /// Sources to crawl by registry name. Empty means every registered source.
    pub sources: Vec<String>,
}

impl PoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration reading overrides through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(v) = parsed::<usize>(&lookup, "PROXY_NUMBER_MAX")? {
            builder = builder.capacity_threshold(v);
        }
        if let Some(v) = parsed::<u64>(&lookup, "CYCLE_GETTER")? {
            builder = builder.getter_cycle(Duration::from_secs(v));
        }
        if let Some(v) = parsed::<u64>(&lookup, "CYCLE_TESTER")? {
            builder = builder.tester_cycle(Duration::from_secs(v));
        }
        if let Some(v) = parsed::<usize>(&lookup, "TEST_BATCH")? {
            builder = builder.max_workers(v);
        }
        if let Some(v) = parsed::<u64>(&lookup, "TEST_TIMEOUT")? {
            builder = builder.test_timeout(Duration::from_secs(v));
        }
        if let Some(v) = parsed::<u64>(&lookup, "GET_TIMEOUT")? {
            builder = builder.fetch_timeout(Duration::from_secs(v));
        }
        if let Some(v) = parsed::<usize>(&lookup, "RETRIES")? {
            builder = builder.retry_attempts(v);
        }
        if let Some(v) = lookup("TEST_URL") {
            builder = builder.test_url(v);
        }
        if let Some(v) = lookup("TEST_VALID_STATUS") {
            builder = builder.valid_statuses(list::<u16>("TEST_VALID_STATUS", &v)?);
        }
        if let Some(v) = boolean(&lookup, "TEST_ANONYMOUS")? {
            builder = builder.test_anonymous(v);
        }
        if let Some(v) = parsed::<i64>(&lookup, "DEDUCTION_EXPIRATION_TIME")? {
            builder = builder.deduction(v);
        }
        let host = lookup("API_HOST");
        let port = parsed::<u16>(&lookup, "API_PORT")?;
        if host.is_some() || port.is_some() {
            let default = PoolConfigBuilder::DEFAULT_API_ADDR;
            let host = host.unwrap_or_else(|| default.ip().to_string());
            let port = port.unwrap_or(default.port());
            let addr = format!("{host}:{port}");
            let addr = addr.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
                key: "API_HOST".to_string(),
                value: addr.clone(),
            })?;
            builder = builder.api_addr(addr);
        }
        if let Some(v) = boolean(&lookup, "ENABLE_GETTER")? {
            builder = builder.enable_getter(v);
        }
        if let Some(v) = boolean(&lookup, "ENABLE_TESTER")? {
            builder = builder.enable_tester(v);
        }
        if let Some(v) = boolean(&lookup, "ENABLE_SERVER")? {
            builder = builder.enable_server(v);
        }
        if let Some(v) = lookup("SOURCES") {
            builder = builder.sources(list::<String>("SOURCES", &v)?);
        }

        builder.build()
    }

    /// Fetch settings derived from this configuration.
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: self.fetch_timeout,
            retry: RetryPolicy::new(self.retry_attempts, self.retry_min_wait, self.retry_max_wait),
        }
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}

fn boolean(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<bool>, ConfigError> {
    lookup(key)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
        })
        .transpose()
}

fn list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<T>().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// Builder for `PoolConfig`.
pub struct PoolConfigBuilder {
    capacity_threshold: Option<usize>,
    getter_cycle: Option<Duration>,
    tester_cycle: Option<Duration>,
    max_workers: Option<usize>,
    test_timeout: Option<Duration>,
    fetch_timeout: Option<Duration>,
    retry_attempts: Option<usize>,
    retry_wait: Option<(Duration, Duration)>,
    test_url: Option<String>,
    valid_statuses: Option<BTreeSet<u16>>,
    test_anonymous: Option<bool>,
    anonymity_url: Option<String>,
    deduction: Option<i64>,
    api_addr: Option<SocketAddr>,
    enable_getter: Option<bool>,
    enable_tester: Option<bool>,
    enable_server: Option<bool>,
    sources: Vec<String>,
}

impl PoolConfigBuilder {
    const DEFAULT_API_ADDR: SocketAddr =
        SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 5555);

    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            capacity_threshold: None,
            getter_cycle: None,
            tester_cycle: None,
            max_workers: None,
            test_timeout: None,
            fetch_timeout: None,
            retry_attempts: None,
            retry_wait: None,
            test_url: None,
            valid_statuses: None,
            test_anonymous: None,
            anonymity_url: None,
            deduction: None,
            api_addr: None,
            enable_getter: None,
            enable_tester: None,
            enable_server: None,
            sources: Vec::new(),
        }
    }

    /// Set the pool size above which the getter skips its cycle.
    pub fn capacity_threshold(mut self, threshold: usize) -> Self {
        self.capacity_threshold = Some(threshold);
        self
    }

    /// Set the period of the fill cycle.
    pub fn getter_cycle(mut self, cycle: Duration) -> Self {
        self.getter_cycle = Some(cycle);
        self
    }

    /// Set the period of the validation cycle.
    pub fn tester_cycle(mut self, cycle: Duration) -> Self {
        self.tester_cycle = Some(cycle);
        self
    }

    /// Set the maximum number of concurrent validations.
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    /// Set the timeout of validation probes.
    pub fn test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = Some(timeout);
        self
    }

    /// Set the timeout of source fetches.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Set the number of fetch attempts per location.
    pub fn retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    /// Set the bounds of the random wait between fetch attempts.
    pub fn retry_wait(mut self, min: Duration, max: Duration) -> Self {
        self.retry_wait = Some((min, max));
        self
    }

    /// Set the URL used for liveness probes.
    pub fn test_url(mut self, url: impl Into<String>) -> Self {
        self.test_url = Some(url.into());
        self
    }

    /// Set the liveness statuses that keep a proxy.
    pub fn valid_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.valid_statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Enable or disable the anonymity check.
    pub fn test_anonymous(mut self, enabled: bool) -> Self {
        self.test_anonymous = Some(enabled);
        self
    }

    /// Set the IP echo endpoint used by the anonymity check.
    pub fn anonymity_url(mut self, url: impl Into<String>) -> Self {
        self.anonymity_url = Some(url.into());
        self
    }

    /// Set the rank deduction margin, in seconds.
    pub fn deduction(mut self, secs: i64) -> Self {
        self.deduction = Some(secs);
        self
    }

    /// Set the read API address.
    pub fn api_addr(mut self, addr: SocketAddr) -> Self {
        self.api_addr = Some(addr);
        self
    }

    /// Run the getter driver.
    pub fn enable_getter(mut self, enabled: bool) -> Self {
        self.enable_getter = Some(enabled);
        self
    }

    /// Run the tester driver.
    pub fn enable_tester(mut self, enabled: bool) -> Self {
        self.enable_tester = Some(enabled);
        self
    }

    /// Serve the read API.
    pub fn enable_server(mut self, enabled: bool) -> Self {
        self.enable_server = Some(enabled);
        self
    }

    /// Restrict crawling to the named sources.
    pub fn sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<PoolConfig, ConfigError> {
        let (retry_min_wait, retry_max_wait) = self
            .retry_wait
            .unwrap_or((Duration::from_secs(1), Duration::from_secs(3)));
        let config = PoolConfig {
            capacity_threshold: self.capacity_threshold.unwrap_or(50_000),
            getter_cycle: self.getter_cycle.unwrap_or(Duration::from_secs(100)),
            tester_cycle: self.tester_cycle.unwrap_or(Duration::from_secs(20)),
            max_workers: self.max_workers.unwrap_or(20),
            test_timeout: self.test_timeout.unwrap_or(Duration::from_secs(10)),
            fetch_timeout: self.fetch_timeout.unwrap_or(Duration::from_secs(10)),
            retry_attempts: self.retry_attempts.unwrap_or(3),
            retry_min_wait,
            retry_max_wait: retry_max_wait.max(retry_min_wait),
            test_url: self.test_url.unwrap_or_else(|| "http://www.baidu.com".to_string()),
            valid_statuses: self
                .valid_statuses
                .unwrap_or_else(|| [200, 206, 302].into_iter().collect()),
            test_anonymous: self.test_anonymous.unwrap_or(true),
            anonymity_url: self
                .anonymity_url
                .unwrap_or_else(|| "https://httpbin.org/ip".to_string()),
            deduction: self.deduction.unwrap_or(30),
            api_addr: self.api_addr.unwrap_or(Self::DEFAULT_API_ADDR),
            enable_getter: self.enable_getter.unwrap_or(true),
            enable_tester: self.enable_tester.unwrap_or(true),
            enable_server: self.enable_server.unwrap_or(true),
            sources: self.sources,
        };

        check_cycle("tester cycle", config.tester_cycle, TESTER_CYCLE_RANGE)?;
        check_cycle("getter cycle", config.getter_cycle, GETTER_CYCLE_RANGE)?;
        if config.capacity_threshold == 0 {
            return Err(ConfigError::Zero("capacity threshold"));
        }
        if config.max_workers == 0 {
            return Err(ConfigError::Zero("max workers"));
        }
        if config.retry_attempts == 0 {
            return Err(ConfigError::Zero("retry attempts"));
        }
        if config.valid_statuses.is_empty() {
            return Err(ConfigError::NoValidStatus);
        }
        Ok(config)
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Check a cycle period against its allowed range of seconds.
pub fn check_cycle(
    name: &'static str,
    cycle: Duration,
    range: RangeInclusive<u64>,
) -> Result<(), ConfigError> {
    let secs = cycle.as_secs();
    if range.contains(&secs) && cycle.subsec_nanos() == 0 {
        Ok(())
    } else {
        Err(ConfigError::CycleOutOfRange {
            name,
            value: secs,
            min: *range.start(),
            max: *range.end(),
        })
    }
}
