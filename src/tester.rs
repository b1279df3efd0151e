//! Validation sweep over the pooled proxies.

use async_trait::async_trait;
use futures::future;
use log::{debug, error, info};
use reqwest::{redirect, Client};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::PoolConfig;
use crate::error::{ProbeError, StoreError, SweepError};
use crate::proxy::ProxyRecord;
use crate::store::PoolStore;

/// Network probes a validation is made of.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Origin IP the echo endpoint sees, directly or through `via`.
    async fn origin_ip(&self, via: Option<&ProxyRecord>) -> Result<String, ProbeError>;

    /// Status of the liveness probe sent through `proxy`, redirects disabled.
    async fn status_through(&self, proxy: &ProxyRecord) -> Result<u16, ProbeError>;
}

#[derive(Deserialize)]
struct Echo {
    origin: String,
}

/// Prober speaking HTTP through reqwest.
pub struct HttpProber {
    test_url: String,
    echo_url: String,
    timeout: Duration,
    direct: Client,
}

impl HttpProber {
    /// Create a prober using the test and echo URLs of `config`.
    pub fn new(config: &PoolConfig) -> Result<Self, reqwest::Error> {
        Self::with_urls(&config.test_url, &config.anonymity_url, config.test_timeout)
    }

    pub fn with_urls(
        test_url: impl Into<String>,
        echo_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let direct = Self::client_builder(timeout).build()?;
        Ok(Self {
            test_url: test_url.into(),
            echo_url: echo_url.into(),
            timeout,
            direct,
        })
    }

    fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
        Client::builder()
            .no_proxy()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .redirect(redirect::Policy::none())
    }

    fn client_through(&self, proxy: &ProxyRecord) -> Result<Client, ProbeError> {
        let route = proxy
            .to_reqwest_proxy()
            .map_err(|e| ProbeError::Proxy(e.to_string()))?;
        Self::client_builder(self.timeout)
            .proxy(route)
            .build()
            .map_err(|e| ProbeError::Unexpected(e.into()))
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn origin_ip(&self, via: Option<&ProxyRecord>) -> Result<String, ProbeError> {
        let client = match via {
            Some(proxy) => self.client_through(proxy)?,
            None => self.direct.clone(),
        };
        let body = client.get(&self.echo_url).send().await?.text().await?;
        let echo: Echo = serde_json::from_str(&body)
            .map_err(|e| ProbeError::MalformedResponse(e.to_string()))?;
        Ok(echo.origin)
    }

    async fn status_through(&self, proxy: &ProxyRecord) -> Result<u16, ProbeError> {
        let client = self.client_through(proxy)?;
        let response = client.get(&self.test_url).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Tester settings.
#[derive(Debug, Clone)]
pub struct TesterSettings {
    pub max_workers: usize,
    pub valid_statuses: BTreeSet<u16>,
    pub test_anonymous: bool,
}

impl From<&PoolConfig> for TesterSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            valid_statuses: config.valid_statuses.clone(),
            test_anonymous: config.test_anonymous,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records in the snapshot.
    pub tested: usize,
    /// Records that passed validation.
    pub kept: usize,
    /// Records removed for failing validation.
    pub evicted: usize,
    /// Expired records removed after the barrier.
    pub purged: usize,
}

enum Verdict {
    Keep,
    Evict,
}

/// Validates every pooled proxy and evicts the failing ones.
pub struct Tester {
    store: Arc<PoolStore>,
    prober: Arc<dyn Prober>,
    settings: TesterSettings,
}

impl Tester {
    pub fn new(store: Arc<PoolStore>, prober: Arc<dyn Prober>, settings: TesterSettings) -> Self {
        Self {
            store,
            prober,
            settings,
        }
    }

    /// Run one sweep.
    ///
    /// The working set is the snapshot of valid records taken at the start.
    /// At most `max_workers` validations are in flight at once. Once every
    /// validation has finished, expired records are purged. Errors outside
    /// the known proxy-failure set are returned after the purge.
    pub async fn run(&self) -> Result<SweepReport, SweepError> {
        info!("starting tester...");
        let snapshot = self.store.list_all().await?;
        debug!("testing proxies, count {}", snapshot.len());

        let semaphore = Semaphore::new(self.settings.max_workers.max(1));
        let results = future::join_all(
            snapshot
                .iter()
                .map(|proxy| self.test_one(proxy, &semaphore)),
        )
        .await;

        let mut report = SweepReport {
            tested: snapshot.len(),
            ..SweepReport::default()
        };
        let mut unexpected = Vec::new();
        for result in results {
            match result {
                Ok(Verdict::Keep) => report.kept += 1,
                Ok(Verdict::Evict) => report.evicted += 1,
                Err(err) => unexpected.push(err),
            }
        }

        report.purged = self.store.purge_expired().await?;
        info!(
            "tester finished: {} tested, {} kept, {} evicted, {} expired",
            report.tested, report.kept, report.evicted, report.purged
        );

        let count = unexpected.len();
        match unexpected.into_iter().next() {
            None => Ok(report),
            Some(first) => Err(SweepError::Validator { count, first }),
        }
    }

    async fn test_one(&self, proxy: &ProxyRecord, semaphore: &Semaphore) -> Result<Verdict, ProbeError> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|e| ProbeError::Unexpected(e.into()))?;
        debug!("testing {}", proxy);

        match self.validate(proxy).await {
            Ok(()) => {
                debug!("proxy {} is valid", proxy);
                Ok(Verdict::Keep)
            }
            Err(err) if err.is_validation_failure() => {
                debug!("proxy {} is invalid ({}), delete", proxy, err);
                self.evict(proxy).await?;
                Ok(Verdict::Evict)
            }
            Err(err) => {
                error!("validating {} failed unexpectedly: {}", proxy, err);
                Err(err)
            }
        }
    }

    async fn validate(&self, proxy: &ProxyRecord) -> Result<(), ProbeError> {
        if self.settings.test_anonymous {
            let origin = self.prober.origin_ip(None).await?;
            let seen = self.prober.origin_ip(Some(proxy)).await?;
            check_anonymity(proxy, &origin, &seen)?;
        }
        let status = self.prober.status_through(proxy).await?;
        if self.settings.valid_statuses.contains(&status) {
            Ok(())
        } else {
            Err(ProbeError::Proxy(format!("unacceptable status {status}")))
        }
    }

    async fn evict(&self, proxy: &ProxyRecord) -> Result<(), ProbeError> {
        self.store
            .remove(proxy)
            .await
            .map(|_| ())
            .map_err(|e: StoreError| ProbeError::Unexpected(e.into()))
    }
}

/// A proxy is anonymous when it hides the caller's IP and shows its own.
fn check_anonymity(proxy: &ProxyRecord, origin: &str, seen: &str) -> Result<(), ProbeError> {
    if origin == seen {
        return Err(ProbeError::Anonymity(format!(
            "{proxy} leaks the origin ip {origin}"
        )));
    }
    if seen != proxy.host {
        return Err(ProbeError::Anonymity(format!(
            "{proxy} is seen as {seen}"
        )));
    }
    Ok(())
}
