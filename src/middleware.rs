//! Middleware implementation for reqwest.

use crate::error::{PoolEmpty, PoolError};
use crate::store::PoolStore;

use anyhow::anyhow;
use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use log::{info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Middleware that sends each request through a proxy drawn from the pool.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    /// The proxy pool.
    store: Arc<PoolStore>,
    /// Number of times to retry a request with a different proxy.
    retry_count: usize,
    /// Timeout of each proxied attempt.
    timeout: Duration,
    /// Per-proxy request rate limiter, keyed by identity.
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl ProxyPoolMiddleware {
    /// Create a middleware drawing proxies from `store`.
    pub fn new(store: Arc<PoolStore>) -> Self {
        Self {
            store,
            retry_count: 3,
            timeout: Duration::from_secs(10),
            limiter: Arc::new(RateLimiter::keyed(per_second(5))),
        }
    }

    /// Set the number of times to retry a request with a different proxy.
    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = count;
        self
    }

    /// Set the timeout of each proxied attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum requests per second sent through any single proxy.
    pub fn max_requests_per_second(mut self, rps: u32) -> Self {
        self.limiter = Arc::new(RateLimiter::keyed(per_second(rps)));
        self
    }
}

fn per_second(rps: u32) -> Quota {
    Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN))
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let mut retry_count = 0;

        loop {
            let proxy = match self.store.pick_random().await {
                Ok(proxy) => proxy,
                Err(PoolError::Empty(_)) => {
                    warn!("No proxy available in pool");
                    return Err(Error::Middleware(anyhow!(PoolEmpty)));
                }
                Err(PoolError::Store(err)) => return Err(Error::Middleware(err.into())),
            };

            let proxied_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                ))
            })?;

            let identity = proxy.identity();
            info!("Using proxy: {} (attempt {})", identity, retry_count + 1);
            self.limiter.until_key_ready(&identity).await;

            let client = proxy
                .to_reqwest_proxy()
                .and_then(|route| {
                    reqwest::Client::builder()
                        .proxy(route)
                        .timeout(self.timeout)
                        .build()
                })
                .map_err(Error::Reqwest)?;

            match client.execute(proxied_request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(
                        "Request failed with proxy {} (attempt {}): {}",
                        identity,
                        retry_count + 1,
                        err
                    );
                    if let Err(store_err) = self.store.remove(&proxy).await {
                        warn!("Failed to evict proxy {}: {}", identity, store_err);
                    }
                    // Drop limiter state of proxies that have gone quiet.
                    self.limiter.retain_recent();

                    retry_count += 1;
                    if retry_count > self.retry_count {
                        return Err(Error::Reqwest(err));
                    }
                }
            }
        }
    }
}
