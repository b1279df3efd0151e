//! HTTP fetching for source adapters.

use log::debug;
use reqwest::Client;
use std::time::Duration;

use crate::error::FetchError;
use crate::retry::{retry, RetryPolicy};
use crate::source::headers::random_headers;

/// Fetch settings shared by every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts and backoff between them.
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Fetches raw source content over HTTP.
///
/// Certificate verification is disabled: public proxy lists are frequently
/// served with broken or self-signed certificates, and their content is
/// re-validated by the tester anyway.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    settings: FetchSettings,
}

impl Fetcher {
    /// Create a fetcher with the given settings.
    pub fn new(settings: FetchSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetch `url` as text, retrying with jittered backoff.
    ///
    /// Every attempt sends a freshly randomized set of headers. After the last
    /// attempt the last error is returned.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        retry(&self.settings.retry, |attempt| async move {
            debug!("fetching {} (attempt {})", url, attempt);
            self.fetch_once(url).await
        })
        .await
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(random_headers())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}
