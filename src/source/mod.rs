//! Proxy list sources.
//!
//! A source knows where to look (`seed_locations`), how to fetch a location
//! and how to turn the fetched text into candidate records (`decode`). Adding
//! a source means implementing [`Source`] and registering a constructor in
//! [`SourceRegistry`]; nothing else changes.

mod fatezero;
mod fetch;
mod headers;
mod plain;
mod registry;

pub use fatezero::FatezeroSource;
pub use fetch::{FetchSettings, Fetcher};
pub use headers::random_headers;
pub use plain::{parse_proxy_list, PlainListSource};
pub use registry::{SourceConstructor, SourceRegistry};

use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;

use crate::error::{DecodeError, FetchError};
use crate::proxy::ProxyRecord;

/// A pluggable provider of candidate proxies.
#[async_trait]
pub trait Source: Send + Sync {
    /// Short name used in logs and in the registry.
    fn name(&self) -> &str;

    /// Locations to poll, in order. May be recomputed on every cycle.
    async fn seed_locations(&self) -> Vec<String>;

    /// Parse fetched content into candidate records.
    fn decode(&self, raw: &str) -> Result<Vec<ProxyRecord>, DecodeError>;

    /// The fetcher used by the default [`Source::fetch`].
    fn fetcher(&self) -> &Fetcher;

    /// Fetch the raw content of one location. `None` means nothing to decode.
    async fn fetch(&self, location: &str) -> Result<Option<String>, FetchError> {
        self.fetcher().fetch(location).await.map(Some)
    }

    /// Start a fresh pass over this source's locations.
    fn batches(&self) -> Batches<'_>
    where
        Self: Sized,
    {
        Batches::new(self)
    }
}

#[async_trait]
impl<S: Source + ?Sized> Source for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn seed_locations(&self) -> Vec<String> {
        (**self).seed_locations().await
    }

    fn decode(&self, raw: &str) -> Result<Vec<ProxyRecord>, DecodeError> {
        (**self).decode(raw)
    }

    fn fetcher(&self) -> &Fetcher {
        (**self).fetcher()
    }

    async fn fetch(&self, location: &str) -> Result<Option<String>, FetchError> {
        (**self).fetch(location).await
    }
}

/// Lazy cursor over a source, yielding one batch of candidates per location.
///
/// Locations are resolved on the first call to [`Batches::next`]. A new
/// `Batches` starts over from the first location.
pub struct Batches<'a> {
    source: &'a dyn Source,
    locations: Option<Vec<String>>,
    cursor: usize,
}

impl<'a> Batches<'a> {
    pub fn new(source: &'a dyn Source) -> Self {
        Self {
            source,
            locations: None,
            cursor: 0,
        }
    }

    /// The next batch, or `None` once every location has been visited.
    ///
    /// A fetch that fails for good after retries is returned as `Err` so the
    /// caller can skip it; the cursor still moves on.
    pub async fn next(&mut self) -> Option<Result<Vec<ProxyRecord>, FetchError>> {
        if self.locations.is_none() {
            self.locations = Some(self.source.seed_locations().await);
        }
        let location = self.locations.as_ref()?.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(crawl(self.source, &location).await)
    }

    /// Number of locations already visited in this pass.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Fetch and decode one location.
///
/// A timeout or an undecodable payload yields an empty batch. Any other fetch
/// failure is returned.
pub async fn crawl(source: &dyn Source, location: &str) -> Result<Vec<ProxyRecord>, FetchError> {
    info!("fetching {}", location);
    let raw = match source.fetch(location).await {
        Ok(Some(raw)) if !raw.is_empty() => raw,
        Ok(_) => return Ok(Vec::new()),
        Err(err) if err.is_timeout() => {
            error!(
                "source {} crawled proxy unsuccessfully, please check if target url is valid or network issue: {}",
                source.name(),
                err
            );
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };

    match source.decode(&raw) {
        Ok(records) => {
            info!("fetched {} proxies from {}", records.len(), location);
            Ok(records)
        }
        Err(err) => {
            warn!("{}", err);
            Ok(Vec::new())
        }
    }
}
