//! Plain-text `host:port` lists.

use async_trait::async_trait;
use log::debug;
use url::Url;

use crate::error::{DecodeError, FetchError};
use crate::proxy::ProxyRecord;
use crate::source::{Fetcher, Source};

/// A source reading plain-text proxy lists, one `host:port` per line.
///
/// `http` and `https` URLs are fetched over the network, anything else is
/// read as a local file path.
pub struct PlainListSource {
    name: String,
    locations: Vec<String>,
    fetcher: Fetcher,
}

impl PlainListSource {
    pub fn new(name: impl Into<String>, locations: Vec<impl Into<String>>, fetcher: Fetcher) -> Self {
        Self {
            name: name.into(),
            locations: locations.into_iter().map(Into::into).collect(),
            fetcher,
        }
    }
}

#[async_trait]
impl Source for PlainListSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn seed_locations(&self) -> Vec<String> {
        self.locations.clone()
    }

    fn decode(&self, raw: &str) -> Result<Vec<ProxyRecord>, DecodeError> {
        Ok(parse_proxy_list(raw))
    }

    fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    async fn fetch(&self, location: &str) -> Result<Option<String>, FetchError> {
        if is_remote(location) {
            return self.fetcher.fetch(location).await.map(Some);
        }
        match tokio::fs::read_to_string(location).await {
            Ok(content) => Ok(Some(content)),
            Err(err) => {
                debug!("cannot read proxy list {}: {}", location, err);
                Ok(None)
            }
        }
    }
}

fn is_remote(location: &str) -> bool {
    Url::parse(location).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Parse text content into candidate records.
///
/// Accepts `host:port` lines with an optional `scheme://` prefix and ignores
/// blank lines, `#` comments and anything that is not a valid identity.
pub fn parse_proxy_list(content: &str) -> Vec<ProxyRecord> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let address = line.split_once("://").map_or(line, |(_, rest)| rest);
            let address = address.split_whitespace().next()?;
            address.parse::<ProxyRecord>().ok()
        })
        .collect()
}
