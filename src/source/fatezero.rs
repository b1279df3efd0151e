//! Fatezero proxy list, <http://proxylist.fatezero.org>.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::DecodeError;
use crate::proxy::ProxyRecord;
use crate::source::{Fetcher, Source};

const BASE_URL: &str = "http://proxylist.fatezero.org/proxy.list";

#[derive(Debug, Deserialize)]
struct Entry {
    host: String,
    port: u16,
}

/// JSON-lines feed, one `{"host": .., "port": ..}` object per line.
pub struct FatezeroSource {
    fetcher: Fetcher,
}

impl FatezeroSource {
    pub const NAME: &'static str = "fatezero";

    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Source for FatezeroSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn seed_locations(&self) -> Vec<String> {
        vec![BASE_URL.to_string()]
    }

    fn decode(&self, raw: &str) -> Result<Vec<ProxyRecord>, DecodeError> {
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<Entry>(line)
                    .map(|entry| ProxyRecord::discovered(entry.host, entry.port))
                    .map_err(|err| DecodeError {
                        source_name: Self::NAME.to_string(),
                        reason: err.to_string(),
                    })
            })
            .collect()
    }

    fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }
}
