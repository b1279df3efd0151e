//! Name -> constructor table of the available sources.

use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::source::{FatezeroSource, Fetcher, PlainListSource, Source};

/// Builds a source around a shared fetcher.
pub type SourceConstructor = fn(Fetcher) -> Box<dyn Source>;

const PLAIN_LISTS: &[&str] = &[
    "https://cdn.jsdelivr.net/gh/proxifly/free-proxy-list@main/proxies/protocols/http/data.txt",
    "https://cdn.jsdelivr.net/gh/TheSpeedX/PROXY-List@master/http.txt",
];

fn fatezero(fetcher: Fetcher) -> Box<dyn Source> {
    Box::new(FatezeroSource::new(fetcher))
}

fn plain(fetcher: Fetcher) -> Box<dyn Source> {
    Box::new(PlainListSource::new("plain", PLAIN_LISTS.to_vec(), fetcher))
}

/// Registry of sources, assembled once at startup.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    constructors: BTreeMap<String, SourceConstructor>,
}

impl SourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every source bundled with the crate.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(FatezeroSource::NAME, fatezero)
            .register("plain", plain)
    }

    /// Add or replace a constructor.
    pub fn register(mut self, name: impl Into<String>, constructor: SourceConstructor) -> Self {
        self.constructors.insert(name.into(), constructor);
        self
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Build the named sources, in the order given.
    pub fn build(&self, names: &[String], fetcher: &Fetcher) -> Result<Vec<Box<dyn Source>>, ConfigError> {
        names
            .iter()
            .map(|name| {
                self.constructors
                    .get(name)
                    .map(|construct| construct(fetcher.clone()))
                    .ok_or_else(|| ConfigError::UnknownSource(name.clone()))
            })
            .collect()
    }

    /// Build every registered source.
    pub fn build_all(&self, fetcher: &Fetcher) -> Vec<Box<dyn Source>> {
        self.constructors
            .values()
            .map(|construct| construct(fetcher.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchSettings;

    fn fetcher() -> Fetcher {
        Fetcher::new(FetchSettings::default()).unwrap()
    }

    #[test]
    fn defaults_are_registered() {
        assert_eq!(SourceRegistry::with_defaults().names(), vec!["fatezero", "plain"]);
    }

    #[test]
    fn builds_in_requested_order() {
        let registry = SourceRegistry::with_defaults();
        let sources = registry
            .build(&["plain".to_string(), "fatezero".to_string()], &fetcher())
            .unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["plain", "fatezero"]);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = SourceRegistry::with_defaults()
            .build(&["nope".to_string()], &fetcher())
            .err();
        assert_eq!(err, Some(ConfigError::UnknownSource("nope".into())));
    }

    #[test]
    fn later_registrations_replace_earlier_ones() {
        let registry = SourceRegistry::new()
            .register("x", fatezero)
            .register("x", plain);
        let sources = registry.build_all(&fetcher());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name(), "plain");
    }
}
