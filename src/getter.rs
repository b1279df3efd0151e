//! Fill cycle: crawl sources into the pool.

use log::{info, warn};
use std::sync::Arc;

use crate::error::StoreError;
use crate::source::{Batches, Source};
use crate::store::PoolStore;

/// What one fill cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillReport {
    /// The pool was already full and no source was crawled.
    pub skipped: bool,
    /// Batches handed to the store.
    pub batches: usize,
    /// Locations whose fetch failed for good.
    pub failed_locations: usize,
    /// Identities that were new to the pool.
    pub admitted: usize,
}

/// Crawls every source in turn and admits what they find.
pub struct Getter {
    store: Arc<PoolStore>,
    sources: Vec<Box<dyn Source>>,
    capacity_threshold: usize,
    deduction: i64,
}

impl Getter {
    pub fn new(
        store: Arc<PoolStore>,
        sources: Vec<Box<dyn Source>>,
        capacity_threshold: usize,
        deduction: i64,
    ) -> Self {
        Self {
            store,
            sources,
            capacity_threshold,
            deduction,
        }
    }

    /// Names of the sources, in crawl order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Whether the pool holds at least the capacity threshold.
    pub async fn is_full(&self) -> Result<bool, StoreError> {
        Ok(self.store.count().await? >= self.capacity_threshold)
    }

    /// Run one fill cycle.
    ///
    /// Does nothing when the pool is full. Otherwise crawls the sources one
    /// after the other; a location that fails after retries is logged and
    /// skipped. Only store errors abort the cycle.
    pub async fn run(&self) -> Result<FillReport, StoreError> {
        if self.is_full().await? {
            info!("pool is full, skipping getter cycle");
            return Ok(FillReport {
                skipped: true,
                ..FillReport::default()
            });
        }

        let mut report = FillReport::default();
        for source in &self.sources {
            info!("crawler {} to get proxy", source.name());
            let mut batches = Batches::new(source.as_ref());
            while let Some(batch) = batches.next().await {
                let batch = match batch {
                    Ok(batch) => batch,
                    Err(err) => {
                        warn!("crawler {} skipped a location: {}", source.name(), err);
                        report.failed_locations += 1;
                        continue;
                    }
                };
                let admitted = self.store.admit_batch(&batch, self.deduction).await?;
                info!(
                    "batch_add {} proxies from {}, number of new proxy: {}",
                    batch.len(),
                    source.name(),
                    admitted
                );
                report.batches += 1;
                report.admitted += admitted;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryStore;
    use crate::proxy::ProxyRecord;
    use crate::source::testing::{Scripted, ScriptedSource};
    use std::sync::atomic::Ordering;

    fn store() -> Arc<PoolStore> {
        Arc::new(PoolStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::starting_now()),
        ))
    }

    #[tokio::test]
    async fn admits_every_batch_of_every_source() {
        let store = store();
        let sources: Vec<Box<dyn Source>> = vec![
            Box::new(ScriptedSource::new(
                "one",
                vec![("a", Scripted::Body("1.1.1.1:80\n2.2.2.2:80"))],
            )),
            Box::new(ScriptedSource::new(
                "two",
                vec![("b", Scripted::Body("3.3.3.3:80\n1.1.1.1:80"))],
            )),
        ];
        let getter = Getter::new(store.clone(), sources, 100, 0);
        let report = getter.run().await.unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.admitted, 3);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failing_locations_do_not_stop_the_cycle() {
        let store = store();
        let broken = ScriptedSource::new(
            "broken",
            vec![("down", Scripted::Refused), ("slow", Scripted::Timeout)],
        );
        let healthy = ScriptedSource::new("healthy", vec![("up", Scripted::Body("4.4.4.4:80"))]);
        let sources: Vec<Box<dyn Source>> = vec![Box::new(broken), Box::new(healthy)];
        let getter = Getter::new(store.clone(), sources, 100, 0);
        let report = getter.run().await.unwrap();
        assert_eq!(report.failed_locations, 1);
        assert_eq!(report.admitted, 1);
        assert!(store
            .exists(&ProxyRecord::new("4.4.4.4", 80, 0))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn a_full_pool_skips_crawling_entirely() {
        let store = store();
        let now = store.now();
        store
            .admit_batch(
                &[
                    ProxyRecord::new("1.1.1.1", 80, now + 100),
                    ProxyRecord::new("2.2.2.2", 80, now + 100),
                ],
                0,
            )
            .await
            .unwrap();

        let source = Arc::new(ScriptedSource::new(
            "counted",
            vec![("a", Scripted::Body("3.3.3.3:80"))],
        ));
        let sources: Vec<Box<dyn Source>> = vec![Box::new(source.clone())];
        let getter = Getter::new(store.clone(), sources, 2, 0);
        let report = getter.run().await.unwrap();
        assert!(report.skipped);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
