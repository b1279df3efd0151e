//! Scored pool of proxies.
//!
//! Each proxy identity is stored with a single integer rank: its expiry time
//! minus a safety margin. That one number orders entries by freshness and
//! decides expiry, so every query the pool needs is a single range predicate
//! on it:
//!
//! * valid entries: `rank >= now`
//! * expired entries: `rank < now`

use async_trait::async_trait;
use log::{debug, info};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::{PoolEmpty, PoolError, StoreError};
use crate::memory::MemoryStore;
use crate::proxy::ProxyRecord;

/// Ordered member->score store the pool is built on.
///
/// Implementations must make every call atomic against concurrent callers.
/// No multi-call transactions are required.
#[async_trait]
pub trait ScoredStore: Send + Sync {
    /// Insert or overwrite members with their scores. Returns how many members
    /// did not exist before the call.
    async fn upsert(&self, members: &[(String, i64)]) -> Result<usize, StoreError>;

    /// Members with `min <= score` (and `score <= max` when given), with
    /// their scores, in ascending score order.
    async fn range_by_score(
        &self,
        min: i64,
        max: Option<i64>,
    ) -> Result<Vec<(String, i64)>, StoreError>;

    /// Number of members [`ScoredStore::range_by_score`] would return.
    async fn count_range(&self, min: i64, max: Option<i64>) -> Result<usize, StoreError> {
        Ok(self.range_by_score(min, max).await?.len())
    }

    /// Remove one member. Returns false when it was absent.
    async fn remove(&self, member: &str) -> Result<bool, StoreError>;

    /// Remove every member with `score < bound`. Returns how many were removed.
    async fn remove_below(&self, bound: i64) -> Result<usize, StoreError>;

    /// Score of a member, if present.
    async fn score(&self, member: &str) -> Result<Option<i64>, StoreError>;
}

/// The pool of proxies, ranked by expiry.
pub struct PoolStore {
    backend: Arc<dyn ScoredStore>,
    clock: Arc<dyn Clock>,
}

impl PoolStore {
    /// Create a pool over the given backend and clock.
    pub fn new(backend: Arc<dyn ScoredStore>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Create a pool kept in process memory, ranked against the wall clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    /// The clock the pool ranks against.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Admit one record with rank `expire_at - deduction`.
    ///
    /// Returns false, without touching the store, when the identity is
    /// malformed. Otherwise returns whether the identity was new; re-admitting
    /// an existing identity refreshes its rank.
    pub async fn admit_one(&self, record: &ProxyRecord, deduction: i64) -> Result<bool, StoreError> {
        if !record.is_valid() {
            info!("invalid proxy {}, throw it", record);
            return Ok(false);
        }
        let created = self
            .backend
            .upsert(&[(record.identity(), rank(record, deduction))])
            .await?;
        Ok(created > 0)
    }

    /// Admit a batch in one store round-trip, skipping malformed records.
    ///
    /// Duplicate identities in the batch collapse to the last occurrence.
    /// Returns the number of identities that were new to the pool.
    pub async fn admit_batch(
        &self,
        records: &[ProxyRecord],
        deduction: i64,
    ) -> Result<usize, StoreError> {
        let mut members: Vec<(String, i64)> = Vec::with_capacity(records.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());

        for record in records {
            if !record.is_valid() {
                info!("invalid proxy {}, throw it", record);
                continue;
            }
            let identity = record.identity();
            let score = rank(record, deduction);
            match positions.get(&identity) {
                Some(&at) => members[at].1 = score,
                None => {
                    positions.insert(identity.clone(), members.len());
                    members.push((identity, score));
                }
            }
        }

        if members.is_empty() {
            return Ok(0);
        }
        self.backend.upsert(&members).await
    }

    /// Pick a record uniformly at random among the currently valid ones.
    pub async fn pick_random(&self) -> Result<ProxyRecord, PoolError> {
        let mut valid = self.list_all().await?;
        if valid.is_empty() {
            return Err(PoolEmpty.into());
        }
        let idx = rand::rng().random_range(0..valid.len());
        Ok(valid.swap_remove(idx))
    }

    /// Remove a record. Removing an absent record is a no-op returning false.
    pub async fn remove(&self, record: &ProxyRecord) -> Result<bool, StoreError> {
        let removed = self.backend.remove(&record.identity()).await?;
        if removed {
            info!("{} remove", record);
        }
        Ok(removed)
    }

    /// Delete every record ranked below now.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let removed = self.backend.remove_below(self.now()).await?;
        info!("removed {} expired proxies", removed);
        Ok(removed)
    }

    /// Whether the identity is stored, valid or not.
    pub async fn exists(&self, record: &ProxyRecord) -> Result<bool, StoreError> {
        Ok(self.backend.score(&record.identity()).await?.is_some())
    }

    /// Number of currently valid records.
    pub async fn count(&self) -> Result<usize, StoreError> {
        self.backend.count_range(self.now(), None).await
    }

    /// Every currently valid record, oldest rank first.
    ///
    /// `expire_at` of the returned records carries the stored rank.
    pub async fn list_all(&self) -> Result<Vec<ProxyRecord>, StoreError> {
        let entries = self.backend.range_by_score(self.now(), None).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(identity, score)| match ProxyRecord::from_identity(&identity, score) {
                Ok(record) => Some(record),
                Err(err) => {
                    debug!("skipping stored entry: {}", err);
                    None
                }
            })
            .collect())
    }
}

fn rank(record: &ProxyRecord, deduction: i64) -> i64 {
    record.expire_at.saturating_sub(deduction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const NOW: i64 = 1_700_000_000;

    fn pool() -> (PoolStore, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let backend = Arc::new(MemoryStore::new());
        let store = PoolStore::new(backend.clone(), clock.clone());
        (store, clock, backend)
    }

    #[tokio::test]
    async fn rank_is_expiry_minus_deduction() {
        let (store, _, backend) = pool();
        let record = ProxyRecord::new("1.2.3.4", 80, NOW + 100);
        assert!(store.admit_one(&record, 30).await.unwrap());
        assert_eq!(backend.score("1.2.3.4:80").await.unwrap(), Some(NOW + 70));
    }

    #[tokio::test]
    async fn malformed_records_never_reach_the_backend() {
        let (store, _, backend) = pool();
        let bad = ProxyRecord::new("not-an-ip", 80, NOW + 100);
        assert!(!store.admit_one(&bad, 0).await.unwrap());
        let admitted = store
            .admit_batch(&[bad, ProxyRecord::new("1.2.3.4", 80, NOW + 100)], 0)
            .await
            .unwrap();
        assert_eq!(admitted, 1);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn readmission_refreshes_rank_without_duplicating() {
        let (store, _, backend) = pool();
        let record = ProxyRecord::new("1.2.3.4", 80, NOW + 10);
        assert!(store.admit_one(&record, 0).await.unwrap());
        let refreshed = ProxyRecord::new("1.2.3.4", 80, NOW + 500);
        assert!(!store.admit_one(&refreshed, 0).await.unwrap());
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.score("1.2.3.4:80").await.unwrap(), Some(NOW + 500));
    }

    #[tokio::test]
    async fn duplicate_identities_in_one_batch_keep_the_last_rank() {
        let (store, _, backend) = pool();
        let batch = [
            ProxyRecord::new("1.2.3.4", 80, NOW + 10),
            ProxyRecord::new("1.2.3.4", 80, NOW + 20),
        ];
        assert_eq!(store.admit_batch(&batch, 0).await.unwrap(), 1);
        assert_eq!(backend.score("1.2.3.4:80").await.unwrap(), Some(NOW + 20));
    }

    #[tokio::test]
    async fn expiry_boundary_is_inclusive_for_valid_entries() {
        let (store, clock, _) = pool();
        store
            .admit_one(&ProxyRecord::new("1.2.3.4", 80, NOW), 0)
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        clock.advance(1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn exists_sees_expired_entries_until_purged() {
        let (store, clock, _) = pool();
        let record = ProxyRecord::new("1.2.3.4", 80, NOW + 5);
        store.admit_one(&record, 0).await.unwrap();
        clock.advance(10);
        assert!(store.exists(&record).await.unwrap());
        assert!(store.list_all().await.unwrap().is_empty());
        store.purge_expired().await.unwrap();
        assert!(!store.exists(&record).await.unwrap());
    }

    #[tokio::test]
    async fn list_all_skips_unparseable_backend_entries() {
        let (store, _, backend) = pool();
        backend
            .upsert(&[("garbage".to_string(), NOW + 10), ("1.2.3.4:80".to_string(), NOW + 10)])
            .await
            .unwrap();
        let all = store.list_all().await.unwrap();
        assert_eq!(all, vec![ProxyRecord::new("1.2.3.4", 80, NOW + 10)]);
    }
}
