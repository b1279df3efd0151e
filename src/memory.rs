//! In-process ordered store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use crate::error::StoreError;
use crate::store::ScoredStore;

#[derive(Default)]
struct Inner {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl Inner {
    fn insert(&mut self, member: String, score: i64) -> bool {
        let created = match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.ordered.remove(&(old, member.clone()));
                false
            }
            None => true,
        };
        self.ordered.insert((score, member));
        created
    }

    fn range(&self, min: i64, max: Option<i64>) -> impl Iterator<Item = &(i64, String)> {
        let upper = match max {
            // (max, "") sorts before every member with score max, so bump to
            // the next score to make the upper bound inclusive. An inverted
            // range collapses to the empty range starting at min.
            Some(max) => match max.max(min.saturating_sub(1)).checked_add(1) {
                Some(next) => Bound::Excluded((next, String::new())),
                None => Bound::Unbounded,
            },
            None => Bound::Unbounded,
        };
        self.ordered
            .range((Bound::Included((min, String::new())), upper))
    }
}

/// Sorted-set store held in memory.
///
/// Every operation takes the lock once, so each call is atomic with respect
/// to concurrent callers.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of members regardless of score.
    pub fn len(&self) -> usize {
        self.inner.read().scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ScoredStore for MemoryStore {
    async fn upsert(&self, members: &[(String, i64)]) -> Result<usize, StoreError> {
        let mut inner = self.inner.write();
        let mut created = 0;
        for (member, score) in members {
            if inner.insert(member.clone(), *score) {
                created += 1;
            }
        }
        Ok(created)
    }

    async fn range_by_score(
        &self,
        min: i64,
        max: Option<i64>,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .range(min, max)
            .map(|(score, member)| (member.clone(), *score))
            .collect())
    }

    async fn count_range(&self, min: i64, max: Option<i64>) -> Result<usize, StoreError> {
        Ok(self.inner.read().range(min, max).count())
    }

    async fn remove(&self, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        match inner.scores.remove(member) {
            Some(score) => {
                inner.ordered.remove(&(score, member.to_string()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_below(&self, bound: i64) -> Result<usize, StoreError> {
        let mut inner = self.inner.write();
        let keep = inner.ordered.split_off(&(bound, String::new()));
        let expired = std::mem::replace(&mut inner.ordered, keep);
        for (_, member) in &expired {
            inner.scores.remove(member);
        }
        Ok(expired.len())
    }

    async fn score(&self, member: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.inner.read().scores.get(member).copied())
    }
}
