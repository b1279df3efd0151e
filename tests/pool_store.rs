use proxy_pool::{ManualClock, MemoryStore, PoolError, PoolStore, ProxyRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const NOW: i64 = 1_700_000_000;

fn pool() -> (Arc<PoolStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(PoolStore::new(Arc::new(MemoryStore::new()), clock.clone()));
    (store, clock)
}

fn record(host: &str, expire_at: i64) -> ProxyRecord {
    ProxyRecord::new(host, 8080, expire_at)
}

#[tokio::test]
async fn time_passing_alone_hides_records() {
    let (store, clock) = pool();
    store.admit_one(&record("1.1.1.1", NOW + 100), 20).await.unwrap();
    store.admit_one(&record("2.2.2.2", NOW + 500), 20).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);

    clock.advance(81);
    assert_eq!(store.count().await.unwrap(), 1);
    for _ in 0..20 {
        assert_eq!(store.pick_random().await.unwrap().host, "2.2.2.2");
    }

    clock.advance(1000);
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(matches!(store.pick_random().await, Err(PoolError::Empty(_))));
}

#[tokio::test]
async fn readmitting_a_batch_never_grows_the_pool() {
    let (store, _) = pool();
    let batch: Vec<ProxyRecord> = (1..=5)
        .map(|i| record(&format!("10.0.0.{i}"), NOW + 100))
        .collect();
    assert_eq!(store.admit_batch(&batch, 0).await.unwrap(), 5);
    assert_eq!(store.admit_batch(&batch, 0).await.unwrap(), 0);
    assert_eq!(store.admit_batch(&batch, 0).await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 5);
}

#[tokio::test]
async fn pick_random_on_an_empty_pool_then_with_one_record() {
    let (store, _) = pool();
    let empty = assert_err!(store.pick_random().await);
    assert!(matches!(empty, PoolError::Empty(_)));

    let only = record("3.3.3.3", NOW + 60);
    assert_ok!(store.admit_one(&only, 0).await);
    let picked = assert_ok!(store.pick_random().await);
    assert_eq!(picked.identity(), only.identity());
}

#[tokio::test]
async fn pick_random_reaches_every_valid_record() {
    let (store, _) = pool();
    let batch: Vec<ProxyRecord> = (1..=3)
        .map(|i| record(&format!("10.0.0.{i}"), NOW + 100))
        .collect();
    store.admit_batch(&batch, 0).await.unwrap();

    let mut seen = HashSet::new();
    for _ in 0..300 {
        seen.insert(store.pick_random().await.unwrap().host);
    }
    assert_eq!(seen.len(), 3);
}

#[tokio::test]
async fn purge_removes_exactly_the_expired_records() {
    let (store, _) = pool();
    let a = record("1.1.1.1", NOW - 10);
    let b = record("2.2.2.2", NOW + 1000);
    store.admit_one(&a, 0).await.unwrap();
    store.admit_one(&b, 0).await.unwrap();

    assert_eq!(store.purge_expired().await.unwrap(), 1);
    assert!(!store.exists(&a).await.unwrap());
    assert!(store.exists(&b).await.unwrap());
}

#[tokio::test]
async fn malformed_records_are_dropped_at_admission() {
    let (store, _) = pool();
    let batch = vec![
        ProxyRecord::new("proxy.example.com", 80, NOW + 100),
        ProxyRecord::new("300.1.1.1", 80, NOW + 100),
        ProxyRecord::new("4.4.4.4", 80, NOW + 100),
    ];
    assert_eq!(store.admit_batch(&batch, 0).await.unwrap(), 1);
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.list_all().await.unwrap()[0].identity(), "4.4.4.4:80");
}

#[tokio::test]
async fn concurrent_admissions_of_one_identity_are_idempotent() {
    let (store, _) = pool();
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .admit_one(&record("5.5.5.5", NOW + 100 + i), 0)
                .await
                .unwrap()
        }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn removal_is_a_no_op_for_absent_records() {
    let (store, _) = pool();
    let r = record("6.6.6.6", NOW + 100);
    store.admit_one(&r, 0).await.unwrap();
    assert!(store.remove(&r).await.unwrap());
    assert!(!store.remove(&r).await.unwrap());
}
