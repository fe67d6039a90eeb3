//! End-to-end tests: façade point operations and scans against an
//! in-memory remote, with fault injection for the retry paths.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use remora_core::BackoffPolicy;
use remora_store::{
    MemoryRemote, RemoteKv, RemoteStateStore, ScanCursor, ScanPage, StoreConfig, StoreError,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Delegating remote that counts every call, can fail the next N calls,
/// and can stall the next `atomic_put` to widen race windows.
struct ChaosRemote {
    inner: MemoryRemote,
    calls: AtomicU64,
    fail_remaining: AtomicU32,
    stall_put_ms: AtomicU64,
}

impl ChaosRemote {
    fn new() -> Self {
        Self {
            inner: MemoryRemote::new(),
            calls: AtomicU64::new(0),
            fail_remaining: AtomicU32::new(0),
            stall_put_ms: AtomicU64::new(0),
        }
    }

    fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    fn stall_next_put(&self, ms: u64) {
        self.stall_put_ms.store(ms, Ordering::SeqCst);
    }

    fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn intercept(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("injected transient failure")
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteKv for ChaosRemote {
    async fn get(&self, raw_key: &[u8]) -> anyhow::Result<Option<Bytes>> {
        self.intercept()?;
        self.inner.get(raw_key).await
    }

    async fn multi_get(&self, raw_keys: &[Vec<u8>]) -> anyhow::Result<Vec<Option<Bytes>>> {
        self.intercept()?;
        self.inner.multi_get(raw_keys).await
    }

    async fn atomic_put(
        &self,
        raw_key: &[u8],
        index_key: &[u8],
        raw_value: &[u8],
        vanilla_key: &[u8],
    ) -> anyhow::Result<()> {
        self.intercept()?;
        let stall = self.stall_put_ms.swap(0, Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }
        self.inner
            .atomic_put(raw_key, index_key, raw_value, vanilla_key)
            .await
    }

    async fn atomic_put_if_absent(
        &self,
        raw_key: &[u8],
        index_key: &[u8],
        raw_value: &[u8],
        vanilla_key: &[u8],
    ) -> anyhow::Result<Option<Bytes>> {
        self.intercept()?;
        self.inner
            .atomic_put_if_absent(raw_key, index_key, raw_value, vanilla_key)
            .await
    }

    async fn atomic_delete(
        &self,
        raw_key: &[u8],
        index_key: &[u8],
        vanilla_key: &[u8],
    ) -> anyhow::Result<Option<Bytes>> {
        self.intercept()?;
        self.inner.atomic_delete(raw_key, index_key, vanilla_key).await
    }

    async fn multi_set(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> anyhow::Result<()> {
        self.intercept()?;
        self.inner.multi_set(entries).await
    }

    async fn index_add_all(
        &self,
        index_key: &[u8],
        vanilla_keys: &[Vec<u8>],
    ) -> anyhow::Result<()> {
        self.intercept()?;
        self.inner.index_add_all(index_key, vanilla_keys).await
    }

    async fn index_scan(
        &self,
        index_key: &[u8],
        cursor: &ScanCursor,
        page_size: usize,
    ) -> anyhow::Result<ScanPage> {
        self.intercept()?;
        self.inner.index_scan(index_key, cursor, page_size).await
    }

    async fn index_len(&self, index_key: &[u8]) -> anyhow::Result<u64> {
        self.intercept()?;
        self.inner.index_len(index_key).await
    }
}

fn tight_backoff() -> BackoffPolicy {
    BackoffPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_attempts: 2,
        max_elapsed: Duration::from_secs(5),
    }
}

fn open_store(
    name: &str,
    page_size: usize,
    remote: Arc<ChaosRemote>,
) -> RemoteStateStore<i32, String, ChaosRemote> {
    let config = StoreConfig {
        page_size,
        backoff: tight_backoff(),
        ..StoreConfig::new(name, 0)
    };
    let store = RemoteStateStore::new(config, remote).unwrap();
    store.init();
    store
}

#[test]
fn all_enumerates_exact_key_set() {
    let remote = Arc::new(ChaosRemote::new());
    let store = open_store("enumerate", 10, remote);
    for i in 0..25 {
        store.put(&i, &format!("v{i}")).unwrap();
    }
    store.flush().unwrap();

    let iter = store.all().unwrap();
    let mut seen = Vec::new();
    while iter.has_next().unwrap() {
        let (key, value) = iter.next_entry().unwrap();
        assert_eq!(value, format!("v{key}"));
        seen.push(key);
    }
    assert!(!iter.has_next().unwrap());

    seen.sort_unstable();
    let expected: Vec<i32> = (0..25).collect();
    assert_eq!(seen, expected, "no duplicates, no omissions");
}

#[test]
fn range_is_inclusive_and_page_boundary_safe() {
    let remote = Arc::new(ChaosRemote::new());
    // Page size 2 puts the range bounds across pages.
    let store = open_store("range", 2, remote);
    for i in 1..=5 {
        store.put(&i, &i.to_string()).unwrap();
    }
    store.flush().unwrap();

    let mut seen: Vec<i32> = store
        .range(2, 4)
        .unwrap()
        .map(|entry| entry.unwrap().0)
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![2, 3, 4]);
}

#[test]
fn deleted_keys_vanish_from_enumeration() {
    let remote = Arc::new(ChaosRemote::new());
    let store = open_store("del-enum", 10, remote);
    store.put(&1, &"one".to_string()).unwrap();
    store.put(&2, &"two".to_string()).unwrap();
    store.flush().unwrap();

    assert_eq!(store.delete(&1).unwrap(), Some("one".to_string()));

    let keys: Vec<i32> = store.all().unwrap().map(|e| e.unwrap().0).collect();
    assert_eq!(keys, vec![2]);
    assert_eq!(store.get(&1).unwrap(), None);
}

#[test]
fn put_if_absent_sequence() {
    let remote = Arc::new(ChaosRemote::new());
    let store = open_store("pia-seq", 10, remote);

    assert_eq!(store.put_if_absent(&1, &"v1".to_string()).unwrap(), None);
    assert_eq!(
        store.put_if_absent(&1, &"v2".to_string()).unwrap(),
        Some("v1".to_string())
    );
    assert_eq!(store.get(&1).unwrap(), Some("v1".to_string()));
}

#[test]
fn same_key_puts_apply_in_call_order() {
    let remote = Arc::new(ChaosRemote::new());
    let store = open_store("write-order", 10, remote.clone());

    // Stalling the first write's round trip would let a concurrently
    // dispatched second write overtake it if writes were not serialized.
    remote.stall_next_put(200);
    store.put(&1, &"first".to_string()).unwrap();
    store.put(&1, &"second".to_string()).unwrap();
    store.flush().unwrap();

    assert_eq!(store.get(&1).unwrap(), Some("second".to_string()));
}

#[test]
fn transient_failures_are_retried_to_success() {
    init_logging();
    let remote = Arc::new(ChaosRemote::new());
    let store = open_store("flaky-get", 10, remote.clone());
    store.put(&1, &"one".to_string()).unwrap();
    store.flush().unwrap();

    remote.fail_next(2);
    assert_eq!(store.get(&1).unwrap(), Some("one".to_string()));
}

#[test]
fn exhausted_retries_surface_as_terminal_failure() {
    init_logging();
    let remote = Arc::new(ChaosRemote::new());
    let store = open_store("down", 10, remote.clone());

    remote.fail_next(u32::MAX);
    assert!(matches!(
        store.get(&1),
        Err(StoreError::RetriesExhausted { .. })
    ));
}

#[test]
fn scan_failure_terminates_iterator_with_error() {
    let remote = Arc::new(ChaosRemote::new());
    let store = open_store("scan-down", 10, remote.clone());
    store.put(&1, &"one".to_string()).unwrap();
    store.flush().unwrap();

    remote.fail_next(u32::MAX);
    let iter = store.all().unwrap();
    assert!(matches!(
        iter.has_next(),
        Err(StoreError::RetriesExhausted { .. })
    ));
    // The failure marker is terminal; afterwards the iterator is exhausted.
    assert!(!iter.has_next().unwrap());
}

#[test]
fn closing_iterator_stops_remote_calls() {
    let remote = Arc::new(ChaosRemote::new());
    // Small pages and many keys: the bounded bridge keeps the scan from
    // finishing before we close.
    let store = open_store("close-scan", 5, remote.clone());
    for i in 0..500 {
        store.put(&i, &format!("v{i}")).unwrap();
    }
    store.flush().unwrap();

    let iter = store.all().unwrap();
    assert!(iter.has_next().unwrap());
    iter.next_entry().unwrap();
    iter.close();

    assert!(!iter.has_next().unwrap());
    assert!(matches!(iter.next_entry(), Err(StoreError::EndOfSequence)));

    // Bounded grace period for the scan task to observe the closed flag.
    std::thread::sleep(Duration::from_millis(100));
    let settled = remote.call_count();
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(remote.call_count(), settled, "scan kept calling after close");
}

#[test]
fn dropping_iterator_cancels_the_scan() {
    let remote = Arc::new(ChaosRemote::new());
    let store = open_store("drop-scan", 5, remote.clone());
    for i in 0..500 {
        store.put(&i, &format!("v{i}")).unwrap();
    }
    store.flush().unwrap();

    {
        let iter = store.all().unwrap();
        assert!(iter.has_next().unwrap());
    }

    std::thread::sleep(Duration::from_millis(100));
    let settled = remote.call_count();
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(remote.call_count(), settled);
}

#[test]
fn put_all_entries_visible_to_scan_and_get() {
    let remote = Arc::new(ChaosRemote::new());
    let store = open_store("bulk", 10, remote);
    let entries: Vec<(i32, String)> = (0..30).map(|i| (i, format!("bulk-{i}"))).collect();
    store.put_all(&entries).unwrap();
    store.flush().unwrap();

    assert_eq!(store.approximate_num_entries().unwrap(), 30);
    let mut keys: Vec<i32> = store.all().unwrap().map(|e| e.unwrap().0).collect();
    keys.sort_unstable();
    assert_eq!(keys, (0..30).collect::<Vec<_>>());
    assert_eq!(store.get(&17).unwrap(), Some("bulk-17".to_string()));
}
