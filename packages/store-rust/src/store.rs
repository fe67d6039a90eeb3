//! Partition-aware remote-backed state store façade.
//!
//! [`RemoteStateStore`] reconciles two mismatched worlds: the remote store
//! offers asynchronous point operations and primitive index scripting,
//! while callers are single-threaded per partition and expect blocking
//! semantics with an iterator abstraction. Point operations run retried on
//! the store's own I/O runtime; enumeration hands a
//! [`ScanDriver`](crate::scan::ScanDriver) one end of an iterator bridge
//! and the caller the other.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use remora_core::{codec, BackoffPolicy, KeySchema};

use crate::bridge::StoreIter;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::remote::RemoteKv;
use crate::retry::{retry, LoggingRetryObserver};
use crate::scan::{KeyPredicate, ScanDriver};

/// Tracks fire-and-retry writes still in flight, so `flush` can act as a
/// barrier over them.
struct WriteTracker {
    in_flight: watch::Sender<u64>,
}

impl WriteTracker {
    fn new() -> Self {
        let (in_flight, _) = watch::channel(0);
        Self { in_flight }
    }

    fn begin(&self) {
        self.in_flight.send_modify(|count| *count += 1);
    }

    fn finish(&self) {
        self.in_flight.send_modify(|count| *count -= 1);
    }

    async fn wait_drained(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

/// A queued fire-and-retry write, already encoded.
enum WriteJob {
    Put {
        raw_key: Vec<u8>,
        raw_value: Vec<u8>,
        vanilla: Vec<u8>,
    },
    PutAll {
        raw_entries: Vec<(Vec<u8>, Vec<u8>)>,
        vanilla_keys: Vec<Vec<u8>>,
    },
}

/// Single writer task: drains the write queue one job at a time, so remote
/// dispatch order equals caller dispatch order. Two writes to the same key
/// can therefore never reorder, whatever their retry schedules do.
async fn write_loop<R: RemoteKv>(
    remote: Arc<R>,
    index_key: Vec<u8>,
    policy: BackoffPolicy,
    store_name: String,
    writes: Arc<WriteTracker>,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
) {
    while let Some(job) = jobs.recv().await {
        let result = match &job {
            WriteJob::Put {
                raw_key,
                raw_value,
                vanilla,
            } => {
                let observer = LoggingRetryObserver { operation: "put" };
                retry(&policy, &observer, || {
                    remote.atomic_put(raw_key, &index_key, raw_value, vanilla)
                })
                .await
            }
            WriteJob::PutAll {
                raw_entries,
                vanilla_keys,
            } => {
                let set_observer = LoggingRetryObserver {
                    operation: "multi_set",
                };
                let index_observer = LoggingRetryObserver {
                    operation: "index_add_all",
                };
                async {
                    retry(&policy, &set_observer, || remote.multi_set(raw_entries)).await?;
                    retry(&policy, &index_observer, || {
                        remote.index_add_all(&index_key, vanilla_keys)
                    })
                    .await
                }
                .await
            }
        };
        if let Err(error) = result {
            tracing::error!(store = %store_name, %error, "write lost after retries");
        }
        writes.finish();
    }
}

/// Durable key-value store for one partition, backed by a remote store.
///
/// Blocking calls (`get`, `delete`, `put_if_absent`,
/// `approximate_num_entries`) park the calling thread until the retried
/// remote call resolves. `put` and `put_all` are fire-and-retry: they
/// return once the write is queued. A single writer task drains the queue
/// in dispatch order, so the last write to a key is the one that lands;
/// `flush` waits for all queued writes to resolve.
///
/// The remote connection is owned exclusively by this instance for its
/// open lifetime; sharing one connection between two façades is not
/// supported.
pub struct RemoteStateStore<K, V, R: RemoteKv> {
    config: StoreConfig,
    schema: KeySchema,
    remote: Arc<R>,
    runtime: tokio::runtime::Runtime,
    open: AtomicBool,
    writes: Arc<WriteTracker>,
    write_tx: mpsc::UnboundedSender<WriteJob>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, R> RemoteStateStore<K, V, R>
where
    K: Serialize + DeserializeOwned + Ord + Send + 'static,
    V: Serialize + DeserializeOwned + Send + 'static,
    R: RemoteKv,
{
    /// Creates the store in the closed state; call
    /// [`init`](Self::init) before use.
    ///
    /// # Errors
    ///
    /// Fails if the I/O runtime cannot be built.
    pub fn new(config: StoreConfig, remote: Arc<R>) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(format!("remora-{}-p{}", config.name, config.partition))
            .enable_all()
            .build()?;
        let schema = KeySchema::new(&config.name, config.partition, &config.index_template);
        let writes = Arc::new(WriteTracker::new());
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        runtime.spawn(write_loop(
            remote.clone(),
            schema.index_key().to_vec(),
            config.backoff.clone(),
            config.name.clone(),
            writes.clone(),
            write_rx,
        ));
        Ok(Self {
            config,
            schema,
            remote,
            runtime,
            open: AtomicBool::new(false),
            writes,
            write_tx,
            _marker: PhantomData,
        })
    }

    /// Opens the store for use. Idempotent.
    pub fn init(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            tracing::info!(
                store = %self.config.name,
                partition = self.config.partition,
                "store opened"
            );
        }
    }

    /// Whether the store is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// The store survives restarts of this process: data lives remotely.
    #[must_use]
    pub const fn persistent(&self) -> bool {
        true
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed {
                name: self.config.name.clone(),
            })
        }
    }

    /// Fetches the value stored under `key`, or `None` if absent.
    ///
    /// Blocks until the retried remote read resolves.
    ///
    /// # Errors
    ///
    /// [`StoreError::RetriesExhausted`] on terminal remote failure,
    /// [`StoreError::Codec`] if the stored bytes cannot be decoded,
    /// [`StoreError::Closed`] if the store is not open.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.ensure_open()?;
        let vanilla = codec::encode(key)?;
        let raw_key = self.schema.raw_key(&vanilla);
        let remote = &self.remote;
        let observer = LoggingRetryObserver { operation: "get" };
        let raw = self.runtime.block_on(retry(
            &self.config.backoff,
            &observer,
            || remote.get(&raw_key),
        ))?;
        decode_optional(raw.as_deref())
    }

    /// Writes `value` under `key`, fire-and-retry.
    ///
    /// Returns once the write is queued; durability is confirmed
    /// asynchronously (at-least-once — a retried duplicate is harmless
    /// because the atomic script is a full overwrite plus set-add). Queued
    /// writes apply in call order. Use [`flush`](Self::flush) as a barrier.
    ///
    /// # Errors
    ///
    /// [`StoreError::Codec`] if the key or value cannot be encoded,
    /// [`StoreError::Closed`] if the store is not open.
    pub fn put(&self, key: &K, value: &V) -> Result<()> {
        self.ensure_open()?;
        let vanilla = codec::encode(key)?;
        let raw_key = self.schema.raw_key(&vanilla);
        let raw_value = codec::encode(value)?;
        self.enqueue(WriteJob::Put {
            raw_key,
            raw_value,
            vanilla,
        })
    }

    /// Writes `value` under `key` only if no value is present, returning
    /// the prior value otherwise. Blocks for the result.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`get`](Self::get).
    pub fn put_if_absent(&self, key: &K, value: &V) -> Result<Option<V>> {
        self.ensure_open()?;
        let vanilla = codec::encode(key)?;
        let raw_key = self.schema.raw_key(&vanilla);
        let raw_value = codec::encode(value)?;
        let index_key = self.schema.index_key();
        let remote = &self.remote;
        let observer = LoggingRetryObserver {
            operation: "put_if_absent",
        };
        let prior = self.runtime.block_on(retry(
            &self.config.backoff,
            &observer,
            || remote.atomic_put_if_absent(&raw_key, index_key, &raw_value, &vanilla),
        ))?;
        decode_optional(prior.as_deref())
    }

    /// Removes `key`, returning the removed value. Blocks for the result.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`get`](Self::get).
    pub fn delete(&self, key: &K) -> Result<Option<V>> {
        self.ensure_open()?;
        let vanilla = codec::encode(key)?;
        let raw_key = self.schema.raw_key(&vanilla);
        let index_key = self.schema.index_key();
        let remote = &self.remote;
        let observer = LoggingRetryObserver {
            operation: "delete",
        };
        let removed = self.runtime.block_on(retry(
            &self.config.backoff,
            &observer,
            || remote.atomic_delete(&raw_key, index_key, &vanilla),
        ))?;
        decode_optional(removed.as_deref())
    }

    /// Bulk-writes `entries`, fire-and-retry.
    ///
    /// Values are written in one call, then index memberships added in a
    /// second call chained after the first succeeds. The two calls are not
    /// atomic together: a crash between them leaves values present without
    /// index membership, under-reported by scans until rewritten.
    ///
    /// # Errors
    ///
    /// [`StoreError::Codec`] if any entry cannot be encoded,
    /// [`StoreError::Closed`] if the store is not open.
    pub fn put_all(&self, entries: &[(K, V)]) -> Result<()> {
        self.ensure_open()?;
        let mut raw_entries = Vec::with_capacity(entries.len());
        let mut vanilla_keys = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let vanilla = codec::encode(key)?;
            raw_entries.push((self.schema.raw_key(&vanilla), codec::encode(value)?));
            vanilla_keys.push(vanilla);
        }
        self.enqueue(WriteJob::PutAll {
            raw_entries,
            vanilla_keys,
        })
    }

    fn enqueue(&self, job: WriteJob) -> Result<()> {
        self.writes.begin();
        // The writer task holds the receiver for the store's lifetime, so
        // this only fails once the runtime is tearing down.
        if self.write_tx.send(job).is_err() {
            self.writes.finish();
            return Err(StoreError::Closed {
                name: self.config.name.clone(),
            });
        }
        Ok(())
    }

    /// Enumerates every entry in this partition.
    ///
    /// Entries present in the index at scan time are delivered exactly
    /// once, in no particular order. Closing (or dropping) the iterator
    /// cancels the underlying scan.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] if the store is not open.
    pub fn all(&self) -> Result<StoreIter<K, V>> {
        self.spawn_scan(KeyPredicate::All)
    }

    /// Enumerates entries whose keys fall in the inclusive range
    /// `[from, to]`.
    ///
    /// The partition index is unordered, so this is a filtered full scan:
    /// delivery order is arbitrary and the scan visits every index page.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] if the store is not open.
    pub fn range(&self, from: K, to: K) -> Result<StoreIter<K, V>> {
        self.spawn_scan(KeyPredicate::Range { from, to })
    }

    fn spawn_scan(&self, predicate: KeyPredicate<K>) -> Result<StoreIter<K, V>> {
        self.ensure_open()?;
        let (sender, iter) = StoreIter::channel(self.config.bridge_capacity());
        let driver = ScanDriver::new(
            self.remote.clone(),
            self.schema.clone(),
            self.config.backoff.clone(),
            self.config.page_size,
            predicate,
            sender,
        );
        self.runtime.spawn(driver.run());
        Ok(iter)
    }

    /// Cardinality of this partition's index. Blocks for the result.
    ///
    /// Approximate: the read is not transactionally consistent with
    /// in-flight writes.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`get`](Self::get).
    pub fn approximate_num_entries(&self) -> Result<u64> {
        self.ensure_open()?;
        let index_key = self.schema.index_key();
        let remote = &self.remote;
        let observer = LoggingRetryObserver {
            operation: "index_len",
        };
        self.runtime.block_on(retry(
            &self.config.backoff,
            &observer,
            || remote.index_len(index_key),
        ))
    }

    /// Waits until all dispatched fire-and-retry writes have resolved.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] if the store is not open.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.runtime.block_on(self.writes.wait_drained());
        Ok(())
    }

    /// Flushes outstanding writes and closes the store. Idempotent; all
    /// subsequent operations fail with [`StoreError::Closed`].
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.runtime.block_on(self.writes.wait_drained());
            tracing::info!(
                store = %self.config.name,
                partition = self.config.partition,
                "store closed"
            );
        }
    }
}

/// Maps a raw optional value to the caller's sentinel: missing or
/// zero-length raw entries are "no value".
fn decode_optional<V: DeserializeOwned>(raw: Option<&[u8]>) -> Result<Option<V>> {
    match raw {
        Some(bytes) if !bytes.is_empty() => Ok(Some(codec::decode(bytes)?)),
        _ => Ok(None),
    }
}
