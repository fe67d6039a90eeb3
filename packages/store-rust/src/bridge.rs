//! Blocking pull-iterator over an async notification stream.
//!
//! A scan engine produces a terminated stream of notifications — entries,
//! then exactly one terminal marker (completion or failure). [`StoreIter`]
//! is the consumer half of a bounded channel carrying that stream: the
//! consumer parks on the queue, the producer parks when the buffer is full,
//! which is what gives a slow consumer backpressure over the scan.
//!
//! Consumer accessors share one lock, so `has_next` / `peek_next_key` /
//! `next_entry` interleave safely even when called from several threads,
//! though intended usage is single-threaded. `close` never blocks: it
//! raises a flag the producer observes and clears buffered state
//! opportunistically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Result, StoreError};

/// One notification in the scan stream.
#[derive(Debug)]
pub enum ScanEvent<K, V> {
    /// A decoded key-value entry.
    Entry(K, V),
    /// Enumeration completed; no more entries will follow.
    Done,
    /// Enumeration failed terminally; no more entries will follow.
    Failed(StoreError),
}

/// Producer half of the bridge, held by the scan engine.
pub(crate) struct BridgeSender<K, V> {
    tx: mpsc::Sender<ScanEvent<K, V>>,
    closed: Arc<AtomicBool>,
}

impl<K, V> BridgeSender<K, V> {
    /// Whether the consumer has closed the iterator.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Push an event, blocking while the buffer is full.
    ///
    /// Returns `false` if the iterator is closed (flag raised or receiver
    /// dropped); the producer should stop scanning.
    pub async fn send(&self, event: ScanEvent<K, V>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(event).await.is_ok()
    }
}

/// Consumer state behind the single accessor lock.
struct BridgeInner<K, V> {
    rx: mpsc::Receiver<ScanEvent<K, V>>,
    /// Entry buffered by a lookahead (`has_next` / `peek_next_key`).
    peeked: Option<(K, V)>,
    exhausted: bool,
}

/// Blocking iterator over a partition scan.
///
/// State machine: not-started → peeked (first lookahead) or exhausted
/// (terminal marker with no value) → closed. Close is terminal and
/// idempotent. Dropping the iterator closes it.
pub struct StoreIter<K, V> {
    inner: Mutex<BridgeInner<K, V>>,
    closed: Arc<AtomicBool>,
}

impl<K, V> StoreIter<K, V> {
    /// Creates a bridge with the given buffer capacity, returning the
    /// producer and consumer halves.
    pub(crate) fn channel(capacity: usize) -> (BridgeSender<K, V>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let closed = Arc::new(AtomicBool::new(false));
        let sender = BridgeSender {
            tx,
            closed: closed.clone(),
        };
        let iter = Self {
            inner: Mutex::new(BridgeInner {
                rx,
                peeked: None,
                exhausted: false,
            }),
            closed,
        };
        (sender, iter)
    }

    /// Ensures an entry is buffered, blocking on the queue if necessary.
    ///
    /// Returns `Ok(true)` if an entry is buffered, `Ok(false)` on
    /// exhaustion or close, and the failure if the stream failed.
    fn fill(&self, inner: &mut BridgeInner<K, V>) -> Result<bool> {
        if self.closed.load(Ordering::SeqCst) {
            Self::discard(inner);
            return Ok(false);
        }
        if inner.peeked.is_some() {
            return Ok(true);
        }
        if inner.exhausted {
            return Ok(false);
        }
        match inner.rx.blocking_recv() {
            Some(ScanEvent::Entry(key, value)) => {
                if self.closed.load(Ordering::SeqCst) {
                    // Closed while we were parked: discard the entry.
                    Self::discard(inner);
                    return Ok(false);
                }
                inner.peeked = Some((key, value));
                Ok(true)
            }
            Some(ScanEvent::Done) | None => {
                inner.exhausted = true;
                Ok(false)
            }
            Some(ScanEvent::Failed(error)) => {
                inner.exhausted = true;
                Err(error)
            }
        }
    }

    /// Whether another entry is available, blocking until the producer
    /// delivers a value or a terminal marker.
    ///
    /// # Errors
    ///
    /// Returns the scan's terminal failure if the stream failed.
    pub fn has_next(&self) -> Result<bool> {
        let mut inner = self.inner.lock();
        self.fill(&mut inner)
    }

    /// Returns the next entry, consuming it.
    ///
    /// # Errors
    ///
    /// [`StoreError::EndOfSequence`] if the iterator is exhausted or
    /// closed; the scan's terminal failure if the stream failed.
    pub fn next_entry(&self) -> Result<(K, V)> {
        let mut inner = self.inner.lock();
        if self.fill(&mut inner)? {
            // fill() returning true guarantees a buffered entry.
            inner.peeked.take().ok_or(StoreError::EndOfSequence)
        } else {
            Err(StoreError::EndOfSequence)
        }
    }

    /// Close the iterator: clears buffered and queued entries and stops
    /// the producer from scheduling further work. Idempotent, never blocks.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Best effort: if a consumer is parked inside an accessor we skip
        // the cleanup here; the accessor observes the flag on wake-up and
        // performs the same discard itself.
        if let Some(mut inner) = self.inner.try_lock() {
            Self::discard(&mut inner);
        }
    }

    /// Clears buffered state and shuts the channel, releasing a producer
    /// parked on a full queue.
    fn discard(inner: &mut BridgeInner<K, V>) {
        inner.peeked = None;
        inner.exhausted = true;
        inner.rx.close();
        while inner.rx.try_recv().is_ok() {}
    }
}

impl<K: Clone, V> StoreIter<K, V> {
    /// Returns the key of the next entry without consuming it.
    ///
    /// # Errors
    ///
    /// [`StoreError::EndOfSequence`] if the iterator is exhausted or
    /// closed; the scan's terminal failure if the stream failed.
    pub fn peek_next_key(&self) -> Result<K> {
        let mut inner = self.inner.lock();
        if self.fill(&mut inner)? {
            inner
                .peeked
                .as_ref()
                .map(|(key, _)| key.clone())
                .ok_or(StoreError::EndOfSequence)
        } else {
            Err(StoreError::EndOfSequence)
        }
    }
}

impl<K, V> Iterator for StoreIter<K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_entry()),
            Ok(false) => None,
            Err(error) => Some(Err(error)),
        }
    }
}

impl<K, V> Drop for StoreIter<K, V> {
    fn drop(&mut self) {
        self.close();
    }
}
