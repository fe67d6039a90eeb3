//! Scan engine: paginated enumeration of one partition's index, joined
//! against bulk value fetches.
//!
//! A [`ScanDriver`] walks the partition index in fixed-size pages, decodes
//! and filters each page's vanilla keys, bulk-fetches the surviving keys'
//! values positionally, and pushes the pairs into the iterator bridge. The
//! bounded bridge send is the backpressure point: a slow consumer stalls
//! the scan instead of growing a buffer.
//!
//! The index has no intrinsic ordering, so a range scan is a filtered full
//! scan — every page is visited and the range predicate decides membership;
//! there is no early termination at range boundaries.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use remora_core::{codec, BackoffPolicy, KeySchema};

use crate::bridge::{BridgeSender, ScanEvent};
use crate::remote::{RemoteKv, ScanCursor};
use crate::retry::{retry_cancellable, LoggingRetryObserver, RetryOutcome};

/// Key filter applied to each decoded index member.
pub(crate) enum KeyPredicate<K> {
    /// Accept every key (full scan).
    All,
    /// Accept keys in the inclusive range `[from, to]`.
    Range { from: K, to: K },
}

impl<K: Ord> KeyPredicate<K> {
    fn accepts(&self, key: &K) -> bool {
        match self {
            Self::All => true,
            Self::Range { from, to } => key >= from && key <= to,
        }
    }
}

/// Drives one partition enumeration, feeding a bridge until a terminal
/// marker is delivered or the bridge is closed.
pub(crate) struct ScanDriver<K, V, R> {
    pub remote: Arc<R>,
    pub schema: KeySchema,
    pub policy: BackoffPolicy,
    pub page_size: usize,
    pub predicate: KeyPredicate<K>,
    pub sender: BridgeSender<K, V>,
}

impl<K, V, R> ScanDriver<K, V, R>
where
    K: DeserializeOwned + Ord + Send + 'static,
    V: DeserializeOwned + Send + 'static,
    R: RemoteKv,
{
    pub fn new(
        remote: Arc<R>,
        schema: KeySchema,
        policy: BackoffPolicy,
        page_size: usize,
        predicate: KeyPredicate<K>,
        sender: BridgeSender<K, V>,
    ) -> Self {
        Self {
            remote,
            schema,
            policy,
            page_size,
            predicate,
            sender,
        }
    }

    /// Runs the enumeration to its terminal marker.
    ///
    /// Cancellation (bridge closed) ends the scan quietly: no failure
    /// marker, no retries-exhausted report.
    pub async fn run(self) {
        let scan_observer = LoggingRetryObserver {
            operation: "index_scan",
        };
        let fetch_observer = LoggingRetryObserver {
            operation: "multi_get",
        };
        let mut cursor = ScanCursor::start();

        loop {
            if self.sender.is_closed() {
                return;
            }

            let page = {
                let remote = &self.remote;
                let index_key = self.schema.index_key();
                let outcome = retry_cancellable(
                    &self.policy,
                    &scan_observer,
                    || self.sender.is_closed(),
                    || remote.index_scan(index_key, &cursor, self.page_size),
                )
                .await;
                match outcome {
                    Ok(RetryOutcome::Done(page)) => page,
                    Ok(RetryOutcome::Cancelled) => return,
                    Err(error) => {
                        self.sender.send(ScanEvent::Failed(error)).await;
                        return;
                    }
                }
            };

            // Decode and filter the page. Undecodable index members are
            // skipped: the enumeration covers the decode-able,
            // predicate-passing members only.
            let mut keys: Vec<K> = Vec::new();
            let mut raw_keys: Vec<Vec<u8>> = Vec::new();
            for member in &page.members {
                match codec::decode::<K>(member) {
                    Ok(key) if self.predicate.accepts(&key) => {
                        raw_keys.push(self.schema.raw_key(member));
                        keys.push(key);
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(
                            partition = self.schema.partition(),
                            %error,
                            "skipping undecodable index member"
                        );
                    }
                }
            }

            if !keys.is_empty() {
                let values = {
                    let remote = &self.remote;
                    let raw_keys = &raw_keys;
                    let outcome = retry_cancellable(
                        &self.policy,
                        &fetch_observer,
                        || self.sender.is_closed(),
                        || remote.multi_get(raw_keys),
                    )
                    .await;
                    match outcome {
                        Ok(RetryOutcome::Done(values)) => values,
                        Ok(RetryOutcome::Cancelled) => return,
                        Err(error) => {
                            self.sender.send(ScanEvent::Failed(error)).await;
                            return;
                        }
                    }
                };

                // Results align positionally with the requested keys.
                for (key, raw_value) in keys.into_iter().zip(values) {
                    let Some(raw_value) = raw_value else {
                        // Deleted between the index page and the fetch.
                        continue;
                    };
                    if raw_value.is_empty() {
                        continue;
                    }
                    match codec::decode::<V>(&raw_value) {
                        Ok(value) => {
                            if !self.sender.send(ScanEvent::Entry(key, value)).await {
                                return;
                            }
                        }
                        Err(error) => {
                            // A stored value we cannot decode is corruption,
                            // not something to silently drop.
                            self.sender
                                .send(ScanEvent::Failed(error.into()))
                                .await;
                            return;
                        }
                    }
                }
            }

            if page.next_cursor.finished {
                self.sender.send(ScanEvent::Done).await;
                return;
            }
            cursor = page.next_cursor;
        }
    }
}
