//! In-memory [`RemoteKv`] implementation.
//!
//! Backs tests and embedded deployments. The whole keyspace lives behind a
//! single mutex: the atomic scripts mutate the flat keyspace and a
//! partition index set in one unit, and one lock is the local-process
//! equivalent of the remote store executing a script atomically.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::remote::{RemoteKv, ScanCursor, ScanPage};

/// In-memory remote store honoring the value↔index joint-mutation contract.
#[derive(Default)]
pub struct MemoryRemote {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    /// Flat keyspace: prefixed raw key -> raw value.
    values: HashMap<Vec<u8>, Bytes>,
    /// Partition index sets: index key -> insertion-ordered vanilla keys.
    indexes: HashMap<Vec<u8>, Vec<Bytes>>,
}

impl MemoryRemote {
    /// Creates an empty in-memory remote store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryInner {
    fn index_add(&mut self, index_key: &[u8], vanilla_key: &[u8]) {
        let members = self.indexes.entry(index_key.to_vec()).or_default();
        if !members.iter().any(|m| m.as_ref() == vanilla_key) {
            members.push(Bytes::copy_from_slice(vanilla_key));
        }
    }

    fn index_remove(&mut self, index_key: &[u8], vanilla_key: &[u8]) {
        if let Some(members) = self.indexes.get_mut(index_key) {
            members.retain(|m| m.as_ref() != vanilla_key);
        }
    }
}

/// Decodes a cursor's opaque state into a `u64` offset.
///
/// Empty state (from `ScanCursor::start()`) is treated as offset 0.
fn decode_cursor_offset(cursor: &ScanCursor) -> u64 {
    if cursor.state.is_empty() {
        0
    } else {
        let mut buf = [0u8; 8];
        let len = cursor.state.len().min(8);
        buf[..len].copy_from_slice(&cursor.state[..len]);
        u64::from_le_bytes(buf)
    }
}

/// Encodes an offset into cursor state bytes (little-endian `u64`).
fn encode_cursor_offset(offset: u64) -> Vec<u8> {
    offset.to_le_bytes().to_vec()
}

#[async_trait]
impl RemoteKv for MemoryRemote {
    async fn get(&self, raw_key: &[u8]) -> anyhow::Result<Option<Bytes>> {
        Ok(self.inner.lock().values.get(raw_key).cloned())
    }

    async fn multi_get(&self, raw_keys: &[Vec<u8>]) -> anyhow::Result<Vec<Option<Bytes>>> {
        let inner = self.inner.lock();
        Ok(raw_keys
            .iter()
            .map(|k| inner.values.get(k).cloned())
            .collect())
    }

    async fn atomic_put(
        &self,
        raw_key: &[u8],
        index_key: &[u8],
        raw_value: &[u8],
        vanilla_key: &[u8],
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner
            .values
            .insert(raw_key.to_vec(), Bytes::copy_from_slice(raw_value));
        inner.index_add(index_key, vanilla_key);
        Ok(())
    }

    async fn atomic_put_if_absent(
        &self,
        raw_key: &[u8],
        index_key: &[u8],
        raw_value: &[u8],
        vanilla_key: &[u8],
    ) -> anyhow::Result<Option<Bytes>> {
        let mut inner = self.inner.lock();
        if let Some(prior) = inner.values.get(raw_key).cloned() {
            return Ok(Some(prior));
        }
        inner
            .values
            .insert(raw_key.to_vec(), Bytes::copy_from_slice(raw_value));
        inner.index_add(index_key, vanilla_key);
        Ok(None)
    }

    async fn atomic_delete(
        &self,
        raw_key: &[u8],
        index_key: &[u8],
        vanilla_key: &[u8],
    ) -> anyhow::Result<Option<Bytes>> {
        let mut inner = self.inner.lock();
        let removed = inner.values.remove(raw_key);
        inner.index_remove(index_key, vanilla_key);
        Ok(removed)
    }

    async fn multi_set(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        for (raw_key, raw_value) in entries {
            inner
                .values
                .insert(raw_key.clone(), Bytes::copy_from_slice(raw_value));
        }
        Ok(())
    }

    async fn index_add_all(
        &self,
        index_key: &[u8],
        vanilla_keys: &[Vec<u8>],
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        for vanilla_key in vanilla_keys {
            inner.index_add(index_key, vanilla_key);
        }
        Ok(())
    }

    async fn index_scan(
        &self,
        index_key: &[u8],
        cursor: &ScanCursor,
        page_size: usize,
    ) -> anyhow::Result<ScanPage> {
        if cursor.finished {
            return Ok(ScanPage {
                members: Vec::new(),
                next_cursor: cursor.clone(),
            });
        }

        let inner = self.inner.lock();
        let members_all = inner.indexes.get(index_key);
        let total = members_all.map_or(0, Vec::len);
        // Cursor offsets are bounded by index size, so truncation is safe.
        #[allow(clippy::cast_possible_truncation)]
        let offset = decode_cursor_offset(cursor) as usize;

        let members: Vec<Bytes> = members_all
            .map(|all| all.iter().skip(offset).take(page_size).cloned().collect())
            .unwrap_or_default();

        let new_offset = offset + members.len();
        let finished = new_offset >= total;

        Ok(ScanPage {
            members,
            next_cursor: ScanCursor {
                state: encode_cursor_offset(new_offset as u64),
                finished,
            },
        })
    }

    async fn index_len(&self, index_key: &[u8]) -> anyhow::Result<u64> {
        Ok(self
            .inner
            .lock()
            .indexes
            .get(index_key)
            .map_or(0, |members| members.len() as u64))
    }
}
