//! Remote-store abstraction: point operations, atomic scripts, and
//! cursor-based index scanning.
//!
//! Defines [`RemoteKv`], the transport-level contract the store façade and
//! scan engine are written against. The atomic operations are opaque here;
//! an implementation must make each one a single atomic unit on the remote
//! side so the value↔index invariant never observes a half-applied write.

use async_trait::async_trait;
use bytes::Bytes;

/// Opaque cursor for resumable scans over a partition index set.
///
/// Implementations encode their internal position in the `state` field.
/// Consumers treat `state` as opaque and only check `finished`.
#[derive(Debug, Clone)]
pub struct ScanCursor {
    /// Opaque state for the remote implementation to resume the scan.
    pub state: Vec<u8>,
    /// Whether the scan has completed (no more members).
    pub finished: bool,
}

impl ScanCursor {
    /// Creates a cursor positioned at the beginning of the index.
    #[must_use]
    pub fn start() -> Self {
        Self {
            state: Vec::new(),
            finished: false,
        }
    }
}

/// One page of a cursor-based index scan.
#[derive(Debug)]
pub struct ScanPage {
    /// Vanilla (non-prefixed) logical key bytes in this page.
    pub members: Vec<Bytes>,
    /// Updated cursor for the next scan call.
    pub next_cursor: ScanCursor,
}

/// Transport-level contract with the remote in-memory store.
///
/// All methods are asynchronous at the transport layer; blocking semantics
/// are layered on by the façade. Errors are transport-level and treated as
/// transient by the retry executor — an implementation should not encode
/// "key absent" as an error (absence is `None` / an empty page).
///
/// Used as `Arc<dyn RemoteKv>`.
#[async_trait]
pub trait RemoteKv: Send + Sync + 'static {
    /// Fetch the raw value at `raw_key`, or `None` if absent.
    async fn get(&self, raw_key: &[u8]) -> anyhow::Result<Option<Bytes>>;

    /// Fetch raw values for many keys at once.
    ///
    /// Results are positionally aligned with `raw_keys`: the i-th result is
    /// the value (or absence) of the i-th requested key.
    async fn multi_get(&self, raw_keys: &[Vec<u8>]) -> anyhow::Result<Vec<Option<Bytes>>>;

    /// Atomically overwrite-or-create the raw value and add the vanilla key
    /// to the partition index.
    async fn atomic_put(
        &self,
        raw_key: &[u8],
        index_key: &[u8],
        raw_value: &[u8],
        vanilla_key: &[u8],
    ) -> anyhow::Result<()>;

    /// Like [`atomic_put`](Self::atomic_put), but a no-op if `raw_key`
    /// already holds a value. Always returns the prior value (or `None` if
    /// the write took effect).
    async fn atomic_put_if_absent(
        &self,
        raw_key: &[u8],
        index_key: &[u8],
        raw_value: &[u8],
        vanilla_key: &[u8],
    ) -> anyhow::Result<Option<Bytes>>;

    /// Atomically remove the raw value and the vanilla key's index
    /// membership, returning the removed value.
    async fn atomic_delete(
        &self,
        raw_key: &[u8],
        index_key: &[u8],
        vanilla_key: &[u8],
    ) -> anyhow::Result<Option<Bytes>>;

    /// Bulk-write raw values. Atomic per entry, not across entries.
    async fn multi_set(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> anyhow::Result<()>;

    /// Bulk-add vanilla keys to the partition index.
    async fn index_add_all(
        &self,
        index_key: &[u8],
        vanilla_keys: &[Vec<u8>],
    ) -> anyhow::Result<()>;

    /// Scan one page of the partition index set from `cursor`.
    ///
    /// A finished cursor yields an empty page with `finished` still set.
    async fn index_scan(
        &self,
        index_key: &[u8],
        cursor: &ScanCursor,
        page_size: usize,
    ) -> anyhow::Result<ScanPage>;

    /// Cardinality of the partition index set.
    async fn index_len(&self, index_key: &[u8]) -> anyhow::Result<u64>;
}
