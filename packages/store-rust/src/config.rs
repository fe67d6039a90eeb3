//! Store configuration types.

use remora_core::BackoffPolicy;

/// Configuration for one [`RemoteStateStore`](crate::store::RemoteStateStore)
/// instance — one named store on one partition.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store name, used as the raw-key prefix.
    pub name: String,
    /// Partition this instance owns.
    pub partition: u32,
    /// Template naming the family of partition index sets.
    pub index_template: String,
    /// Number of index members fetched per scan page.
    pub page_size: usize,
    /// Retry policy for every remote call.
    pub backoff: BackoffPolicy,
    /// Worker threads for the store's I/O runtime.
    pub worker_threads: usize,
}

impl StoreConfig {
    /// Creates a configuration with defaults for the given store name and
    /// partition.
    #[must_use]
    pub fn new(name: impl Into<String>, partition: u32) -> Self {
        Self {
            name: name.into(),
            partition,
            ..Self::default()
        }
    }

    /// Iterator bridge buffer capacity: one full page plus one slot, the
    /// minimal size that keeps a page in flight without deadlocking the
    /// producer against a single-entry-lookahead consumer.
    #[must_use]
    pub const fn bridge_capacity(&self) -> usize {
        self.page_size + 1
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "remora".to_string(),
            partition: 0,
            index_template: "remora-index".to_string(),
            page_size: 50,
            backoff: BackoffPolicy::default(),
            worker_threads: 2,
        }
    }
}
