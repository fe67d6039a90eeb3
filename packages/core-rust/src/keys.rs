//! Raw key derivation and partition index keys.
//!
//! Every store instance owns one partition of one named store. Three byte
//! strings are derived from `(store_name, partition)`:
//!
//! - **Prefixed raw key**: `{name}:{partition}:` + encoded key bytes. The
//!   prefix is fixed per instance, so the mapping from encoded key bytes to
//!   raw key is injective within a partition.
//! - **Vanilla key**: the plain encoded key bytes, as stored in the
//!   partition index set.
//! - **Index key**: `{index_template}:{partition}`, naming the set that
//!   holds the partition's vanilla keys.

/// Precomputed key-derivation state for one `(store, partition)` pair.
///
/// Built once at store construction; raw-key derivation afterwards is a
/// single allocation with no formatting.
#[derive(Debug, Clone)]
pub struct KeySchema {
    prefix: Vec<u8>,
    index_key: Vec<u8>,
    partition: u32,
}

impl KeySchema {
    /// Creates the schema for a named store's partition.
    ///
    /// `index_template` names the family of partition index sets, e.g.
    /// `"remora-index"` yields index key `remora-index:3` for partition 3.
    #[must_use]
    pub fn new(store_name: &str, partition: u32, index_template: &str) -> Self {
        Self {
            prefix: format!("{store_name}:{partition}:").into_bytes(),
            index_key: format!("{index_template}:{partition}").into_bytes(),
            partition,
        }
    }

    /// The partition this schema derives keys for.
    #[must_use]
    pub const fn partition(&self) -> u32 {
        self.partition
    }

    /// The partition index set's key.
    #[must_use]
    pub fn index_key(&self) -> &[u8] {
        &self.index_key
    }

    /// Derives the prefixed raw key for an encoded (vanilla) logical key.
    #[must_use]
    pub fn raw_key(&self, vanilla_key: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.prefix.len() + vanilla_key.len());
        raw.extend_from_slice(&self.prefix);
        raw.extend_from_slice(vanilla_key);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_key_layout() {
        let schema = KeySchema::new("orders", 7, "remora-index");
        assert_eq!(schema.raw_key(b"abc"), b"orders:7:abc");
        assert_eq!(schema.index_key(), b"remora-index:7");
        assert_eq!(schema.partition(), 7);
    }

    #[test]
    fn raw_keys_are_injective_within_a_partition() {
        let schema = KeySchema::new("orders", 0, "idx");
        // Vanilla keys that embed the separator must still map to distinct
        // raw keys: the prefix length is fixed, so the suffix is the key.
        let a = schema.raw_key(b"a:b");
        let b = schema.raw_key(b"a");
        let c = schema.raw_key(b":b");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn partitions_do_not_collide() {
        let p0 = KeySchema::new("orders", 0, "idx");
        let p1 = KeySchema::new("orders", 1, "idx");
        assert_ne!(p0.raw_key(b"k"), p1.raw_key(b"k"));
        assert_ne!(p0.index_key(), p1.index_key());
    }
}
