//! Store error taxonomy.
//!
//! Transient remote failures never surface here: the retry executor
//! absorbs them and only a retries-exhausted terminal failure escapes.
//! Cancellation (an iterator closed mid-scan) is not an error at all — it
//! ends the enumeration quietly.

use remora_core::CodecError;

/// Errors surfaced by the store façade and its iterators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A remote operation failed and the backoff policy gave up.
    #[error("remote operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made, including the first.
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// A key or value could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// `next`/`peek` called on an exhausted iterator.
    #[error("end of iteration sequence")]
    EndOfSequence,

    /// Operation attempted on a closed store.
    #[error("store `{name}` is not open")]
    Closed {
        /// Name of the store.
        name: String,
    },
}

/// Result alias for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
