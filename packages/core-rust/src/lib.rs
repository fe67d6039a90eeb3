//! `Remora` Core — backoff policy, key codec, and partition index key derivation.
//!
//! Everything in this crate is pure: no runtime, no clocks, no I/O. The
//! store crate drives these pieces against tokio time and a remote store.

pub mod backoff;
pub mod codec;
pub mod keys;

pub use backoff::{BackoffPolicy, RetryDecision};
pub use codec::{decode, encode, CodecError};
pub use keys::KeySchema;
