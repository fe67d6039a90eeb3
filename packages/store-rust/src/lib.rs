//! `Remora` Store — partition-aware key-value store backed by a remote
//! in-memory store, with blocking iterators over asynchronous scans.
//!
//! Layering, innermost first:
//!
//! - [`remote::RemoteKv`]: transport-level contract (point ops, atomic
//!   scripts, cursor-based index scans)
//! - [`retry`]: backoff-driven retry executor, cancellable for scans
//! - [`bridge::StoreIter`]: bounded-queue bridge from an async notification
//!   stream to a blocking pull iterator
//! - [`scan`]: page-at-a-time index enumeration joined with bulk fetches
//! - [`store::RemoteStateStore`]: the blocking façade callers hold

pub mod bridge;
pub mod config;
pub mod error;
pub mod remote;
pub mod remotes;
pub mod retry;
mod scan;
pub mod store;

pub use remora_core::BackoffPolicy;

pub use bridge::StoreIter;
pub use config::StoreConfig;
pub use error::StoreError;
pub use remote::{RemoteKv, ScanCursor, ScanPage};
pub use remotes::MemoryRemote;
pub use retry::{LoggingRetryObserver, RetryObserver};
pub use store::RemoteStateStore;
