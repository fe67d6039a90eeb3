//! [`RemoteKv`](crate::remote::RemoteKv) implementations.

pub mod memory;

pub use memory::MemoryRemote;
