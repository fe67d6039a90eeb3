//! MessagePack codec for logical keys and values.
//!
//! Logical keys and values are caller-defined serde types; on the wire they
//! are raw byte sequences. MessagePack never produces a zero-length
//! encoding, which matters: the store represents "no value" as a missing or
//! zero-length raw entry, so a present value's bytes are always
//! distinguishable from absence.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Codec failure, wrapping the underlying MessagePack error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode value: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encodes a logical key or value to its raw byte form.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec(value)?)
}

/// Decodes a raw byte sequence back into a logical key or value.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not a valid encoding of `T`.
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(raw)?)
}
