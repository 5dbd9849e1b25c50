//! Module implement common utility functions and types.

use std::convert::TryInto;

use crate::Result;

pub mod files;
pub mod thread;

pub use thread::Thread;

/// Encode identifier as fixed width 8-byte big-endian, so that byte-wise
/// ordering of encoded keys match numerical ordering of identifiers.
#[inline]
pub fn encode_id(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Decode identifier encoded by [encode_id].
pub fn decode_id(data: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = match data.try_into() {
        Ok(bytes) => bytes,
        Err(_) => err_at!(FailConvert, msg: "id must be 8 bytes, found {}", data.len())?,
    };
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
