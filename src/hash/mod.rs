//! Module implement hashing for translated values.

use std::hash::{BuildHasher, Hasher};

/// Type uses google's city hash to convert [Hash]able key into ``u64``.
/// Refer [cityhash_rs] for details.
///
/// Only the last `write()` contributes to the digest, which is the case for
/// byte-string keys, where length prefix is written ahead of the bytes.
#[derive(Clone, Copy, Default)]
pub struct CityHasher {
    digest: u128,
}

impl CityHasher {
    pub fn new() -> CityHasher {
        CityHasher::default()
    }
}

impl BuildHasher for CityHasher {
    type Hasher = Self;

    #[inline]
    fn build_hasher(&self) -> Self {
        *self
    }
}

impl Hasher for CityHasher {
    fn finish(&self) -> u64 {
        ((self.digest >> 64) as u64) ^ ((self.digest & 0xFFFFFFFFFFFFFFFF) as u64)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.digest = cityhash_rs::cityhash_110_128(bytes);
    }
}

/// Hash `value` and return its bucket within `n` buckets.
pub fn to_bucket(value: &[u8], n: usize) -> usize {
    let mut hasher = CityHasher::new();
    hasher.write(value);
    (hasher.finish() % (n as u64)) as usize
}

#[cfg(test)]
#[path = "hash_test.rs"]
mod hash_test;
