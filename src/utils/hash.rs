//! FNV-1a (32 bit) hashing
//!
//! All identities that end up in cache maps or on disk (property ids,
//! shader combination ids, pipeline signature ids) are folded with FNV-1a.
//! The fold is byte-oriented and platform independent: integers are fed as
//! little-endian words, and no pointer or floating-point value is ever hashed.

use std::hash::{Hash, Hasher};

/// FNV-1a 32 bit offset basis.
pub const FNV1A_INITIAL_HASH_32: u32 = 0x811c_9dc5;

/// FNV-1a 32 bit prime.
pub const FNV1A_PRIME_32: u32 = 0x0100_0193;

/// Folds `bytes` into `hash`.
#[inline]
#[must_use]
pub fn fnv1a_32(bytes: &[u8], hash: u32) -> u32 {
    bytes
        .iter()
        .fold(hash, |h, &b| (h ^ u32::from(b)).wrapping_mul(FNV1A_PRIME_32))
}

/// Folds a single 32 bit word (little-endian) into `hash`.
#[inline]
#[must_use]
pub fn fold_u32(hash: u32, value: u32) -> u32 {
    fnv1a_32(&value.to_le_bytes(), hash)
}

/// `std::hash::Hasher` adapter over FNV-1a 32.
///
/// Lets any `Hash` type (e.g. a backend's fixed-function pipeline description)
/// be reduced to the 32 bit value folded into a pipeline signature.
#[derive(Debug, Clone, Copy)]
pub struct FnvHasher32 {
    hash: u32,
}

impl Default for FnvHasher32 {
    fn default() -> Self {
        Self {
            hash: FNV1A_INITIAL_HASH_32,
        }
    }
}

impl FnvHasher32 {
    #[inline]
    #[must_use]
    pub fn finish32(&self) -> u32 {
        self.hash
    }
}

impl Hasher for FnvHasher32 {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.hash = fnv1a_32(bytes, self.hash);
    }

    #[inline]
    fn finish(&self) -> u64 {
        u64::from(self.hash)
    }
}

/// Computes the FNV-1a 32 hash of any `Hash`-able value.
#[inline]
pub fn fnv_hash_key<K: Hash + ?Sized>(key: &K) -> u32 {
    let mut hasher = FnvHasher32::default();
    key.hash(&mut hasher);
    hasher.finish32()
}
