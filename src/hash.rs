//! Key routing hash.
//!
//! FNV-1a (32-bit) over the UTF-8 bytes of a routing key. The same hash picks
//! the shard inside a group and the bucket inside a shard. Callers must not
//! depend on a particular key-to-shard mapping staying stable across releases.

const FNV_OFFSET_BASIS_32: u32 = 2_166_136_261;
const FNV_PRIME_32: u32 = 16_777_619;

/// FNV-1a 32-bit hash of `key`.
#[inline]
pub fn fnv1a_32(key: &str) -> u32 {
    key.as_bytes().iter().fold(FNV_OFFSET_BASIS_32, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME_32)
    })
}

/// Map `key` onto `[0, buckets)`.
///
/// `buckets` must be non-zero; normalized configs guarantee this.
#[inline]
pub fn route(key: &str, buckets: usize) -> usize {
    debug_assert!(buckets > 0, "route requires at least one bucket");
    (u64::from(fnv1a_32(key)) % buckets as u64) as usize
}
