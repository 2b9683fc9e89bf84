use crate::constants::hash::{FNV1A64_OFFSET, FNV1A64_PRIME};

/// FNV-1a over raw bytes. Stable across platforms and compiler releases.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV1A64_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV1A64_PRIME)
    })
}

/// `fnv1a64` over the UTF-8 bytes of `value`.
pub fn stable_hash_str(value: &str) -> u64 {
    fnv1a64(value.as_bytes())
}

/// Fixed-width lowercase hex rendering of `stable_hash_str`.
pub fn hex_tag(value: &str) -> String {
    format!("{:016x}", stable_hash_str(value))
}
