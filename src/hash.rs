//! Stable name hashing for directory entries.
//!
//! Key layout (u64):
//!   bits 0..32  — string hash of the first min(len, inline_max) bytes
//!   bits 32..64 — for inline names: length + adjacent-byte mixing pass;
//!                 otherwise the string hash of the suffix
//!
//! Both halves are explicit and platform-independent: the key is persisted
//! in the directory index, so it must never change across builds.

use log::{debug, error};
use serde::Serialize;
use std::fmt;

use crate::error::{PageError, Result};

/// Multiplier of the final 64 -> 32 bit fold (golden ratio).
const GOLDEN_RATIO_64: u64 = 0x61C8_8646_80B5_83EB;

#[inline]
fn partial_name_hash(c: u64, prev: u64) -> u64 {
    prev.wrapping_add(c << 4)
        .wrapping_add(c >> 4)
        .wrapping_mul(11)
}

/// dcache-style string hash; the 64-bit accumulator is folded with
/// `hash_long(h, 32)` = top half of `h * GOLDEN_RATIO_64`.
pub fn full_name_hash(name: &[u8]) -> u32 {
    let h = name
        .iter()
        .fold(0u64, |h, &c| partial_name_hash(c as u64, h));
    (h.wrapping_mul(GOLDEN_RATIO_64) >> 32) as u32
}

/// 64-bit directory index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NameHashKey(u64);

impl NameHashKey {
    #[inline]
    pub fn from_parts(hi: u32, lo: u32) -> Self {
        NameHashKey(((hi as u64) << 32) | lo as u64)
    }

    #[inline]
    pub fn lo(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub fn hi(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for NameHashKey {
    fn from(v: u64) -> Self {
        NameHashKey(v)
    }
}

impl From<NameHashKey> for u64 {
    fn from(k: NameHashKey) -> Self {
        k.0
    }
}

impl fmt::Display for NameHashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Cheap mixing pass for inline names: starts at the length and adds
/// |b[i] - b[i-1]| * b[i-1] for every adjacent pair.
fn inline_mix(name: &[u8]) -> u32 {
    name.windows(2).fold(name.len() as u32, |acc, w| {
        let (prev, cur) = (w[0] as u32, w[1] as u32);
        acc.wrapping_add(prev.abs_diff(cur).wrapping_mul(prev))
    })
}

/// Derive the lookup key of `name`. Empty names are rejected.
pub fn generate_key(name: &[u8], inline_max: usize) -> Result<NameHashKey> {
    if name.is_empty() {
        error!("invalid name length 0");
        return Err(PageError::invalid("name must not be empty"));
    }

    let head = name.len().min(inline_max);
    let lo = full_name_hash(&name[..head]);
    let hi = if name.len() <= inline_max {
        inline_mix(name)
    } else {
        full_name_hash(&name[inline_max..])
    };

    let key = NameHashKey::from_parts(hi, lo);
    debug!("name len {}, name_hash {}", name.len(), key);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_hash_reference_values() {
        assert_eq!(full_name_hash(b""), 0);
        // 'a' = 0x61: (0 + 0x610 + 0x6) * 11 = 0x42F2
        assert_eq!(full_name_hash(b"a"), 0x222D_1BD4);
        assert_eq!(
            full_name_hash(b"a"),
            (0x42F2u64.wrapping_mul(GOLDEN_RATIO_64) >> 32) as u32
        );
    }

    #[test]
    fn inline_key_layout() {
        // "ab": hi = 2 + |0x62 - 0x61| * 0x61 = 0x63
        let k = generate_key(b"ab", 12).unwrap();
        assert_eq!(k.hi(), 0x63);
        assert_eq!(k.lo(), full_name_hash(b"ab"));
        assert_eq!(k.as_u64(), (0x63u64 << 32) | k.lo() as u64);
    }

    #[test]
    fn long_key_layout() {
        let name = b"a_rather_long_file_name.txt";
        let k = generate_key(name, 12).unwrap();
        assert_eq!(k.lo(), full_name_hash(&name[..12]));
        assert_eq!(k.hi(), full_name_hash(&name[12..]));
    }

    #[test]
    fn threshold_boundary_is_inline() {
        let name = b"exactly12chr";
        assert_eq!(name.len(), 12);
        let k = generate_key(name, 12).unwrap();
        assert_eq!(k.hi(), inline_mix(name));
    }

    #[test]
    fn zero_threshold_hashes_everything_as_suffix() {
        let k = generate_key(b"abc", 0).unwrap();
        assert_eq!(k.lo(), 0);
        assert_eq!(k.hi(), full_name_hash(b"abc"));
    }

    #[test]
    fn empty_name_rejected() {
        assert!(matches!(
            generate_key(b"", 12),
            Err(PageError::InvalidArgument(_))
        ));
    }
}
