//! integrity — checksum and magic/version checks of on-disk metadata blocks.
//!
//! - checksum.rs — CRC32 compute/verify at an arbitrary metadata check offset.
//! - magic.rs    — `Signature`, `MetadataCheck`, revision gate.
//!
//! Corruption is an expected runtime condition: verification answers with
//! `bool` (or [`BlockStatus`]) and never with an error.

pub mod checksum;
pub mod magic;

use log::debug;
use serde::Serialize;

pub use checksum::{calculate_csum, crc32_le, csum_pair, is_csum_valid};
pub use magic::{
    is_supported_revision, validate_magic, validate_signature, MetadataCheck, Revision, Signature,
};

use crate::consts::{BLOCK_HDR_SIZE, CHECK_OFFSET, CSUM_CRC32, SUPER_MAGIC};
use crate::error::{PageError, Result};

/// Checksum of a block with the standard header; stored in place.
pub fn compute_checksum(buf: &mut [u8]) -> Result<u32> {
    calculate_csum(buf, CHECK_OFFSET)
}

/// Verify a block with the standard header.
pub fn is_valid(buf: &[u8]) -> bool {
    is_csum_valid(buf, CHECK_OFFSET)
}

/// Stamp signature + metadata check and the checksum over `declared_size`
/// bytes. Used by writers right before a block goes to the log.
pub fn seal_block(buf: &mut [u8], key: u16, declared_size: usize) -> Result<u32> {
    if declared_size < BLOCK_HDR_SIZE || declared_size > buf.len() {
        return Err(PageError::invalid(format!(
            "declared size {} outside {}..={}",
            declared_size,
            BLOCK_HDR_SIZE,
            buf.len()
        )));
    }
    let bytes = u16::try_from(declared_size).map_err(|_| {
        PageError::invalid(format!("declared size {} does not fit u16", declared_size))
    })?;

    Signature::current(key).write_to(buf)?;
    MetadataCheck {
        bytes,
        flags: CSUM_CRC32,
        csum: 0,
    }
    .write_to(&mut buf[CHECK_OFFSET..])?;
    let csum = compute_checksum(buf)?;
    debug!(
        "sealed block key {:#06x}, {} bytes, csum {:#010x}",
        key, declared_size, csum
    );
    Ok(csum)
}

/// Outcome of a full header inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BlockStatus {
    Valid {
        signature: Signature,
        check: MetadataCheck,
    },
    Malformed {
        reason: String,
    },
    BadMagic {
        found: u32,
    },
    UnsupportedVersion {
        found: Revision,
        supported: Revision,
    },
    ChecksumMismatch {
        stored: u32,
        computed: u32,
    },
}

impl BlockStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, BlockStatus::Valid { .. })
    }
}

/// Classify a block with the standard header: magic, revision, checksum.
pub fn inspect_block(buf: &[u8]) -> BlockStatus {
    if buf.len() < BLOCK_HDR_SIZE {
        return BlockStatus::Malformed {
            reason: format!("{} bytes, header needs {}", buf.len(), BLOCK_HDR_SIZE),
        };
    }
    let (signature, check) = match (
        Signature::read_from(buf),
        MetadataCheck::read_from(&buf[CHECK_OFFSET..]),
    ) {
        (Ok(s), Ok(c)) => (s, c),
        (Err(e), _) | (_, Err(e)) => {
            return BlockStatus::Malformed {
                reason: e.to_string(),
            }
        }
    };

    if signature.magic != SUPER_MAGIC {
        return BlockStatus::BadMagic {
            found: signature.magic,
        };
    }
    if !validate_magic(&signature) {
        return BlockStatus::UnsupportedVersion {
            found: signature.version,
            supported: Revision::CURRENT,
        };
    }
    match csum_pair(buf, CHECK_OFFSET) {
        Ok((stored, computed)) if stored == computed => BlockStatus::Valid { signature, check },
        Ok((stored, computed)) => BlockStatus::ChecksumMismatch { stored, computed },
        Err(e) => BlockStatus::Malformed {
            reason: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{LOG_FOOTER_KEY, MAJOR_REVISION};

    #[test]
    fn sealed_block_inspects_valid() {
        let mut buf = vec![0x5Au8; 128];
        let csum = seal_block(&mut buf, LOG_FOOTER_KEY, 100).unwrap();
        match inspect_block(&buf) {
            BlockStatus::Valid { signature, check } => {
                assert_eq!(signature.key, LOG_FOOTER_KEY);
                assert_eq!(check.bytes, 100);
                assert_eq!(check.csum, csum);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(is_valid(&buf));
    }

    #[test]
    fn inspect_classifies_failures() {
        assert!(matches!(
            inspect_block(&[0u8; 10]),
            BlockStatus::Malformed { .. }
        ));

        let mut buf = vec![0u8; 64];
        seal_block(&mut buf, LOG_FOOTER_KEY, 64).unwrap();

        let mut bad_magic = buf.clone();
        bad_magic[0] ^= 0xFF;
        assert!(matches!(
            inspect_block(&bad_magic),
            BlockStatus::BadMagic { .. }
        ));

        let mut newer = buf.clone();
        newer[6] = MAJOR_REVISION + 1;
        assert!(matches!(
            inspect_block(&newer),
            BlockStatus::UnsupportedVersion { .. }
        ));

        let mut flipped = buf.clone();
        flipped[40] ^= 0x04;
        assert!(matches!(
            inspect_block(&flipped),
            BlockStatus::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn seal_rejects_bad_sizes() {
        let mut buf = vec![0u8; 64];
        assert!(seal_block(&mut buf, LOG_FOOTER_KEY, 8).is_err());
        assert!(seal_block(&mut buf, LOG_FOOTER_KEY, 65).is_err());
        let mut big = vec![0u8; 70_000];
        assert!(seal_block(&mut big, LOG_FOOTER_KEY, 70_000).is_err());
    }
}
