//! integrity/magic — signature and metadata check records.
//!
//! Header of every metadata block (16 bytes, LE):
//!   0  magic u32
//!   4  key   u16     block kind
//!   6  major u8
//!   7  minor u8
//!   8  bytes u16     declared size covered by the checksum
//!   10 flags u16     checksum algorithm
//!   12 csum  u32

use byteorder::{ByteOrder, LittleEndian};
use log::info;
use serde::Serialize;
use std::fmt;

use crate::consts::{
    CHECK_OFF_BYTES, CHECK_OFF_CSUM, CHECK_OFF_FLAGS, MAJOR_REVISION, METADATA_CHECK_SIZE,
    MINOR_REVISION, SIGNATURE_SIZE, SIG_OFF_KEY, SIG_OFF_MAGIC, SIG_OFF_MAJOR, SIG_OFF_MINOR,
    SUPER_MAGIC,
};
use crate::error::{PageError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Revision {
    pub major: u8,
    pub minor: u8,
}

impl Revision {
    pub const CURRENT: Revision = Revision {
        major: MAJOR_REVISION,
        minor: MINOR_REVISION,
    };
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub magic: u32,
    pub key: u16,
    pub version: Revision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetadataCheck {
    pub bytes: u16,
    pub flags: u16,
    pub csum: u32,
}

fn too_small(what: &str, need: usize, have: usize) -> PageError {
    PageError::invalid(format!("{} needs {} bytes, buffer has {}", what, need, have))
}

impl Signature {
    /// Signature of a block of kind `key` written by this implementation.
    pub fn current(key: u16) -> Self {
        Self {
            magic: SUPER_MAGIC,
            key,
            version: Revision::CURRENT,
        }
    }

    pub fn read_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < SIGNATURE_SIZE {
            return Err(too_small("signature", SIGNATURE_SIZE, buf.len()));
        }
        Ok(Self {
            magic: LittleEndian::read_u32(&buf[SIG_OFF_MAGIC..SIG_OFF_MAGIC + 4]),
            key: LittleEndian::read_u16(&buf[SIG_OFF_KEY..SIG_OFF_KEY + 2]),
            version: Revision {
                major: buf[SIG_OFF_MAJOR],
                minor: buf[SIG_OFF_MINOR],
            },
        })
    }

    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < SIGNATURE_SIZE {
            return Err(too_small("signature", SIGNATURE_SIZE, buf.len()));
        }
        LittleEndian::write_u32(&mut buf[SIG_OFF_MAGIC..SIG_OFF_MAGIC + 4], self.magic);
        LittleEndian::write_u16(&mut buf[SIG_OFF_KEY..SIG_OFF_KEY + 2], self.key);
        buf[SIG_OFF_MAJOR] = self.version.major;
        buf[SIG_OFF_MINOR] = self.version.minor;
        Ok(())
    }
}

impl MetadataCheck {
    pub fn read_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < METADATA_CHECK_SIZE {
            return Err(too_small("metadata check", METADATA_CHECK_SIZE, buf.len()));
        }
        Ok(Self {
            bytes: LittleEndian::read_u16(&buf[CHECK_OFF_BYTES..CHECK_OFF_BYTES + 2]),
            flags: LittleEndian::read_u16(&buf[CHECK_OFF_FLAGS..CHECK_OFF_FLAGS + 2]),
            csum: LittleEndian::read_u32(&buf[CHECK_OFF_CSUM..CHECK_OFF_CSUM + 4]),
        })
    }

    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < METADATA_CHECK_SIZE {
            return Err(too_small("metadata check", METADATA_CHECK_SIZE, buf.len()));
        }
        LittleEndian::write_u16(&mut buf[CHECK_OFF_BYTES..CHECK_OFF_BYTES + 2], self.bytes);
        LittleEndian::write_u16(&mut buf[CHECK_OFF_FLAGS..CHECK_OFF_FLAGS + 2], self.flags);
        LittleEndian::write_u32(&mut buf[CHECK_OFF_CSUM..CHECK_OFF_CSUM + 4], self.csum);
        Ok(())
    }
}

/// Whether the revision is one this implementation can read.
///
/// Each component is compared on its own: a volume with a lower major but a
/// higher minor than ours is rejected too.
pub fn is_supported_revision(v: Revision) -> bool {
    v.major <= MAJOR_REVISION && v.minor <= MINOR_REVISION
}

/// Magic and revision check. Incompatible volumes are rejected, never parsed
/// best-effort.
pub fn validate_magic(sig: &Signature) -> bool {
    if sig.magic != SUPER_MAGIC {
        return false;
    }
    if !is_supported_revision(sig.version) {
        info!(
            "volume has unsupported {} version, driver expects {}",
            sig.version,
            Revision::CURRENT
        );
        return false;
    }
    true
}

/// `validate_magic` plus the block kind.
pub fn validate_signature(sig: &Signature, key: u16) -> bool {
    validate_magic(sig) && sig.key == key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{BTREE_NODE_KEY, SEGMENT_HDR_KEY};

    #[test]
    fn signature_layout_is_little_endian() {
        let mut buf = [0u8; 8];
        Signature::current(SEGMENT_HDR_KEY).write_to(&mut buf).unwrap();
        assert_eq!(&buf[0..4], &SUPER_MAGIC.to_le_bytes());
        assert_eq!(&buf[4..6], &SEGMENT_HDR_KEY.to_le_bytes());
        assert_eq!(buf[6], MAJOR_REVISION);
        assert_eq!(buf[7], MINOR_REVISION);
        assert_eq!(
            Signature::read_from(&buf).unwrap(),
            Signature::current(SEGMENT_HDR_KEY)
        );
        assert!(Signature::read_from(&buf[..7]).is_err());
    }

    #[test]
    fn magic_and_revision_gate() {
        let ok = Signature::current(BTREE_NODE_KEY);
        assert!(validate_magic(&ok));
        assert!(validate_signature(&ok, BTREE_NODE_KEY));
        assert!(!validate_signature(&ok, SEGMENT_HDR_KEY));

        let mut bad = ok;
        bad.magic ^= 1;
        assert!(!validate_magic(&bad));

        let mut newer = ok;
        newer.version.major = MAJOR_REVISION + 1;
        assert!(!validate_magic(&newer));

        let mut older_minor = ok;
        older_minor.version.minor = 0;
        assert!(validate_magic(&older_minor));

        let mut newer_minor = ok;
        newer_minor.version.minor = MINOR_REVISION + 1;
        assert!(!validate_magic(&newer_minor));
    }

    #[test]
    fn lower_major_with_higher_minor_is_rejected() {
        let v = Revision {
            major: MAJOR_REVISION.saturating_sub(1),
            minor: MINOR_REVISION + 1,
        };
        assert!(!is_supported_revision(v));
    }

    #[test]
    fn metadata_check_roundtrip_fields() {
        let c = MetadataCheck {
            bytes: 0x1234,
            flags: 1,
            csum: 0xDEAD_BEEF,
        };
        let mut buf = [0u8; 8];
        c.write_to(&mut buf).unwrap();
        assert_eq!(buf, [0x34, 0x12, 1, 0, 0xEF, 0xBE, 0xAD, 0xDE]);
    }
}
