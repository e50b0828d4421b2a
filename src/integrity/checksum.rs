//! integrity/checksum — CRC32 of metadata blocks.
//!
//! Every metadata block embeds an 8-byte metadata check:
//!   [bytes u16][flags u16][csum u32]   (LE)
//! The checksum covers exactly `bytes` bytes of the block, starting at the
//! block start, with the csum field read as zero. The field itself may lie
//! inside or outside the covered range.
//!
//! The CRC is the reflected CRC-32 (0xEDB88320) seeded with all ones and
//! without the final inversion, i.e. `!crc32fast::hash(data)`.

use byteorder::{ByteOrder, LittleEndian};
use log::error;

use super::magic::MetadataCheck;
use crate::consts::{CHECK_OFF_CSUM, CSUM_CRC32, METADATA_CHECK_SIZE};
use crate::error::{PageError, Result};

#[inline]
pub fn crc32_le(data: &[u8]) -> u32 {
    !crc32fast::hash(data)
}

fn check_fits(buf: &[u8], check_offset: usize) -> Result<()> {
    match check_offset.checked_add(METADATA_CHECK_SIZE) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => {
            error!(
                "metadata check at {} does not fit into {} bytes",
                check_offset,
                buf.len()
            );
            Err(PageError::invalid(format!(
                "metadata check at offset {} exceeds buffer of {} bytes",
                check_offset,
                buf.len()
            )))
        }
    }
}

/// CRC over the declared range of `buf` with the csum field at
/// `check_offset` read as zero. Does not touch `buf`.
fn csum_of(buf: &[u8], check_offset: usize) -> Result<u32> {
    check_fits(buf, check_offset)?;
    let check = MetadataCheck::read_from(&buf[check_offset..])?;
    let bytes = check.bytes as usize;

    if bytes > buf.len() {
        error!("corrupted size {} of checked data", bytes);
        return Err(PageError::invalid(format!(
            "declared size {} exceeds buffer of {} bytes",
            bytes,
            buf.len()
        )));
    }
    if check.flags & CSUM_CRC32 == 0 {
        error!("unknown flags set {:#x}", check.flags);
        return Err(PageError::invalid(format!(
            "unsupported checksum flags {:#x}",
            check.flags
        )));
    }

    let hole_start = (check_offset + CHECK_OFF_CSUM).min(bytes);
    let hole_end = (check_offset + CHECK_OFF_CSUM + 4).min(bytes);
    let zeros = [0u8; 4];

    let mut h = crc32fast::Hasher::new();
    h.update(&buf[..hole_start]);
    h.update(&zeros[..hole_end - hole_start]);
    h.update(&buf[hole_end..bytes]);
    Ok(!h.finalize())
}

/// Compute the checksum of the block and store it (LE) in the csum field.
pub fn calculate_csum(buf: &mut [u8], check_offset: usize) -> Result<u32> {
    let csum = csum_of(buf, check_offset)?;
    let at = check_offset + CHECK_OFF_CSUM;
    LittleEndian::write_u32(&mut buf[at..at + 4], csum);
    Ok(csum)
}

/// Stored csum, recomputed csum. `Err` if the check itself is unusable.
pub fn csum_pair(buf: &[u8], check_offset: usize) -> Result<(u32, u32)> {
    let computed = csum_of(buf, check_offset)?;
    let at = check_offset + CHECK_OFF_CSUM;
    let stored = LittleEndian::read_u32(&buf[at..at + 4]);
    Ok((stored, computed))
}

/// Whether the stored checksum matches. Never mutates `buf`; a check that
/// cannot be computed counts as invalid.
pub fn is_csum_valid(buf: &[u8], check_offset: usize) -> bool {
    match csum_pair(buf, check_offset) {
        Ok((stored, computed)) if stored == computed => true,
        Ok((stored, computed)) => {
            error!("old_csum {:#x} != calc_csum {:#x}", stored, computed);
            false
        }
        Err(_) => {
            error!("fail to calculate checksum");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::CHECK_OFF_FLAGS;

    fn with_check(len: usize, off: usize, bytes: u16) -> Vec<u8> {
        let mut buf: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
        LittleEndian::write_u16(&mut buf[off..off + 2], bytes);
        LittleEndian::write_u16(&mut buf[off + CHECK_OFF_FLAGS..off + CHECK_OFF_FLAGS + 2], CSUM_CRC32);
        buf
    }

    #[test]
    fn crc_matches_reference_vector() {
        // CRC-32 of "123456789" is 0xCBF43926 with the final inversion.
        assert_eq!(crc32_le(b"123456789"), !0xCBF4_3926);
        assert_eq!(crc32_le(&[]), 0xFFFF_FFFF);
    }

    #[test]
    fn stored_csum_equals_crc_with_zeroed_field() {
        let mut buf = with_check(64, 8, 32);
        let csum = calculate_csum(&mut buf, 8).unwrap();
        let mut copy = buf.clone();
        copy[12..16].fill(0);
        assert_eq!(csum, crc32_le(&copy[..32]));
        assert_eq!(LittleEndian::read_u32(&buf[12..16]), csum);
        assert!(is_csum_valid(&buf, 8));
    }

    #[test]
    fn check_outside_covered_range() {
        // check lives at the tail, past the declared bytes
        let mut buf = with_check(64, 48, 40);
        let csum = calculate_csum(&mut buf, 48).unwrap();
        assert_eq!(csum, crc32_le(&buf[..40]));
        assert!(is_csum_valid(&buf, 48));
        buf[50] ^= 0x01; // flags byte, not covered: check becomes unusable
        assert!(!is_csum_valid(&buf, 48));
    }

    #[test]
    fn verification_does_not_mutate() {
        let mut buf = with_check(64, 8, 64);
        calculate_csum(&mut buf, 8).unwrap();
        buf[20] ^= 0x80;
        let before = buf.clone();
        assert!(!is_csum_valid(&buf, 8));
        assert_eq!(buf, before);
    }

    #[test]
    fn rejects_bad_declared_size_and_flags() {
        let mut buf = with_check(32, 8, 33);
        assert!(matches!(
            calculate_csum(&mut buf, 8),
            Err(PageError::InvalidArgument(_))
        ));
        assert!(!is_csum_valid(&buf, 8));

        let mut buf = with_check(32, 8, 32);
        LittleEndian::write_u16(&mut buf[10..12], 0);
        assert!(calculate_csum(&mut buf, 8).is_err());

        let mut small = vec![0u8; 12];
        assert!(calculate_csum(&mut small, 8).is_err());
        assert!(calculate_csum(&mut small, usize::MAX).is_err());
    }
}
