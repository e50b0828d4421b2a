//! Shared constants of the on-disk metadata format and the page layer.

// -------- Signature --------
/// Common magic of every metadata block ("SsDf").
pub const SUPER_MAGIC: u32 = 0x5373_4466;

/// Highest on-disk major revision this implementation understands.
pub const MAJOR_REVISION: u8 = 1;
/// Highest on-disk minor revision this implementation understands.
pub const MINOR_REVISION: u8 = 14;

// Block kind keys (signature.key).
pub const SEGMENT_HDR_KEY: u16 = 0x5348; // "SH"
pub const PARTIAL_LOG_HDR_KEY: u16 = 0x5048; // "PH"
pub const LOG_FOOTER_KEY: u16 = 0x4C46; // "LF"
pub const BTREE_NODE_KEY: u16 = 0x424E; // "BN"
pub const BLK_BMAP_KEY: u16 = 0x424D; // "BM"

// -------- Metadata block header (LE) --------
// [magic u32][key u16][major u8][minor u8] [bytes u16][flags u16][csum u32]
pub const SIGNATURE_SIZE: usize = 8;
pub const METADATA_CHECK_SIZE: usize = 8;
pub const BLOCK_HDR_SIZE: usize = SIGNATURE_SIZE + METADATA_CHECK_SIZE;

pub const SIG_OFF_MAGIC: usize = 0;
pub const SIG_OFF_KEY: usize = 4;
pub const SIG_OFF_MAJOR: usize = 6;
pub const SIG_OFF_MINOR: usize = 7;

/// Offset of the metadata check inside a standard block header.
pub const CHECK_OFFSET: usize = SIGNATURE_SIZE;
// Offsets relative to the start of a metadata check.
pub const CHECK_OFF_BYTES: usize = 0;
pub const CHECK_OFF_FLAGS: usize = 2;
pub const CHECK_OFF_CSUM: usize = 4;

// Checksum algorithm flags (metadata_check.flags).
pub const CSUM_CRC32: u16 = 1 << 0;
pub const CSUM_ZLIB_COMPRESSED: u16 = 1 << 1;
pub const CSUM_LZO_COMPRESSED: u16 = 1 << 2;

// -------- Pages --------
pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const MIN_PAGE_SIZE: usize = 512;
pub const MEM_PAGE_SHIFT: u32 = 12;

/// Hard upper bound of a page vector (single-byte counter).
pub const PAGEVEC_MAX_CAPACITY: u8 = u8::MAX;

/// Pages kept for reuse by the heap allocator by default.
pub const DEFAULT_POOL_PAGES: usize = 64;

// -------- Waits --------
/// Successful waits longer than this are logged.
pub const WAITED_TOO_LONG_MSECS: u64 = 1000;

// -------- Names --------
/// Inline name capacity of the default raw inode layout.
pub const DEFAULT_INLINE_NAME_MAX: usize = 12;
