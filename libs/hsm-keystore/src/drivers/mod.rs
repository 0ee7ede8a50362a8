//! Block-device driver vtable.

pub mod token;
pub mod volatile;

use crate::error::KsError;
use crate::uuid::Uuid;

/// What a `read()` fast-path can tell the caller without going past the
/// first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Block is erased or zeroed; no body to decode.
    Empty,
    /// Full block body is present in the returned buffer.
    Full,
}

/// One physical (or RAM-backed) block store. Implementations own
/// `num_blocks` fixed-size 8 KiB blocks addressed by `blockno`.
pub trait BlockDevice {
    fn num_blocks(&self) -> u16;

    /// Read the full raw block image, or just its first page if the header
    /// says erased/zeroed. Fails *bad-crc*
    /// or *bad-block-type* for a key/PIN block whose body does not check out.
    fn read(&mut self, blockno: u16) -> Result<(ReadOutcome, Vec<u8>), KsError>;

    /// Write a full raw block image, erasing first if needed.
    fn write(&mut self, blockno: u16, image: &[u8]) -> Result<(), KsError>;

    /// Rewrite only the first page with `block_status` flipped to tombstone,
    /// leaving the stored CRC untouched.
    fn deprecate(&mut self, blockno: u16) -> Result<(), KsError>;

    /// Write the first page as all zeros.
    fn zero(&mut self, blockno: u16) -> Result<(), KsError>;

    /// Erase the block unless it already reads back as all-0xFF.
    fn erase_maybe(&mut self, blockno: u16) -> Result<(), KsError>;

    fn set_owner(&mut self, blockno: u16, owner: u32);
    fn test_owner(&self, blockno: u16, owner: u32) -> bool;
    fn copy_owner(&mut self, from: u16, to: u16);
    fn logout(&mut self, owner: u32);
}

/// Address a block by its UUID name rather than number, for callers that
/// keep both around (used only by tests/diagnostics in this workspace).
pub fn is_pin_block(name: &Uuid) -> bool {
    *name == crate::uuid::NIL_UUID
}
