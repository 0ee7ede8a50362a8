//! The literal FPGA-register compression algorithm, for the
//! `hardware` build. Kept as a standalone primitive rather than wired into
//! [`crate::hash::HashState`]: the portable, tested path in this workspace
//! is the software-fallback compression-function backend; a firmware
//! image built with real silicon calls this instead, one block at a time,
//! from the same padding/buffering loop.
#![cfg(feature = "hardware")]

use hsm_bus::{io_read, io_wait, io_write, Bus, BusError};

/// Offset, relative to a hash core's base, of its BLOCK input register.
pub const BLOCK_OFFSET: u32 = 0x100;
/// Offset of the DIGEST/state register bank (also used to read back state
/// for a restorable core, and to seed it back in before the next block).
pub const DIGEST_OFFSET: u32 = 0x200;
/// Offset of the CONTROL register: bit 0 is INIT, bit 1 is NEXT, remaining
/// bits carry the algorithm's mode field.
pub const CONTROL_OFFSET: u32 = 0x00;
const CONTROL_INIT: u32 = 0x1;
const CONTROL_NEXT: u32 = 0x2;
const STATUS_READY: u32 = 0x1;
const STATUS_VALID: u32 = 0x2;

/// Run one message block through a hash core.
///
/// - `first`: issue INIT instead of NEXT.
/// - `restorable`: if true and not `first`, write `state` into the DIGEST
///   registers before pulsing the core, then read the new state back out
///   once READY; this is what lets the core be time-shared across streams.
///   If false (SHA-1), the caller is expected to have pinned this core for
///   the whole stream and `state` is ignored on the way in.
/// - On completion, waits for VALID in addition to READY, as specified.
pub fn process_block(
    bus: &dyn Bus,
    base: u32,
    block: &[u8],
    first: bool,
    mode: u32,
    restorable: bool,
    state: &mut [u8],
) -> Result<(), BusError> {
    if restorable && !first {
        io_write(bus, base, DIGEST_OFFSET, state)?;
    }
    io_write(bus, base, BLOCK_OFFSET, block)?;
    let control = mode | if first { CONTROL_INIT } else { CONTROL_NEXT };
    bus.write_word(base, CONTROL_OFFSET, control);

    let mut count = u32::MAX;
    io_wait(bus, base, STATUS_READY, &mut count)?;
    if restorable {
        io_read(bus, base, DIGEST_OFFSET, state)?;
    }
    let mut count = u32::MAX;
    io_wait(bus, base, STATUS_VALID, &mut count)?;
    Ok(())
}

/// Read the final digest out of DIGEST once the last block's VALID has been
/// observed by [`process_block`].
pub fn read_digest(bus: &dyn Bus, base: u32, out: &mut [u8]) -> Result<(), BusError> {
    io_read(bus, base, DIGEST_OFFSET, out)
}
