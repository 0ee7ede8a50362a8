use crate::error::BusError;
use hsm_rt::task_yield;

/// Offset, relative to a core's base address, of its STATUS register. The
/// exact bit layout of STATUS is core-specific and lives in the FPGA
/// register map, which is out of scope for this crate; only the
/// "poll until `STATUS & mask != 0`" contract matters here.
pub const STATUS_OFFSET: u32 = 0x10;

/// Default timeout, in poll iterations, used when a caller seeds `io_wait`
/// with a count of `-1`.
pub const DEFAULT_TIMEOUT_ITERS: u32 = 100_000_000;

/// A 32-bit-word memory-mapped bus. Implementations byte-swap on the wire so
/// that callers always see/give native-endian words; the bus itself is
/// big-endian.
pub trait Bus {
    /// Read one 32-bit big-endian word from `base + offset`.
    fn read_word(&self, base: u32, offset: u32) -> u32;
    /// Write one 32-bit big-endian word to `base + offset`.
    fn write_word(&self, base: u32, offset: u32, value: u32);
}

/// Read `n` bytes starting at `base + offset`, `n` bytes words in big-endian
/// on the wire. `n` must be a multiple of 4.
pub fn io_read(bus: &dyn Bus, base: u32, offset: u32, buf: &mut [u8]) -> Result<(), BusError> {
    let n = buf.len();
    if n % 4 != 0 {
        return Err(BusError::BadCount);
    }
    for (i, chunk) in buf.chunks_mut(4).enumerate() {
        let word = bus.read_word(base, offset + (i as u32) * 4);
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    Ok(())
}

/// Write `buf` (length a multiple of 4) to `base + offset`, big-endian on
/// the wire.
pub fn io_write(bus: &dyn Bus, base: u32, offset: u32, buf: &[u8]) -> Result<(), BusError> {
    if buf.len() % 4 != 0 {
        return Err(BusError::BadCount);
    }
    for (i, chunk) in buf.chunks(4).enumerate() {
        let word = u32::from_be_bytes(chunk.try_into().unwrap());
        bus.write_word(base, offset + (i as u32) * 4, word);
    }
    Ok(())
}

/// Poll `base`'s STATUS register, cooperatively yielding between polls, until
/// `STATUS & status_mask != 0`. `count` is seeded with
/// [`DEFAULT_TIMEOUT_ITERS`] when it comes in as `u32::MAX` (standing in for
/// the C source's `-1` sentinel on an unsigned counter), decremented once per
/// poll, and written back with however many iterations remained on success.
pub fn io_wait(bus: &dyn Bus, base: u32, status_mask: u32, count: &mut u32) -> Result<(), BusError> {
    if *count == u32::MAX {
        *count = DEFAULT_TIMEOUT_ITERS;
    }
    loop {
        let status = bus.read_word(base, STATUS_OFFSET);
        if status & status_mask != 0 {
            return Ok(());
        }
        if *count == 0 {
            return Err(BusError::IoTimeout);
        }
        *count -= 1;
        task_yield();
    }
}

/// As [`io_wait`], but waits for both `base1` and `base2` to each
/// individually satisfy `status_mask` (either base may be `None`, in which
/// case that side is considered already satisfied). Used by the two-core
/// ModExp variant and HMAC's key/message pipelines.
pub fn io_wait2(
    bus: &dyn Bus,
    base1: Option<u32>,
    base2: Option<u32>,
    status_mask: u32,
    count: &mut u32,
) -> Result<(), BusError> {
    if *count == u32::MAX {
        *count = DEFAULT_TIMEOUT_ITERS;
    }
    loop {
        let ok1 = base1.map_or(true, |b| bus.read_word(b, STATUS_OFFSET) & status_mask != 0);
        let ok2 = base2.map_or(true, |b| bus.read_word(b, STATUS_OFFSET) & status_mask != 0);
        if ok1 && ok2 {
            return Ok(());
        }
        if *count == 0 {
            return Err(BusError::IoTimeout);
        }
        *count -= 1;
        task_yield();
    }
}

/// A hosted bus backed by a flat array of words, for tests and for the
/// `hosted` build of the firmware binary, alongside the real hardware
/// driver.
#[cfg(feature = "hosted")]
pub struct HostedBus {
    words: std::sync::Mutex<std::collections::HashMap<u32, u32>>,
}

#[cfg(feature = "hosted")]
impl HostedBus {
    pub fn new() -> Self {
        HostedBus { words: std::sync::Mutex::new(std::collections::HashMap::new()) }
    }

    pub fn poke(&self, addr: u32, value: u32) {
        self.words.lock().unwrap().insert(addr, value);
    }
}

#[cfg(feature = "hosted")]
impl Default for HostedBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "hosted")]
impl Bus for HostedBus {
    fn read_word(&self, base: u32, offset: u32) -> u32 {
        *self.words.lock().unwrap().get(&(base + offset)).unwrap_or(&0)
    }

    fn write_word(&self, base: u32, offset: u32, value: u32) {
        self.words.lock().unwrap().insert(base + offset, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unaligned_counts() {
        let bus = HostedBus::new();
        let mut buf = [0u8; 3];
        assert_eq!(io_read(&bus, 0, 0, &mut buf), Err(BusError::BadCount));
    }

    #[test]
    fn read_write_roundtrip_is_big_endian_on_the_wire() {
        let bus = HostedBus::new();
        io_write(&bus, 0x100, 0x20, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(bus.read_word(0x100, 0x20), 0xDEADBEEF);
        let mut out = [0u8; 4];
        io_read(&bus, 0x100, 0x20, &mut out).unwrap();
        assert_eq!(out, [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn wait_times_out() {
        let bus = HostedBus::new();
        let mut count = 3u32;
        assert_eq!(io_wait(&bus, 0x100, 0x1, &mut count), Err(BusError::IoTimeout));
    }

    #[test]
    fn wait_succeeds_once_status_is_set() {
        let bus = HostedBus::new();
        bus.poke(0x100 + STATUS_OFFSET, 0x1);
        let mut count = 10u32;
        assert!(io_wait(&bus, 0x100, 0x1, &mut count).is_ok());
    }
}
